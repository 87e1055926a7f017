use clap::Subcommand;
use cursebot_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the loaded configuration as TOML
    Show,
    /// Check the scheduler window invariants
    Validate,
    /// Write a default config file if none exists
    Init,
    /// Print the config file path
    Path,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate => {
            let config = Config::load()?.effective();
            config.validate()?;
            println!("ok");
        }
        ConfigAction::Init => {
            let path = Config::path()?;
            if path.exists() {
                eprintln!("config already exists: {}", path.display());
                std::process::exit(1);
            }
            Config::default().save()?;
            println!("wrote {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
    }
    Ok(())
}
