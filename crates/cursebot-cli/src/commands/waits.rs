use clap::Subcommand;
use cursebot_core::{Config, WaitOptimizer};

#[derive(Subcommand)]
pub enum WaitsAction {
    /// Print the wait-optimization table
    Report,
    /// Delete the saved wait profiles
    Reset,
    /// Print the wait-profile snapshot path
    Path,
}

pub fn run(action: WaitsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let path = config.waits_save_path()?;

    match action {
        WaitsAction::Report => {
            let mut optimizer = WaitOptimizer::new(config.waits.enabled, config.waits.max_retries);
            optimizer.load_saved(&path);
            print!("{}", optimizer.report());
        }
        WaitsAction::Reset => {
            if path.exists() {
                std::fs::remove_file(&path)?;
                println!("removed {}", path.display());
            } else {
                println!("nothing to remove");
            }
        }
        WaitsAction::Path => {
            println!("{}", path.display());
        }
    }
    Ok(())
}
