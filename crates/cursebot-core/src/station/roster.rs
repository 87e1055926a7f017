//! Worker catalog and the fixed curse roster.
//!
//! Catalogued workers are found via their name template after switching
//! the list to their category filter; anything else falls back to OCR
//! text search over the unfiltered list.

/// A known worker: list category and name-template identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerInfo {
    pub name: &'static str,
    pub category: &'static str,
    pub template: &'static str,
}

/// The fixed high-output roster installed while a station is cursed.
pub const CURSE_ROSTER: [&str; 3] = ["Proviso", "Quartz", "Tequila"];

/// Placeholder recorded when a roster slot's name cannot be read.
pub const UNKNOWN_WORKER: &str = "Unknown";

const CATALOG: &[WorkerInfo] = &[
    WorkerInfo { name: "Proviso", category: "supporter", template: "char-name-proviso" },
    WorkerInfo { name: "Quartz", category: "guard", template: "char-name-quartz" },
    WorkerInfo { name: "Tequila", category: "guard", template: "char-name-tequila" },
    WorkerInfo { name: "Pozemka", category: "sniper", template: "char-name-pozemka" },
    WorkerInfo { name: "Tuye", category: "medic", template: "char-name-tuye" },
    WorkerInfo { name: "Jaye", category: "specialist", template: "char-name-jaye" },
    WorkerInfo { name: "MrNothing", category: "specialist", template: "char-name-mrnothing" },
    WorkerInfo { name: "Shamare", category: "supporter", template: "char-name-shamare" },
    WorkerInfo { name: "Firewhistle", category: "defender", template: "char-name-firewhistle" },
    WorkerInfo { name: "Kirara", category: "specialist", template: "char-name-kirara" },
    WorkerInfo { name: "Gummy", category: "defender", template: "char-name-gummy" },
    WorkerInfo { name: "Midnight", category: "guard", template: "char-name-midnight" },
    WorkerInfo { name: "Texas", category: "vanguard", template: "char-name-texas" },
    WorkerInfo { name: "Lappland", category: "guard", template: "char-name-lappland" },
    WorkerInfo { name: "Exusiai", category: "sniper", template: "char-name-exusiai" },
    WorkerInfo { name: "Lemuen", category: "sniper", template: "char-name-lemuen" },
    WorkerInfo { name: "Underflow", category: "defender", template: "char-name-underflow" },
];

/// Look a worker up by exact name.
pub fn lookup(name: &str) -> Option<&'static WorkerInfo> {
    CATALOG.iter().find(|w| w.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curse_roster_is_fully_catalogued() {
        for name in CURSE_ROSTER {
            assert!(lookup(name).is_some(), "{name} missing from catalog");
        }
    }

    #[test]
    fn lookup_is_exact() {
        assert!(lookup("Texas").is_some());
        assert!(lookup("texas").is_none());
        assert!(lookup(UNKNOWN_WORKER).is_none());
    }
}
