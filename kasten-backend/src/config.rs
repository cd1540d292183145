use std::env;
use std::path::PathBuf;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "KASTEN_DATABASE_URL";
    /// Directory holding the markdown notes. Relative paths resolve against
    /// the working directory.
    pub const NOTES_DIR: &str = "KASTEN_NOTES_DIR";
    /// Seconds between background rescans. 0 disables the periodic rescan;
    /// the index is then only rebuilt at startup and via POST /api/rescan.
    pub const RESCAN_INTERVAL_SECS: &str = "KASTEN_RESCAN_INTERVAL_SECS";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8090;
    pub const DATABASE_URL: &str = "./.db/kasten.db";
    pub const NOTES_DIR: &str = "notes";
    pub const RESCAN_INTERVAL_SECS: u64 = 0;
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub notes_dir: PathBuf,
    pub rescan_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var(env_vars::PORT)
                .unwrap_or_else(|_| defaults::PORT.to_string())
                .parse()
                .expect("PORT must be a valid number"),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            notes_dir: PathBuf::from(
                env::var(env_vars::NOTES_DIR).unwrap_or_else(|_| defaults::NOTES_DIR.to_string()),
            ),
            rescan_interval_secs: env::var(env_vars::RESCAN_INTERVAL_SECS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::RESCAN_INTERVAL_SECS),
        }
    }

    /// Config rooted at a given notes directory, used by tests.
    #[cfg(test)]
    pub fn for_notes_dir(notes_dir: PathBuf) -> Self {
        Self {
            port: defaults::PORT,
            database_url: ":memory:".to_string(),
            notes_dir,
            rescan_interval_secs: 0,
        }
    }
}
