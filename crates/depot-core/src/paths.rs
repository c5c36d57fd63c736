use dirs::home_dir;
use std::path::PathBuf;

/// Environment variable overriding the depot home directory.
pub const DEPOT_HOME_ENV: &str = "DEPOT_HOME";

/// Name of the directory holding trash entries under a repository root.
pub const TRASH_DIR: &str = ".trash";

/// Name of the directory holding in-flight writes under a repository root.
pub const TEMP_DIR: &str = ".temp";

/// Name of the directory recording what the upstream last served for
/// cached proxy metadata.
pub const UPSTREAM_DIR: &str = ".upstream";

/// Returns the depot home directory, or None if the user's home cannot be resolved.
pub fn try_depot_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var(DEPOT_HOME_ENV) {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".depot"))
}

/// Default configuration file: `$DEPOT_HOME/depot.toml`
pub fn config_path(home: &std::path::Path) -> PathBuf {
    home.join("depot.toml")
}

/// Default storage base directory: `$DEPOT_HOME/storages/<storage>`
pub fn storage_path(home: &std::path::Path, storage_id: &str) -> PathBuf {
    home.join("storages").join(storage_id)
}
