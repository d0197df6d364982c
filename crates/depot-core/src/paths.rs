use dirs::cache_dir;
use std::path::PathBuf;

/// Returns the depot home directory, or None if no cache directory can be resolved.
pub fn try_depot_home() -> Option<PathBuf> {
    if let Some(val) = std::env::var_os("DEPOT_HOME") {
        return Some(PathBuf::from(val));
    }
    cache_dir().map(|c| c.join("depot"))
}

/// Returns the depot home directory (`$XDG_CACHE_HOME/depot` or the platform equivalent).
///
/// Falls back to `./.depot` when neither `DEPOT_HOME` is set nor a cache
/// directory can be resolved.
pub fn depot_home() -> PathBuf {
    try_depot_home().unwrap_or_else(|| PathBuf::from(".depot"))
}

/// Implementation store: <home>/implementations
pub fn store_path() -> PathBuf {
    depot_home().join("implementations")
}

/// Feed cache: <home>/feeds
pub fn feeds_path() -> PathBuf {
    depot_home().join("feeds")
}

/// Optional configuration file: <home>/config.toml
pub fn config_path() -> PathBuf {
    depot_home().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_home() {
        let home = depot_home();
        assert_eq!(store_path(), home.join("implementations"));
        assert_eq!(feeds_path(), home.join("feeds"));
    }
}
