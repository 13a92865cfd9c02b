// src/db/paths.rs
//! Centralized path derivation for simdex directories

use std::path::{Path, PathBuf};

/// Get the simdex data directory. `SIMDEX_DATA_DIR` overrides the
/// platform-local default.
pub fn data_dir() -> PathBuf {
    std::env::var("SIMDEX_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("simdex")
        })
}

/// Get the default database path
pub fn default_db_path() -> PathBuf {
    data_dir().join("simdex.db")
}

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("simdex").join("config.toml"))
}

/// Get the lock file that serializes writers for a database
pub fn ingest_lock_path(db_path: &str) -> PathBuf {
    let path = Path::new(db_path);
    match path.extension() {
        Some(_) => path.with_extension("lock"),
        None => path.with_file_name(format!(
            "{}.lock",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "simdex".to_string())
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_wins() {
        let previous = std::env::var("SIMDEX_DATA_DIR").ok();
        unsafe { std::env::set_var("SIMDEX_DATA_DIR", "/tmp/simdex-test") };
        assert_eq!(data_dir(), PathBuf::from("/tmp/simdex-test"));
        assert_eq!(
            default_db_path(),
            PathBuf::from("/tmp/simdex-test/simdex.db")
        );
        match previous {
            Some(value) => unsafe { std::env::set_var("SIMDEX_DATA_DIR", value) },
            None => unsafe { std::env::remove_var("SIMDEX_DATA_DIR") },
        }
    }

    #[test]
    fn test_lock_path_replaces_extension() {
        assert_eq!(
            ingest_lock_path("/data/simdex.db"),
            PathBuf::from("/data/simdex.lock")
        );
    }

    #[test]
    fn test_lock_path_without_extension() {
        assert_eq!(
            ingest_lock_path("/data/simdex"),
            PathBuf::from("/data/simdex.lock")
        );
    }
}
