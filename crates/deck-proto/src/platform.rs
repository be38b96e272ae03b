use std::path::PathBuf;

const APP_DIR: &str = "deckbridge";

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "DECKBRIDGE_CONFIG";

pub fn data_dir() -> PathBuf {
    // Keep ~/.local/share on every unix, macOS included
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Default directory for the `dump` surface backend.
pub fn dump_dir() -> PathBuf {
    std::env::temp_dir().join("deckbridge-frames")
}
