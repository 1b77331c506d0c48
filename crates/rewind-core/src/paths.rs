use std::path::PathBuf;

/// Per-user data directory (`~/.local/share/rewind` on Linux).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rewind")
}

/// Default SQLite database file.
pub fn default_db_path() -> PathBuf {
    data_dir().join("rewind.db")
}

/// Root directory for screenshot thumbnails.
pub fn screenshots_dir() -> PathBuf {
    data_dir().join("screenshots")
}

/// Log file directory.
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Default config file (`~/.config/rewind/rewind.toml` on Linux).
pub fn default_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rewind")
        .join("rewind.toml")
}

/// Thumbnail path for a screenshot hash: `<screenshots>/<hash[..2]>/<hash>.jpg`.
///
/// Sharding by the first two hex chars keeps directories small.
pub fn thumbnail_path(root: &std::path::Path, hash: &str) -> PathBuf {
    let prefix = if hash.len() >= 2 { &hash[..2] } else { hash };
    root.join(prefix).join(format!("{hash}.jpg"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_path_shards_by_prefix() {
        let root = std::path::Path::new("/tmp/shots");
        let p = thumbnail_path(root, "abcdef123456");
        assert_eq!(p, PathBuf::from("/tmp/shots/ab/abcdef123456.jpg"));
    }

    #[test]
    fn thumbnail_path_handles_short_hash() {
        let root = std::path::Path::new("/tmp/shots");
        let p = thumbnail_path(root, "a");
        assert_eq!(p, PathBuf::from("/tmp/shots/a/a.jpg"));
    }
}
