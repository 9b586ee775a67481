//! Path resolution for the gradebook root, database and configuration

use std::env;
use std::path::{Path, PathBuf};

use plgrade_core::config::CONFIG_FILE;
use plgrade_core::db::DB_FILE;

/// Resolve the root directory.
///
/// An explicit root wins; otherwise the current directory, or "." if that
/// cannot be determined.
pub fn resolve_root_path(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Resolve a possibly relative path against the root
pub fn resolve_in_root(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

pub fn resolve_db_path(db: Option<&Path>, root: &Path) -> PathBuf {
    match db {
        Some(path) => resolve_in_root(path, root),
        None => root.join(DB_FILE),
    }
}

pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_explicit_root() {
        let explicit = PathBuf::from("/tmp/gradebook");
        assert_eq!(resolve_root_path(Some(explicit.clone())), explicit);
    }

    #[test]
    fn test_db_path_defaults_to_root() {
        let root = Path::new("/srv/course");
        assert_eq!(resolve_db_path(None, root), root.join("plgrade.db"));
        assert_eq!(
            resolve_db_path(Some(Path::new("other.db")), root),
            root.join("other.db")
        );
        assert_eq!(
            resolve_db_path(Some(Path::new("/data/g.db")), root),
            PathBuf::from("/data/g.db")
        );
    }
}
