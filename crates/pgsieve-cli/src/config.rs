//! Finding the desired schema.
//!
//! An explicit `--schema` path wins. Otherwise `.config/pgsieve.styx` is
//! searched for in the current directory and its parents, and when there is
//! none the bundled demo schema is used.

use pgsieve::Realm;
use pgsieve_decl::DeclError;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = ".config/pgsieve.styx";

/// Where the desired schema came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Demo,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Demo => write!(f, "bundled demo schema"),
        }
    }
}

pub fn load(explicit: Option<&Path>) -> Result<(Realm, Source), DeclError> {
    let cwd = std::env::current_dir().map_err(|e| DeclError::Io {
        path: ".".into(),
        source: e,
    })?;
    load_from(explicit, &cwd)
}

pub fn load_from(explicit: Option<&Path>, start: &Path) -> Result<(Realm, Source), DeclError> {
    let source = match explicit {
        Some(path) => Source::File(path.to_path_buf()),
        None => match find_config_file(start) {
            Some(path) => Source::File(path),
            None => Source::Demo,
        },
    };
    let realm = match &source {
        Source::File(path) => pgsieve_decl::load_file(path)?,
        Source::Demo => pgsieve_decl::demo_realm()?,
    };
    Ok((realm, source))
}

/// Find `.config/pgsieve.styx` by searching up the directory tree.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn found_in_a_parent_directory() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join(".config")).unwrap();
        std::fs::write(root.path().join(CONFIG_FILE), pgsieve_decl::DEMO_SCHEMA).unwrap();
        let nested = root.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (realm, source) = load_from(None, &nested).unwrap();
        assert_eq!(source, Source::File(root.path().join(CONFIG_FILE)));
        assert!(realm.table_count() > 0);
    }

    #[test]
    fn explicit_path_that_does_not_exist_is_an_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope.styx");
        let err = load_from(Some(&missing), root.path()).unwrap_err();
        assert!(err.to_string().contains("nope.styx"), "{}", err);
    }
}
