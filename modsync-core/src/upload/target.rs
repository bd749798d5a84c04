//! The data file being uploaded
//!
//! The file is a JSON document whose top-level object carries a `version` or,
//! failing that, a `timestamp`. That value names the upload branch.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::git::{sanitize_branch_name, validate_branch_name};
use crate::{Error, Result};

/// A parsed upload target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the repository root
    pub relative: PathBuf,
    /// The version or timestamp as written in the file
    pub label: String,
    /// Branch name derived from the label
    pub branch: String,
}

/// Locate and parse `file` inside the repository rooted at `root`
///
/// `file` may be relative to `root` or absolute below it.
pub fn read_target(root: &Path, file: &Path) -> Result<TargetFile> {
    let relative = if file.is_absolute() {
        file.strip_prefix(root)
            .map_err(|_| {
                Error::Config(format!(
                    "{} is not inside the repository at {}",
                    file.display(),
                    root.display()
                ))
            })?
            .to_path_buf()
    } else {
        file.to_path_buf()
    };
    let path = root.join(&relative);

    if !path.is_file() {
        return Err(Error::Config(format!("Upload file not found: {}", path.display())));
    }

    let document: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let label = label_of(&document).ok_or_else(|| {
        Error::Config(format!(
            "{} has no top-level \"version\" or \"timestamp\" field",
            path.display()
        ))
    })?;

    let branch = sanitize_branch_name(&label);
    validate_branch_name(&branch)?;

    Ok(TargetFile {
        path,
        relative,
        label,
        branch,
    })
}

fn label_of(document: &Value) -> Option<String> {
    ["version", "timestamp"]
        .iter()
        .filter_map(|key| document.get(key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_version_names_branch() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Data/mods.json", r#"{"version": "1.5.2", "mods": []}"#);

        let target = read_target(dir.path(), Path::new("Data/mods.json")).unwrap();
        assert_eq!(target.label, "1.5.2");
        assert_eq!(target.branch, "1.5.2");
        assert_eq!(target.relative, PathBuf::from("Data/mods.json"));
    }

    #[test]
    fn test_numeric_timestamp() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "db.json", r#"{"timestamp": 1714563000}"#);

        let absolute = dir.path().join("db.json");
        let target = read_target(dir.path(), &absolute).unwrap();
        assert_eq!(target.branch, "1714563000");
        assert_eq!(target.relative, PathBuf::from("db.json"));
    }

    #[test]
    fn test_version_preferred_over_timestamp() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "db.json", r#"{"timestamp": 1, "version": "2.0"}"#);

        assert_eq!(read_target(dir.path(), Path::new("db.json")).unwrap().label, "2.0");
    }

    #[test]
    fn test_missing_field() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "db.json", r#"{"mods": []}"#);

        let err = read_target(dir.path(), Path::new("db.json")).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_not_json() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "db.json", "version = 1");

        assert!(matches!(
            read_target(dir.path(), Path::new("db.json")),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_missing_file_and_outside_path() {
        let dir = TempDir::new().unwrap();
        assert!(read_target(dir.path(), Path::new("nope.json")).is_err());
        assert!(read_target(dir.path(), Path::new("/etc/hosts")).is_err());
    }
}
