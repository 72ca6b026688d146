//! Project file and database path conventions

use std::path::{Path, PathBuf};

use crate::error::{Result, TimelineError};
use crate::model::CheckpointHash;

/// Check that `path` names a file by absolute path
pub fn project_file(path: &Path) -> Result<&Path> {
    if !path.is_absolute() {
        return Err(invalid(path, "path must be absolute"));
    }
    if path.file_name().is_none() {
        return Err(invalid(path, "path has no file name"));
    }
    Ok(path)
}

/// Database for a project file: `<file name>.<extension>` next to it
pub fn db_path(project: &Path, extension: &str) -> Result<PathBuf> {
    let project = project_file(project)?;
    let Some(file_name) = project.file_name() else {
        return Err(invalid(project, "path has no file name"));
    };

    let mut db_name = file_name.to_os_string();
    db_name.push(".");
    db_name.push(extension);

    Ok(project.with_file_name(db_name))
}

/// Where "restore to a new file" writes a checkpoint.
///
/// The target name is made file-name safe and given the active file's
/// extension; the result sits next to the active file and is never the
/// active file itself.
pub fn restore_destination(active: &Path, name: &str, hash: &CheckpointHash) -> Result<PathBuf> {
    let active = project_file(active)?;

    let mut stem = sanitize(name);
    if stem.is_empty() {
        stem = format!("checkpoint_{}", sanitize(hash.short()));
    }

    let file_name = match active.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    };
    let destination = active.with_file_name(file_name);

    if destination == active {
        return Err(invalid(
            &destination,
            "restoring to a new file would overwrite the active file",
        ));
    }

    Ok(destination)
}

/// Collapse whitespace runs and path separators into `_`
fn sanitize(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .trim_matches('.')
        .to_string()
}

fn invalid(path: &Path, reason: &str) -> TimelineError {
    TimelineError::InvalidPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_path_next_to_project() {
        let db = db_path(Path::new("/proj/scene.blend"), "timeline").unwrap();
        assert_eq!(db, PathBuf::from("/proj/scene.blend.timeline"));
    }

    #[test]
    fn test_db_path_without_extension() {
        let db = db_path(Path::new("/proj/a"), "timeline").unwrap();
        assert_eq!(db, PathBuf::from("/proj/a.timeline"));
    }

    #[test]
    fn test_relative_project_rejected() {
        let err = db_path(Path::new("scene.blend"), "timeline").unwrap_err();
        assert!(matches!(err, TimelineError::InvalidPath { .. }));
    }

    #[test]
    fn test_restore_destination_from_message() {
        let dest = restore_destination(
            Path::new("/proj/scene.blend"),
            "before  lighting pass",
            &CheckpointHash::new("abc"),
        )
        .unwrap();

        assert_eq!(dest, PathBuf::from("/proj/before_lighting_pass.blend"));
    }

    #[test]
    fn test_restore_destination_stays_in_directory() {
        let dest = restore_destination(
            Path::new("/proj/scene.blend"),
            "../../etc/passwd",
            &CheckpointHash::new("abc"),
        )
        .unwrap();

        assert_eq!(dest.parent(), Some(Path::new("/proj")));
        assert_eq!(dest, PathBuf::from("/proj/_.._etc_passwd.blend"));
    }

    #[test]
    fn test_restore_destination_empty_name_uses_hash() {
        let dest = restore_destination(
            Path::new("/proj/scene.blend"),
            "   ",
            &CheckpointHash::new("0123456789abcdef"),
        )
        .unwrap();

        assert_eq!(dest, PathBuf::from("/proj/checkpoint_01234567.blend"));
    }

    #[test]
    fn test_restore_destination_never_the_active_file() {
        let err = restore_destination(
            Path::new("/proj/scene.blend"),
            "scene",
            &CheckpointHash::new("h0"),
        )
        .unwrap_err();

        assert!(matches!(err, TimelineError::InvalidPath { .. }));
    }
}
