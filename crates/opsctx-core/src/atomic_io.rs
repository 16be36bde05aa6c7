use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp;

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Replaces `path` with `content` in one rename. The export either holds the
/// previous report or the new one, never a prefix of it. The temporary file
/// is removed when any step fails.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .with_context(|| format!("export path '{}' has no file name", path.display()))?;
    if path.is_dir() {
        bail!("export path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create export directory {}", parent_dir.display()))?;

    let temp_path = temp_path_for(parent_dir, file_name);
    let result = persist(&temp_path, content).and_then(|()| {
        std::fs::rename(&temp_path, path).with_context(|| {
            format!(
                "failed to move export {} into place at {}",
                temp_path.display(),
                path.display()
            )
        })
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

/// Hidden sibling of the destination, unique per process and call.
fn temp_path_for(parent_dir: &Path, file_name: &str) -> PathBuf {
    parent_dir.join(format!(
        ".{file_name}.{}-{}-{}.partial",
        std::process::id(),
        current_unix_timestamp(),
        TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ))
}

fn persist(temp_path: &Path, content: &str) -> Result<()> {
    let mut file = File::create(temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to flush {}", temp_path.display()))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{temp_path_for, write_text_atomic};

    #[test]
    fn unit_temp_paths_are_hidden_and_unique() {
        let first = temp_path_for(Path::new("/exports"), "report.json");
        let second = temp_path_for(Path::new("/exports"), "report.json");
        assert_ne!(first, second);
        let name = first.file_name().and_then(|name| name.to_str()).expect("name");
        assert!(name.starts_with(".report.json."));
        assert!(name.ends_with(".partial"));
    }

    #[test]
    fn functional_repeated_exports_replace_content_and_leave_no_partials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/report.json");
        write_text_atomic(&path, "{\"run\":1}").expect("first export");
        write_text_atomic(&path, "{\"run\":2}").expect("second export");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{\"run\":2}");
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .expect("list")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("report.json")]);
    }

    #[test]
    fn regression_path_without_file_name_is_rejected() {
        let error = write_text_atomic(Path::new(""), "x").expect_err("empty path");
        assert!(error.to_string().contains("has no file name"));
    }
}
