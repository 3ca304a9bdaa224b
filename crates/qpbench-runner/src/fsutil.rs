use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::Result;

pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`, so a
/// reader never observes a half-written results table.
pub(crate) fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let tmp = sibling_tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

pub(crate) fn atomic_write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

pub(crate) fn sibling_tmp_path(path: &Path) -> PathBuf {
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts))
}

pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub(crate) fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        normalize_path(&base.join(path))
    }
}

#[cfg(test)]
pub(crate) fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "qpbench_{}_{}_{}",
        tag,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_drops_dot_segments() {
        let p = normalize_path(Path::new("/data/./sets/../problems/a"));
        assert_eq!(p, PathBuf::from("/data/problems/a"));
    }

    #[test]
    fn atomic_write_creates_missing_parents() {
        let root = scratch_dir("atomic_write");
        let target = root.join("nested").join("deeper").join("out.json");
        atomic_write_json_pretty(&target, &serde_json::json!({"ok": true})).expect("write");
        let back: Value = serde_json::from_slice(&fs::read(&target).expect("read")).expect("json");
        assert_eq!(back["ok"], Value::Bool(true));
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .expect("list")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "temp file left behind");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn resolve_relative_keeps_absolute_paths() {
        let base = Path::new("/bench/configs");
        assert_eq!(
            resolve_relative(base, Path::new("/abs/results.csv")),
            PathBuf::from("/abs/results.csv")
        );
        assert_eq!(
            resolve_relative(base, Path::new("../results/r.csv")),
            PathBuf::from("/bench/results/r.csv")
        );
    }
}
