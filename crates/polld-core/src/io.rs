use crate::error::{PolldError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents a crash mid-write from corrupting the accounts file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Append a single line to a file, creating it (and its parents) if needed.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    f.write_all(line.as_bytes())?;
    f.write_all(b"\n")?;
    Ok(())
}

/// Run blocking filesystem work on tokio's blocking pool so async callers,
/// the poll coordinator included, never stall on disk.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PolldError::Io(std::io::Error::other(format!("task join error: {e}"))))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/accounts.yaml");
        atomic_write(&path, b"accounts: []\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "accounts: []\n");
    }

    #[test]
    fn append_line_accumulates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pushed.jsonl");
        append_line(&path, "{\"n\":1}").unwrap();
        append_line(&path, "{\"n\":2}").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn blocking_returns_closure_result() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pushed.jsonl");
        let target = path.clone();
        blocking(move || append_line(&target, "{}")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");

        let err = blocking(|| -> Result<()> { Err(PolldError::Config("bad".into())) }).await;
        assert!(matches!(err, Err(PolldError::Config(_))));
    }
}
