//! JSON document persistence shared by the category and feedback stores

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// Load a JSON document, or `None` if the file does not exist yet
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let json = tokio::fs::read_to_string(path).await?;
    if json.trim().is_empty() {
        return Ok(None);
    }

    let value = serde_json::from_str(&json)?;
    Ok(Some(value))
}

/// Write a JSON document so that readers see either the old or the new version.
///
/// The data is flushed to disk before the rename and the directory entry is
/// flushed after it, so a successful return survives a crash.
pub async fn write_json_durable<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(parent).await?;

    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = temp_path_for(path);

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await?;
    sync_dir(parent).await?;
    tracing::debug!("Persisted {:?}", path);
    Ok(())
}

/// Flush a directory so a rename inside it is on disk
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

// Directories cannot be opened for syncing on this platform
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let loaded: Option<Vec<String>> = load_json(&temp_dir.path().join("missing.json"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parent_and_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("categories.json");

        write_json_durable(&path, &vec!["General Inquiry".to_string()])
            .await
            .unwrap();

        assert!(path.exists());
        assert!(!temp_path_for(&path).exists());

        let loaded: Option<Vec<String>> = load_json(&path).await.unwrap();
        assert_eq!(loaded, Some(vec!["General Inquiry".to_string()]));
    }

    #[tokio::test]
    async fn test_sync_dir_flushes_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(sync_dir(temp_dir.path()).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sync_dir_reports_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(sync_dir(&temp_dir.path().join("gone")).await.is_err());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_previous_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("categories.json");

        write_json_durable(&path, &vec!["Billing".to_string()])
            .await
            .unwrap();
        write_json_durable(&path, &vec!["Billing".to_string(), "Returns".to_string()])
            .await
            .unwrap();

        let loaded: Option<Vec<String>> = load_json(&path).await.unwrap();
        assert_eq!(loaded, Some(vec!["Billing".to_string(), "Returns".to_string()]));
        assert!(!temp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_load_empty_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("feedback.json");
        tokio::fs::write(&path, "").await.unwrap();

        let loaded: Option<Vec<String>> = load_json(&path).await.unwrap();
        assert!(loaded.is_none());
    }
}
