// Snapshot persistence across restarts

use chrono::{DateTime, Duration, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

use super::types::{Credential, PersistedToken};
use crate::error::AuthError;

/// Distinguishes temporary files of concurrent saves
static SAVE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Why a persisted snapshot was not trusted
#[derive(Debug, PartialEq)]
pub enum LoadRejection {
    /// No file at the configured path
    Missing,
    /// File exists but could not be read
    Unreadable(String),
    /// Content is not valid JSON for a snapshot
    Malformed(String),
    /// Required fields absent or inconsistent
    Incomplete,
    /// Remaining validity at or below the minimum
    Expiring { remaining: Duration },
}

/// JSON snapshot file
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
    min_validity: Duration,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>, min_validity: Duration) -> Self {
        Self {
            path: path.into(),
            min_validity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted credential if it is still worth using.
    ///
    /// Never fails: every problem is logged and reported as "nothing usable".
    pub async fn load(&self, now: DateTime<Utc>) -> Option<Credential> {
        match self.inspect(now).await {
            Ok(credential) => {
                tracing::info!(
                    path = %self.path.display(),
                    "Loaded valid token from file (expires in {:.1} hours)",
                    hours(credential.remaining(now))
                );
                Some(credential)
            }
            Err(LoadRejection::Missing) => {
                tracing::debug!(path = %self.path.display(), "Token file does not exist");
                None
            }
            Err(LoadRejection::Unreadable(e)) => {
                tracing::error!(kind = "persistence", path = %self.path.display(), "Failed to read token file: {}", e);
                None
            }
            Err(LoadRejection::Malformed(e)) => {
                tracing::error!(kind = "persistence", path = %self.path.display(), "Invalid JSON in token file: {}", e);
                None
            }
            Err(LoadRejection::Incomplete) => {
                tracing::warn!(kind = "persistence", path = %self.path.display(), "Token file missing required fields");
                None
            }
            Err(LoadRejection::Expiring { remaining }) => {
                tracing::info!(
                    "Stored token expired or expiring soon ({:.1} hours remaining)",
                    hours(remaining)
                );
                None
            }
        }
    }

    /// Load with the rejection reason exposed
    pub async fn inspect(&self, now: DateTime<Utc>) -> Result<Credential, LoadRejection> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(LoadRejection::Missing),
            Err(e) => return Err(LoadRejection::Unreadable(e.to_string())),
        };

        let persisted: PersistedToken = serde_json::from_str(&content)
            .map_err(|e| LoadRejection::Malformed(e.to_string()))?;

        let credential = persisted
            .into_credential()
            .ok_or(LoadRejection::Incomplete)?;

        let remaining = credential.remaining(now);
        if remaining > self.min_validity {
            Ok(credential)
        } else {
            Err(LoadRejection::Expiring { remaining })
        }
    }

    /// Write the snapshot via a temporary sibling file and rename
    pub async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let persist = |e: std::io::Error| {
            AuthError::Persistence(format!("{}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(persist)?;
        }

        let content = serde_json::to_string_pretty(&PersistedToken::from(credential))
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        // Created owner-only; never readable by others, even before the rename
        let tmp = TmpFile::new(self.tmp_path());
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(tmp.path()).await.map_err(persist)?;
        file.write_all(content.as_bytes()).await.map_err(persist)?;
        file.sync_all().await.map_err(persist)?;
        drop(file);

        tokio::fs::rename(tmp.path(), &self.path)
            .await
            .map_err(persist)?;
        tmp.keep();

        tracing::debug!(path = %self.path.display(), "Token saved to file");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            SAVE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        self.path.with_file_name(name)
    }
}

/// Temporary sibling file, removed on drop unless it was renamed into place.
/// Covers both error returns and a save future dropped mid-way.
struct TmpFile {
    path: PathBuf,
    kept: bool,
}

impl TmpFile {
    fn new(path: PathBuf) -> Self {
        Self { path, kept: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        if !self.kept {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn token_file(dir: &TempDir) -> TokenFile {
        TokenFile::new(dir.path().join("vamsys_token.json"), Duration::seconds(3600))
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        let now = Utc::now();
        let credential = Credential::issued("abc123".to_string(), 604_800, now);

        file.save(&credential).await.unwrap();
        let loaded = file.load(now).await.unwrap();

        assert_eq!(loaded.access_token(), "abc123");
        assert!((loaded.expires_at() - credential.expires_at()).num_milliseconds().abs() <= 1);
        assert!((loaded.refreshed_at() - credential.refreshed_at()).num_milliseconds().abs() <= 1);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        assert_eq!(file.inspect(Utc::now()).await, Err(LoadRejection::Missing));
        assert!(file.load(Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        tokio::fs::write(file.path(), "{not json").await.unwrap();

        assert!(matches!(
            file.inspect(Utc::now()).await,
            Err(LoadRejection::Malformed(_))
        ));
        assert!(file.load(Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        tokio::fs::write(file.path(), r#"{"expires_at": 99999999999}"#)
            .await
            .unwrap();

        assert_eq!(file.inspect(Utc::now()).await, Err(LoadRejection::Incomplete));
    }

    #[tokio::test]
    async fn test_expired_file_is_discarded() {
        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        tokio::fs::write(
            file.path(),
            r#"{"access_token": "old", "expires_at": 5000, "refreshed_at": 1000}"#,
        )
        .await
        .unwrap();

        assert!(matches!(
            file.inspect(at(6000)).await,
            Err(LoadRejection::Expiring { .. })
        ));
        assert!(file.load(at(6000)).await.is_none());
    }

    #[tokio::test]
    async fn test_min_validity_boundary() {
        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        tokio::fs::write(
            file.path(),
            r#"{"access_token": "tok", "expires_at": 10000, "refreshed_at": 1000}"#,
        )
        .await
        .unwrap();

        // 3601 seconds left
        assert!(file.load(at(6399)).await.is_some());
        // Exactly 3600 seconds left
        assert_eq!(
            file.inspect(at(6400)).await,
            Err(LoadRejection::Expiring {
                remaining: Duration::seconds(3600)
            })
        );
        // 3599 seconds left
        assert!(file.load(at(6401)).await.is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let file = TokenFile::new(
            dir.path().join("nested").join("state").join("token.json"),
            Duration::seconds(60),
        );
        let credential = Credential::issued("tok".to_string(), 3600, Utc::now());

        file.save(&credential).await.unwrap();
        assert!(file.path().exists());

        // Only the snapshot itself is left behind
        let entries = std::fs::read_dir(file.path().parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        file.save(&Credential::issued("tok".to_string(), 3600, Utc::now()))
            .await
            .unwrap();

        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_save_failure_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the final rename fail
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("child"), "x").unwrap();
        let file = TokenFile::new(&path, Duration::seconds(60));

        let err = file
            .save(&Credential::issued("tok".to_string(), 3600, Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "persistence");

        // The temporary sibling does not outlive the failed save
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("occupied")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_replaces_world_readable_snapshot() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        std::fs::write(file.path(), "{}").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        file.save(&Credential::issued("tok".to_string(), 3600, Utc::now()))
            .await
            .unwrap();

        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_tmp_file_removed_unless_kept() {
        let dir = TempDir::new().unwrap();

        let dropped = dir.path().join("a.tmp");
        std::fs::write(&dropped, "x").unwrap();
        drop(TmpFile::new(dropped.clone()));
        assert!(!dropped.exists());

        let kept = dir.path().join("b.tmp");
        std::fs::write(&kept, "x").unwrap();
        TmpFile::new(kept.clone()).keep();
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn test_written_format() {
        let dir = TempDir::new().unwrap();
        let file = token_file(&dir);
        file.save(&Credential::issued("abc123".to_string(), 3600, at(1000)))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(raw["access_token"], "abc123");
        assert_eq!(raw["expires_at"], 4600.0);
        assert_eq!(raw["refreshed_at"], 1000.0);
    }
}
