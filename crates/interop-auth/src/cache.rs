//! Single-record access token cache
//!
//! Persists the active access token as `{"token": "...", "exp": 1700000000}`
//! so later invocations can skip the assertion exchange while the token is
//! still valid. Each save overwrites the previous record.
//!
//! Writes go through a temp file + rename in the same directory, so a
//! concurrent reader sees either the old record or the new one, never a
//! partial file. Independent processes saving at the same time still race
//! (last writer wins); no lock is taken.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::AccessToken;
use crate::error::{Error, Result};
use crate::secret::Secret;

/// On-disk shape of the cached credential.
///
/// `exp` is optional because older or hand-edited files may carry `null`;
/// such a record is never valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredential {
    pub token: Secret<String>,
    #[serde(default)]
    pub exp: Option<u64>,
}

impl CachedCredential {
    /// The credential as an [`AccessToken`] if it is valid at `now`.
    pub fn into_valid_token(self, now: u64) -> Option<AccessToken> {
        match self.exp {
            Some(exp) if TokenCache::valid_at(Some(exp), now) => Some(AccessToken {
                token: self.token,
                expires_at: exp,
            }),
            _ => None,
        }
    }
}

impl From<&AccessToken> for CachedCredential {
    fn from(token: &AccessToken) -> Self {
        Self {
            token: token.token.clone(),
            exp: Some(token.expires_at),
        }
    }
}

/// File-backed cache holding at most one credential.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
    strict: bool,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strict: false,
        }
    }

    /// In strict mode an unreadable or corrupt cache file fails `load` with
    /// [`Error::CacheRead`] instead of being treated as empty.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached credential.
    ///
    /// A missing file, or a record with an empty token, yields `Ok(None)`.
    pub async fn load(&self) -> Result<Option<CachedCredential>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cached token");
                return Ok(None);
            }
            Err(e) => return self.degrade(format!("reading token cache: {e}")),
        };

        let credential: CachedCredential = match serde_json::from_str(&contents) {
            Ok(credential) => credential,
            Err(e) => return self.degrade(format!("parsing token cache: {e}")),
        };

        if credential.token.expose().is_empty() {
            debug!(path = %self.path.display(), "cached token is empty, ignoring");
            return Ok(None);
        }

        debug!(path = %self.path.display(), exp = ?credential.exp, "loaded cached token");
        Ok(Some(credential))
    }

    fn degrade(&self, reason: String) -> Result<Option<CachedCredential>> {
        if self.strict {
            return Err(Error::CacheRead(format!(
                "{}: {reason}",
                self.path.display()
            )));
        }
        warn!(path = %self.path.display(), error = %reason, "ignoring unreadable token cache");
        Ok(None)
    }

    /// Overwrite the cached record with `token`.
    ///
    /// Creates the parent directory if needed. The file is 0600 on unix
    /// since it holds a bearer token.
    pub async fn save(&self, token: &AccessToken) -> Result<()> {
        let json = serde_json::to_string(&CachedCredential::from(token))
            .map_err(|e| Error::CacheWrite(format!("serializing token: {e}")))?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::CacheWrite(format!("creating {}: {e}", dir.display())))?;

        let tmp_path = dir.join(format!(".token-cache.tmp.{}", std::process::id()));

        if let Err(e) = self.replace_with_temp(&tmp_path, json.as_bytes()).await {
            // The temp file holds the bearer token; never leave it behind
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        info!(path = %self.path.display(), exp = token.expires_at, "saved token to cache");
        Ok(())
    }

    /// Write `contents` to `tmp_path`, restrict it to 0600 and rename it over
    /// the cache path.
    async fn replace_with_temp(&self, tmp_path: &Path, contents: &[u8]) -> Result<()> {
        tokio::fs::write(tmp_path, contents)
            .await
            .map_err(|e| Error::CacheWrite(format!("writing temp token file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(tmp_path, perms)
                .await
                .map_err(|e| Error::CacheWrite(format!("setting token file permissions: {e}")))?;
        }

        tokio::fs::rename(tmp_path, &self.path)
            .await
            .map_err(|e| Error::CacheWrite(format!("replacing {}: {e}", self.path.display())))
    }

    /// True iff `expiry` is present and strictly in the future.
    pub fn valid(expiry: Option<u64>) -> bool {
        Self::valid_at(expiry, crate::unix_now())
    }

    pub fn valid_at(expiry: Option<u64>, now: u64) -> bool {
        let valid = matches!(expiry, Some(exp) if exp > now);
        debug!(exp = ?expiry, now, valid, "checked token expiry");
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(value: &str, expires_at: u64) -> AccessToken {
        AccessToken {
            token: Secret::from(value),
            expires_at,
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));

        cache.save(&token("at_1", 1_900_000_000)).await.unwrap();
        let loaded = cache.load().await.unwrap().unwrap();

        assert_eq!(loaded.token.expose(), "at_1");
        assert_eq!(loaded.exp, Some(1_900_000_000));
    }

    #[tokio::test]
    async fn file_format_is_token_and_exp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        TokenCache::new(&path)
            .save(&token("at_1", 42))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"token": "at_1", "exp": 42}));
    }

    #[tokio::test]
    async fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));

        cache.save(&token("old", 1)).await.unwrap();
        cache.save(&token("new", 2)).await.unwrap();

        let loaded = cache.load().await.unwrap().unwrap();
        assert_eq!(loaded.token.expose(), "new");
        assert_eq!(loaded.exp, Some(2));
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmp").join("nested").join("token.json");

        TokenCache::new(&path).save(&token("at", 1)).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("absent.json")).strict(true);
        assert!(cache.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_empty_in_lenient_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        assert!(TokenCache::new(&path).load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_error_in_strict_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = TokenCache::new(&path).strict(true).load().await.unwrap_err();
        assert!(matches!(err, Error::CacheRead(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn null_exp_and_empty_token_are_handled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let cache = TokenCache::new(&path);

        tokio::fs::write(&path, r#"{"token":"at","exp":null}"#)
            .await
            .unwrap();
        let loaded = cache.load().await.unwrap().unwrap();
        assert_eq!(loaded.exp, None);
        assert!(!TokenCache::valid(loaded.exp));

        tokio::fs::write(&path, r#"{"token":"","exp":null}"#)
            .await
            .unwrap();
        assert!(cache.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_into_unwritable_location_propagates() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, "x").await.unwrap();

        let err = TokenCache::new(blocker.join("token.json"))
            .save(&token("at", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheWrite(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn failed_replace_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory sits where the cache file should go
        let path = dir.path().join("token.json");
        tokio::fs::create_dir_all(path.join("occupied")).await.unwrap();

        let err = TokenCache::new(&path)
            .save(&token("at_secret", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheWrite(_)), "got {err:?}");

        let mut entries: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["token.json"], "temp token file left behind");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cache_file_is_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        TokenCache::new(&path).save(&token("at", 1)).await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token cache must be 0600, got {mode:o}");
    }

    #[test]
    fn validity_is_strictly_after_now() {
        let now = 1_700_000_000;
        assert!(!TokenCache::valid_at(None, now));
        assert!(!TokenCache::valid_at(Some(now), now));
        assert!(!TokenCache::valid_at(Some(now - 1), now));
        assert!(TokenCache::valid_at(Some(now + 1), now));
    }

    #[test]
    fn validity_against_wall_clock() {
        let now = crate::unix_now();
        assert!(!TokenCache::valid(None));
        assert!(!TokenCache::valid(Some(now)));
        assert!(!TokenCache::valid(Some(now - 100)));
        assert!(TokenCache::valid(Some(now + 3600)));
    }

    #[test]
    fn expired_credential_is_not_converted() {
        let now = 1_700_000_000;
        let stale = CachedCredential {
            token: Secret::from("X"),
            exp: Some(now - 100),
        };
        assert!(stale.into_valid_token(now).is_none());

        let fresh = CachedCredential {
            token: Secret::from("Y"),
            exp: Some(now + 100),
        };
        let token = fresh.into_valid_token(now).unwrap();
        assert_eq!(token.token.expose(), "Y");
        assert_eq!(token.expires_at, now + 100);
    }
}
