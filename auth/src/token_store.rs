//! Durable client-side storage for the token triple.
//!
//! Replaces the web clients' `localStorage`/`sessionStorage` keys with a
//! JSON file under the app home directory, written user-only on Unix.
//! The pending-email marker used by the multi-step sign-up and password
//! flows lives in the same file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// File name for persisted tokens, alongside any other app state.
const TOKENS_FILE: &str = "tokens.json";

/// The three bearer tokens a signed-in session rests on.
///
/// Invariant: a triple only exists as a whole. A storage file with any
/// member missing reads back as "not signed in".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTriple {
    /// Identity token carrying the display claims.
    pub id_token: String,
    /// Bearer token for backend API calls.
    pub access_token: String,
    /// Long-lived token exchanged for fresh id/access tokens.
    pub refresh_token: String,
}

/// On-disk layout. Fields are independently optional so a partially written
/// or hand-edited file degrades to signed-out instead of failing to parse.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    /// Email captured at sign-up, awaited by the confirmation step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_email: Option<String>,
}

/// File-backed token store.
pub struct TokenStore {
    file_path: PathBuf,
}

impl TokenStore {
    /// Creates a store rooted at the default app home (`~/.openglot`).
    pub fn new() -> io::Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| io::Error::other("could not determine home directory"))?;
        Ok(Self::with_dir(home.join(".openglot")))
    }

    /// Creates a store rooted at a specific directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            file_path: dir.into().join(TOKENS_FILE),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Persists all three tokens in a single write.
    pub fn store(
        &self,
        id_token: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), AuthError> {
        let mut file = self.read_file();
        file.id_token = Some(id_token.to_string());
        file.access_token = Some(access_token.to_string());
        file.refresh_token = Some(refresh_token.to_string());
        self.write_file(&file)
    }

    /// Returns the stored triple, or `None` unless all three tokens are
    /// present. Never fails: unreadable or malformed state reads as absent.
    pub fn get(&self) -> Option<TokenTriple> {
        let file = self.read_file();
        Some(TokenTriple {
            id_token: file.id_token?,
            access_token: file.access_token?,
            refresh_token: file.refresh_token?,
        })
    }

    /// Removes all three tokens. Idempotent; the pending-email marker is
    /// left in place.
    pub fn clear(&self) -> Result<(), AuthError> {
        let mut file = self.read_file();
        file.id_token = None;
        file.access_token = None;
        file.refresh_token = None;
        self.write_file(&file)
    }

    /// Records the email awaiting sign-up confirmation.
    pub fn set_pending_email(&self, email: &str) -> Result<(), AuthError> {
        let mut file = self.read_file();
        file.pending_email = Some(email.to_string());
        self.write_file(&file)
    }

    /// Email recorded at sign-up, if any.
    pub fn pending_email(&self) -> Option<String> {
        self.read_file().pending_email
    }

    /// Drops the pending-email marker. Idempotent.
    pub fn clear_pending_email(&self) -> Result<(), AuthError> {
        let mut file = self.read_file();
        file.pending_email = None;
        self.write_file(&file)
    }

    fn read_file(&self) -> StoreFile {
        let Ok(content) = fs::read_to_string(&self.file_path) else {
            return StoreFile::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    fn write_file(&self, file: &StoreFile) -> Result<(), AuthError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(storage_err)?;
        }

        let content = serde_json::to_string_pretty(file)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        fs::write(&self.file_path, content).map_err(storage_err)?;

        // Tokens are credentials; keep the file user-only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.file_path, permissions).map_err(storage_err)?;
        }

        Ok(())
    }
}

fn storage_err(e: io::Error) -> AuthError {
    AuthError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path());

        store.store("id", "access", "refresh").unwrap();

        let triple = store.get().unwrap();
        assert_eq!(triple.id_token, "id");
        assert_eq!(triple.access_token, "access");
        assert_eq!(triple.refresh_token, "refresh");
    }

    #[test]
    fn get_on_empty_store_is_none() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path());
        assert!(store.get().is_none());
    }

    #[test]
    fn partial_triple_reads_as_absent() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path());

        fs::create_dir_all(dir.path()).unwrap();
        fs::write(
            store.path(),
            r#"{"id_token": "id", "access_token": "access"}"#,
        )
        .unwrap();

        assert!(store.get().is_none());
    }

    #[test]
    fn malformed_file_reads_as_absent() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path());

        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.path(), "not json").unwrap();

        assert!(store.get().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path());

        store.store("id", "access", "refresh").unwrap();
        store.clear().unwrap();
        assert!(store.get().is_none());

        store.clear().unwrap();
        assert!(store.get().is_none());
    }

    #[test]
    fn clear_keeps_pending_email() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path());

        store.set_pending_email("a@b.com").unwrap();
        store.store("id", "access", "refresh").unwrap();
        store.clear().unwrap();

        assert_eq!(store.pending_email().as_deref(), Some("a@b.com"));
    }

    #[test]
    fn pending_email_lifecycle() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path());

        assert!(store.pending_email().is_none());
        store.set_pending_email("a@b.com").unwrap();
        assert_eq!(store.pending_email().as_deref(), Some("a@b.com"));
        store.clear_pending_email().unwrap();
        assert!(store.pending_email().is_none());
        store.clear_pending_email().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_user_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = TokenStore::with_dir(dir.path());
        store.store("id", "access", "refresh").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
