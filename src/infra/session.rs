//! Session identity lookup for the HTTP gateway.
//!
//! The engine core never reads the token; only the gateway attaches it to requests.

use std::fs;
use std::path::PathBuf;

use crate::config::GatewaySettings;

use super::error::InfraError;

/// Environment variable consulted when no token file is configured.
pub const SESSION_TOKEN_ENV: &str = "COHERENCE_SESSION_TOKEN";

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    token_file: Option<PathBuf>,
    env_token: Option<String>,
}

impl SessionStore {
    pub fn new(token_file: Option<PathBuf>, env_token: Option<String>) -> Self {
        Self {
            token_file,
            env_token,
        }
    }

    /// Token file from settings, token value from the process environment.
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self::new(
            settings.session_token_file.clone(),
            std::env::var(SESSION_TOKEN_ENV).ok(),
        )
    }

    /// Resolve the session token. A configured token file takes precedence over the environment.
    pub fn token(&self) -> Result<String, InfraError> {
        let token = match &self.token_file {
            Some(path) => fs::read_to_string(path)
                .map_err(|err| {
                    InfraError::session(format!(
                        "failed to read token file {}: {err}",
                        path.display()
                    ))
                })?
                .trim()
                .to_string(),
            None => self
                .env_token
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
        };

        if token.is_empty() {
            return Err(InfraError::session(format!(
                "session token is required (use --key-file or {SESSION_TOKEN_ENV})"
            )));
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn tmp_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("tmp file");
        file.write_all(contents.as_bytes()).expect("write tmp");
        file
    }

    #[test]
    fn token_file_takes_precedence_over_env() {
        let file = tmp_file("file-token\n");
        let store = SessionStore::new(
            Some(file.path().to_path_buf()),
            Some("env-token".to_string()),
        );
        assert_eq!(store.token().expect("token"), "file-token");
    }

    #[test]
    fn env_token_is_used_without_file() {
        let store = SessionStore::new(None, Some(" env-token ".to_string()));
        assert_eq!(store.token().expect("token"), "env-token");
    }

    #[test]
    fn missing_token_is_a_session_error() {
        let err = SessionStore::default().token().expect_err("no token");
        assert!(matches!(err, InfraError::Session { .. }));
    }

    #[test]
    fn blank_token_file_is_rejected() {
        let file = tmp_file("   \n");
        let store = SessionStore::new(Some(file.path().to_path_buf()), None);
        assert!(store.token().is_err());
    }

    #[test]
    fn unreadable_token_file_is_reported() {
        let store = SessionStore::new(Some(PathBuf::from("/nonexistent/coherence/token")), None);
        let err = store.token().expect_err("missing file");
        assert!(err.to_string().contains("failed to read token file"));
    }
}
