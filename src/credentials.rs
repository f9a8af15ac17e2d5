use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

const BEARER_PREFIX: &str = "Bearer ";

/// How the Cloudflare key is presented in the `Authorization` header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthKind {
    /// Global API key, sent as is.
    #[default]
    #[serde(rename = "global")]
    GlobalKey,
    /// Scoped API token, sent as `Bearer <token>`.
    #[serde(rename = "token")]
    ApiToken,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub key: String,
    pub kind: AuthKind,
}

impl Credentials {
    pub fn new(email: impl Into<String>, key: impl Into<String>, kind: AuthKind) -> Self {
        Self {
            email: email.into(),
            key: key.into(),
            kind,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.email.trim().is_empty() && !self.key.trim().is_empty()
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        match self.kind {
            AuthKind::GlobalKey => self.key.clone(),
            AuthKind::ApiToken => format!("{}{}", BEARER_PREFIX, self.key),
        }
    }
}

// The key must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("key", &"<REDACTED>")
            .field("kind", &self.kind)
            .finish()
    }
}

/// On-disk layout. Older files carry no `key_type` and store tokens with the
/// `Bearer ` prefix baked into `api_key`.
#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    api_email: String,
    api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_type: Option<AuthKind>,
}

impl From<StoredCredentials> for Credentials {
    fn from(stored: StoredCredentials) -> Self {
        match stored.key_type {
            Some(kind) => Credentials::new(stored.api_email, stored.api_key, kind),
            None => match stored.api_key.strip_prefix(BEARER_PREFIX) {
                Some(token) => Credentials::new(stored.api_email, token, AuthKind::ApiToken),
                None => Credentials::new(stored.api_email, stored.api_key, AuthKind::GlobalKey),
            },
        }
    }
}

impl From<&Credentials> for StoredCredentials {
    fn from(creds: &Credentials) -> Self {
        Self {
            api_email: creds.email.clone(),
            api_key: creds.key.clone(),
            key_type: Some(creds.kind),
        }
    }
}

/// Flat JSON credential record on disk.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing, unreadable or incomplete file yields `None`; the caller then
    /// asks the operator for credentials.
    pub fn load(&self) -> Option<Credentials> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No saved credentials at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read credentials from {}: {}", self.path.display(), e);
                return None;
            }
        };

        let stored: StoredCredentials = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring malformed credentials file {}: {}", self.path.display(), e);
                return None;
            }
        };

        let creds = Credentials::from(stored);
        creds.is_complete().then_some(creds)
    }

    pub fn save(&self, creds: &Credentials) -> Result<()> {
        let content = serde_json::to_string_pretty(&StoredCredentials::from(creds))
            .context("Failed to serialize credentials")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write credentials file: {}", self.path.display()))?;
        debug!("Saved credentials to {}", self.path.display());
        Ok(())
    }
}
