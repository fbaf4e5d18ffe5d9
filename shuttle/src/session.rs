//! Authentication context threaded into runtime construction

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use shuttle_gateway::TokenSet;
use tracing::{debug, info};

use crate::error::{Result, ShuttleError};
use crate::gateway::Gateway;

/// Bearer token obtained from the identity provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    preferred_username: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            issued_at: Utc::now(),
        }
    }

    pub fn from_tokens(tokens: TokenSet) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            issued_at: Utc::now(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// `preferred_username` claim of the access token
    ///
    /// The token is only read here, not trusted: the signature is checked by
    /// the services that accept it.
    pub fn username(&self) -> Option<String> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<IdentityClaims>(&self.access_token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .and_then(|data| data.claims.preferred_username)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Who is acting, and through which gateway
///
/// Cloned into every runtime at construction. Mock runtimes ignore it;
/// remote runtimes fail with [`ShuttleError::MissingCredential`] when it
/// carries no credential.
#[derive(Clone, Default)]
pub struct Session {
    credential: Option<Credential>,
    gateway: Option<Arc<dyn Gateway>>,
}

impl Session {
    /// Session with no credential and no gateway
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn login(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    pub fn logout(&mut self) {
        self.credential = None;
    }

    pub fn is_logged_in(&self) -> bool {
        self.credential.is_some()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn require_credential(&self, operation: &str) -> Result<&Credential> {
        self.credential
            .as_ref()
            .ok_or_else(|| ShuttleError::MissingCredential(operation.to_string()))
    }

    pub fn gateway(&self) -> Result<&Arc<dyn Gateway>> {
        self.gateway
            .as_ref()
            .ok_or_else(|| ShuttleError::Config("no gateway configured for remote runtime".into()))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credential", &self.credential)
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}

/// Credential cache on disk
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/shuttle/credentials.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("shuttle").join("credentials.json"))
            .ok_or_else(|| ShuttleError::Config("could not determine config directory".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            debug!("No cached credential at {}", self.path.display());
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        let credential = serde_json::from_str(&json)?;
        Ok(Some(credential))
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(credential)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // An existing file keeps its old mode, so tighten it before writing
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(json.as_bytes())?;

        info!("Credential saved to {}", self.path.display());
        Ok(())
    }

    /// Returns whether a cached credential was removed
    pub fn clear(&self) -> Result<bool> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            info!("Credential removed from {}", self.path.display());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
