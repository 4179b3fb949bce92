//! Deploy credentials
//!
//! Credentials are resolved once per deploy, moved into client construction
//! and dropped with the client. Every type here redacts itself in `Debug`.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::CredentialError;

/// Environment variable holding the access key id.
pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable holding the secret access key.
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable holding the session token.
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

/// Plaintext AWS credentials for a single deploy.
pub struct AwsCredentials {
    access_key_id: SecretString,
    secret_access_key: SecretString,
    session_token: Option<SecretString>,
}

impl AwsCredentials {
    /// Create credentials, rejecting empty key material.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Result<Self, CredentialError> {
        let access_key_id = non_empty("access key", access_key_id.into())?;
        let secret_access_key = non_empty("secret key", secret_access_key.into())?;
        let session_token = match session_token {
            Some(token) => Some(non_empty("session token", token)?),
            None => None,
        };
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }

    pub fn access_key_id(&self) -> &str {
        self.access_key_id.expose_secret()
    }

    pub fn secret_access_key(&self) -> &str {
        self.secret_access_key.expose_secret()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_ref().map(|t| t.expose_secret())
    }

    pub fn has_session_token(&self) -> bool {
        self.session_token.is_some()
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &"[REDACTED]")
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn non_empty(name: &'static str, value: String) -> Result<SecretString, CredentialError> {
    if value.trim().is_empty() {
        return Err(CredentialError::Empty(name));
    }
    Ok(SecretString::from(value))
}

/// Source of credentials for one deploy invocation.
///
/// `resolve` is called exactly once per deploy; implementations must not
/// cache results across calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Short, non-secret description of where credentials come from.
    fn source(&self) -> String;

    async fn resolve(&self) -> Result<AwsCredentials, CredentialError>;
}

// ---------------------------------------------------------------------------
// StaticCredentials
// ---------------------------------------------------------------------------

/// Credentials handed in directly by the caller.
pub struct StaticCredentials {
    access_key_id: SecretString,
    secret_access_key: SecretString,
    session_token: Option<SecretString>,
}

impl StaticCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: SecretString::from(access_key_id.into()),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: session_token.map(SecretString::from),
        }
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticCredentials([REDACTED])")
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    fn source(&self) -> String {
        "static".to_string()
    }

    async fn resolve(&self) -> Result<AwsCredentials, CredentialError> {
        AwsCredentials::new(
            self.access_key_id.expose_secret(),
            self.secret_access_key.expose_secret(),
            self.session_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
        )
    }
}

// ---------------------------------------------------------------------------
// EnvCredentials
// ---------------------------------------------------------------------------

/// Credentials read from the standard AWS environment variables.
#[derive(Debug, Default, Clone)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    fn source(&self) -> String {
        "environment".to_string()
    }

    async fn resolve(&self) -> Result<AwsCredentials, CredentialError> {
        let read = |name: &'static str| {
            std::env::var(name).map_err(|_| CredentialError::Missing {
                name,
                source_kind: "environment".to_string(),
            })
        };
        let access_key_id = read(ACCESS_KEY_VAR)?;
        let secret_access_key = read(SECRET_KEY_VAR)?;
        let session_token = std::env::var(SESSION_TOKEN_VAR).ok();
        AwsCredentials::new(access_key_id, secret_access_key, session_token)
    }
}

// ---------------------------------------------------------------------------
// SecretRef / SecretRefCredentials
// ---------------------------------------------------------------------------

/// Where a single secret value lives.
///
/// Parsed from `env:NAME`, `file:PATH`, or taken as a literal value.
pub enum SecretRef {
    Env(String),
    File(PathBuf),
    Literal(SecretString),
}

impl SecretRef {
    pub fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix("env:") {
            SecretRef::Env(name.to_string())
        } else if let Some(path) = raw.strip_prefix("file:") {
            SecretRef::File(PathBuf::from(path))
        } else {
            SecretRef::Literal(SecretString::from(raw.to_string()))
        }
    }

    /// Read the plaintext value.
    pub async fn read(&self) -> Result<String, CredentialError> {
        match self {
            SecretRef::Env(name) => std::env::var(name).map_err(|e| CredentialError::Unreadable {
                reference: self.to_string(),
                message: e.to_string(),
            }),
            SecretRef::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|s| s.trim_end_matches(['\r', '\n']).to_string())
                .map_err(|e| CredentialError::Unreadable {
                    reference: self.to_string(),
                    message: e.to_string(),
                }),
            SecretRef::Literal(value) => Ok(value.expose_secret().to_string()),
        }
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretRef::Env(name) => write!(f, "env:{}", name),
            SecretRef::File(path) => write!(f, "file:{}", path.display()),
            SecretRef::Literal(_) => f.write_str("literal"),
        }
    }
}

impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretRef({})", self)
    }
}

/// Credentials whose values are each resolved from a [`SecretRef`].
#[derive(Debug)]
pub struct SecretRefCredentials {
    access_key_id: SecretRef,
    secret_access_key: SecretRef,
    session_token: Option<SecretRef>,
}

impl SecretRefCredentials {
    pub fn new(
        access_key_id: SecretRef,
        secret_access_key: SecretRef,
        session_token: Option<SecretRef>,
    ) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            session_token,
        }
    }

    /// Parse each value as a secret reference.
    pub fn parse(
        access_key_id: &str,
        secret_access_key: &str,
        session_token: Option<&str>,
    ) -> Self {
        Self::new(
            SecretRef::parse(access_key_id),
            SecretRef::parse(secret_access_key),
            session_token.map(SecretRef::parse),
        )
    }
}

#[async_trait]
impl CredentialProvider for SecretRefCredentials {
    fn source(&self) -> String {
        format!(
            "secret-ref(access_key={}, secret_key={}, session_token={})",
            self.access_key_id,
            self.secret_access_key,
            self.session_token
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }

    async fn resolve(&self) -> Result<AwsCredentials, CredentialError> {
        let access_key_id = self.access_key_id.read().await?;
        let secret_access_key = self.secret_access_key.read().await?;
        let session_token = match &self.session_token {
            Some(reference) => Some(reference.read().await?),
            None => None,
        };
        AwsCredentials::new(access_key_id, secret_access_key, session_token)
    }
}
