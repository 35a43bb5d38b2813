// common/src/models/session.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// User role as understood by the gateway's routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Manager,
    Client,
}

impl Role {
    /// Unknown roles land on the client dashboard.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "manager" => Role::Manager,
            _ => Role::Client,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Client => "client",
        }
    }

    /// Default route for the role, relative to the base path.
    pub fn landing_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Manager => "/manager",
            Role::Client => "/client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated user stored in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
    /// Raw role string as written by the application that owns the session.
    pub role: String,
}

impl SessionUser {
    pub fn new(username: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: role.into(),
        }
    }

    pub fn role(&self) -> Role {
        Role::from_name(&self.role)
    }
}

/// Session document. Keys other than `user` (cookie metadata and the like)
/// belong to the application and are ignored here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

impl SessionPayload {
    pub fn with_user(user: SessionUser) -> Self {
        Self { user: Some(user) }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("session payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The one place session bytes are turned into [`SessionPayload`] and back.
pub struct SessionCodec;

impl SessionCodec {
    pub fn decode(bytes: &[u8]) -> Result<SessionPayload, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(payload: &SessionPayload) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(payload)?)
    }
}
