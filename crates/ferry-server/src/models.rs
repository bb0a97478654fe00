//! API request and response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ferry_core::SessionId;

/// Request body for POST /api/proxy/connect.
///
/// Accepts either a bare JSON string or `{ "userId": "..." }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConnectRequest {
    UserId(String),
    Body {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl ConnectRequest {
    pub fn user_id(&self) -> &str {
        match self {
            ConnectRequest::UserId(id) => id,
            ConnectRequest::Body { user_id } => user_id,
        }
    }
}

/// Response body for POST /api/proxy/connect.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub session_id: SessionId,
    pub encryption_key: String,
    pub created_at: DateTime<Utc>,
    /// Expiry if the session sees no further activity.
    pub expires_at: DateTime<Utc>,
}

/// Query parameters for GET /api/proxy/resource and GET /browse.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceQuery {
    pub url: Option<String>,
    pub session: Option<String>,
}

/// Response body for POST /api/proxy/disconnect.
#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub message: String,
}
