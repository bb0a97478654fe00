//! API route handlers.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info};

use ferry_core::{ProxyRequest, ProxyResponse, SessionId, SessionStatus};

use crate::error::{ApiError, Result};
use crate::models::{ConnectRequest, ConnectResponse, DisconnectResponse, ResourceQuery};
use crate::state::AppState;

/// Header carrying the session id on authenticated routes.
pub const SESSION_HEADER: &str = "X-VPN-Session";

/// Address reported for a caller: the first `X-Forwarded-For` hop, else the
/// peer address, else `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

impl<S> FromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self(
            forwarded
                .or(peer)
                .unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}

fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(SessionId::from_string)
}

/// POST /api/proxy/connect - Create a session.
pub async fn connect(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
    Json(req): Json<ConnectRequest>,
) -> Json<ConnectResponse> {
    let session = state.sessions().create(req.user_id(), &address);
    let timeout = chrono::Duration::from_std(state.sessions().timeout())
        .unwrap_or_else(|_| chrono::Duration::hours(2));

    Json(ConnectResponse {
        session_id: session.id,
        encryption_key: session.encryption_key,
        created_at: session.created_at,
        expires_at: session.created_at + timeout,
    })
}

/// POST /api/proxy/forward - Forward a request through the relay.
pub async fn forward(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ProxyRequest>,
) -> Result<(StatusCode, Json<ProxyResponse>)> {
    let session = session_from_headers(&headers).ok_or(ApiError::SessionRequired)?;

    let response = state.engine.forward(&req, &session).await;

    let status = match response.status_code {
        401 => StatusCode::UNAUTHORIZED,
        403 => StatusCode::FORBIDDEN,
        _ => StatusCode::OK,
    };

    Ok((status, Json(response)))
}

/// GET /api/proxy/resource - Fetch one resource and return its raw body.
///
/// Also serves GET /browse, the new-window entry of the interception script.
pub async fn resource(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
) -> Result<Response> {
    let (Some(url), Some(session)) = (
        query.url.filter(|u| !u.is_empty()),
        query.session.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::MissingParameter(
            "URL and session are required".to_string(),
        ));
    };

    let response = state
        .engine
        .get_resource(&url, &SessionId::from_string(session))
        .await;

    if let Some(message) = response.error {
        debug!("Resource {} failed with {}", url, response.status_code);
        return Err(ApiError::Upstream {
            status: response.status_code,
            message,
        });
    }

    let content_type = [(CONTENT_TYPE, response.content_type)];
    Ok(match (response.binary_content, response.content) {
        (Some(bytes), _) => (content_type, bytes).into_response(),
        (None, Some(text)) => (content_type, text).into_response(),
        (None, None) => (content_type, Vec::<u8>::new()).into_response(),
    })
}

/// POST /api/proxy/disconnect - Terminate the caller's session.
pub async fn disconnect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DisconnectResponse>> {
    let session = session_from_headers(&headers)
        .ok_or_else(|| ApiError::MissingParameter("Session ID required".to_string()))?;

    state.sessions().terminate(&session);
    info!("Session {} disconnected", session);

    Ok(Json(DisconnectResponse {
        message: "Disconnected successfully".to_string(),
    }))
}

/// GET /api/proxy/status - Report the caller's session.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionStatus>> {
    let session = session_from_headers(&headers)
        .ok_or_else(|| ApiError::MissingParameter("Session ID required".to_string()))?;

    state
        .sessions()
        .status(&session)
        .map(Json)
        .ok_or(ApiError::SessionNotFound)
}
