//! Bearer token and tenant (`Version` header) checks for the compliance API.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

use crate::config::AuthConfig;

/// Header carrying the tenant identifier alongside every API call.
pub const TENANT_HEADER: &str = "version";

/// Tenant resolved for an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    pub tenant: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication credentials were not provided.")]
    MissingCredentials,
    #[error("Given token not valid for any token type")]
    InvalidToken,
    #[error("Version header is required")]
    MissingTenant,
    #[error("You do not have permission to perform this action.")]
    TenantForbidden,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::MissingTenant => StatusCode::BAD_REQUEST,
            AuthError::TenantForbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Token table consulted by the tenant middleware.
#[derive(Debug, Clone, Default)]
pub struct ApiCredentials {
    tokens: BTreeMap<String, BTreeSet<String>>,
}

impl ApiCredentials {
    pub fn new(tokens: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self { tokens }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.tokens.clone())
    }

    /// Grant a single token access to a single tenant.
    pub fn single(token: &str, tenant: &str) -> Self {
        let mut tokens = BTreeMap::new();
        tokens.insert(token.to_string(), BTreeSet::from([tenant.to_string()]));
        Self::new(tokens)
    }

    pub fn authorize(&self, headers: &HeaderMap) -> Result<TenantContext, AuthError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        let tenants = self.tokens.get(token).ok_or(AuthError::InvalidToken)?;

        let tenant = headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|tenant| !tenant.is_empty())
            .ok_or(AuthError::MissingTenant)?;

        if !tenants.contains(tenant) {
            return Err(AuthError::TenantForbidden);
        }

        Ok(TenantContext {
            tenant: tenant.to_string(),
        })
    }
}

/// Middleware resolving the tenant and stashing it in request extensions.
pub async fn require_tenant(
    State(credentials): State<Arc<ApiCredentials>>,
    mut request: Request,
    next: Next,
) -> Response {
    match credentials.authorize(request.headers()) {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => {
            debug!(error = %err, path = %request.uri().path(), "rejected request");
            err.into_response()
        }
    }
}
