//! API key authentication
//!
//! The gateway core only consumes an [`AuthIdentity`]. This module produces it
//! from an `x-api-key` (or `Authorization: Bearer`) header checked against a
//! static [`ApiKeyStore`]. With no keys configured the gateway runs open and
//! every request gets an anonymous identity.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::Response;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::GatewayError;
use crate::server::GatewayState;
use crate::types::ProcessContext;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Permission required to invoke models.
pub const INVOKE_PERMISSION: &str = "models:invoke";
/// Permission required to list and describe models.
pub const READ_PERMISSION: &str = "models:read";
/// Permission granting everything.
pub const WILDCARD_PERMISSION: &str = "*";

/// A configured API key.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    /// Public key id, handed to strategies as `apiKey`
    pub id: String,
    key: SecretString,
    /// User the key belongs to
    pub user_id: Option<String>,
    /// Granted permissions
    pub permissions: Vec<String>,
}

impl ApiKeyRecord {
    /// Key with read and invoke permissions.
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: SecretString::from(key.into()),
            user_id: None,
            permissions: vec![READ_PERMISSION.to_string(), INVOKE_PERMISSION.to_string()],
        }
    }

    /// Bind the key to a user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Replace the granted permissions.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    fn matches(&self, presented: &str) -> bool {
        self.key.expose_secret() == presented
    }
}

/// Static set of accepted API keys.
#[derive(Debug, Default)]
pub struct ApiKeyStore {
    keys: Vec<ApiKeyRecord>,
}

impl ApiKeyStore {
    /// Store accepting `keys`.
    pub fn new(keys: Vec<ApiKeyRecord>) -> Self {
        Self { keys }
    }

    /// Whether authentication is disabled.
    pub fn is_open(&self) -> bool {
        self.keys.is_empty()
    }

    /// Identity for a presented key, if it is known.
    pub fn authenticate(&self, presented: &str) -> Option<AuthIdentity> {
        self.keys
            .iter()
            .find(|record| record.matches(presented))
            .map(|record| AuthIdentity {
                api_key_id: Some(record.id.clone()),
                user_id: record.user_id.clone(),
                permissions: record.permissions.clone(),
                authenticated: true,
            })
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are configured.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Caller identity attached to the request by [`require_api_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthIdentity {
    /// Id of the key used
    pub api_key_id: Option<String>,
    /// User bound to the key
    pub user_id: Option<String>,
    /// Granted permissions
    pub permissions: Vec<String>,
    /// Whether a key was verified
    pub authenticated: bool,
}

impl AuthIdentity {
    /// Identity used when authentication is disabled.
    pub fn anonymous() -> Self {
        Self {
            permissions: vec![WILDCARD_PERMISSION.to_string()],
            ..Default::default()
        }
    }

    /// Whether the identity holds `permission`.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == permission || p == WILDCARD_PERMISSION)
    }

    /// Per-invocation context handed to strategies.
    pub fn process_context(&self) -> ProcessContext {
        ProcessContext {
            api_key: self.api_key_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Middleware resolving the caller's [`AuthIdentity`].
///
/// `POST` requires [`INVOKE_PERMISSION`], everything else [`READ_PERMISSION`].
pub async fn require_api_key(
    State(state): State<GatewayState>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let keys = state.api_keys();
    let identity = if keys.is_open() {
        AuthIdentity::anonymous()
    } else {
        let presented = presented_key(req.headers())
            .ok_or_else(|| GatewayError::Unauthorized("API key required".to_string()))?;
        keys.authenticate(presented)
            .ok_or_else(|| GatewayError::Unauthorized("Invalid API key".to_string()))?
    };

    let required = if *req.method() == Method::POST {
        INVOKE_PERMISSION
    } else {
        READ_PERMISSION
    };
    if !identity.has_permission(required) {
        tracing::warn!(
            api_key_id = identity.api_key_id.as_deref().unwrap_or("-"),
            permission = required,
            "permission denied"
        );
        return Err(GatewayError::Forbidden(format!(
            "Missing permission '{required}'"
        )));
    }

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn authenticate_known_key() {
        let store = ApiKeyStore::new(vec![
            ApiKeyRecord::new("key-1", "secret-1").with_user("alice"),
            ApiKeyRecord::new("key-2", "secret-2").with_permissions([READ_PERMISSION]),
        ]);
        let identity = store.authenticate("secret-1").unwrap();
        assert!(identity.authenticated);
        assert_eq!(identity.api_key_id.as_deref(), Some("key-1"));
        assert!(identity.has_permission(INVOKE_PERMISSION));
        assert_eq!(
            identity.process_context(),
            ProcessContext {
                api_key: Some("key-1".into()),
                user_id: Some("alice".into()),
            }
        );

        let read_only = store.authenticate("secret-2").unwrap();
        assert!(!read_only.has_permission(INVOKE_PERMISSION));
        assert!(store.authenticate("nope").is_none());
    }

    #[test]
    fn anonymous_identity_has_wildcard() {
        let identity = AuthIdentity::anonymous();
        assert!(!identity.authenticated);
        assert!(identity.has_permission(INVOKE_PERMISSION));
        assert_eq!(identity.process_context(), ProcessContext::default());
    }

    #[test]
    fn key_read_from_either_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(presented_key(&headers), Some("abc"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("xyz"));
        assert_eq!(presented_key(&headers), Some("xyz"));
    }

    #[test]
    fn debug_output_redacts_key() {
        let record = ApiKeyRecord::new("key-1", "super-secret");
        assert!(!format!("{record:?}").contains("super-secret"));
    }
}
