//! Authentication primitives.
//!
//! Callers present a bearer JWT issued by the care network. The token is validated against a
//! statically configured key and must carry the caller's organization identifier, which is
//! what every authorization decision and CareTeam membership is keyed on.

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use carelink_models::Identifier;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::config::{AuthConfig, JwtAlgorithm};
use crate::state::AppState;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    /// Organization the caller acts on behalf of
    pub organization: Identifier,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AuthError {
    MissingToken,
    InvalidToken(String),
    Misconfigured(String),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn diagnostics(&self) -> String {
        match self {
            Self::MissingToken => "Missing bearer token".to_string(),
            Self::InvalidToken(msg) => format!("Invalid bearer token: {msg}"),
            Self::Misconfigured(msg) => format!("Authentication misconfigured: {msg}"),
        }
    }

    pub fn into_fhir_response(self) -> Response {
        let status = self.status();
        let body = axum::Json(json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": "login",
                "diagnostics": self.diagnostics()
            }]
        }));

        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/fhir+json; charset=utf-8"),
        );
        if matches!(self, Self::MissingToken | Self::InvalidToken(_)) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

#[derive(Clone)]
pub struct AuthManager {
    enabled: bool,
    key: Option<DecodingKey>,
    validation: Validation,
    organization_claim: String,
    public_paths: Vec<String>,
}

impl AuthManager {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let algorithm = match config.algorithm {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::RS256 => Algorithm::RS256,
        };

        let key = if config.enabled {
            Some(decoding_key(config)?)
        } else {
            None
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = 60;
        match &config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            enabled: config.enabled,
            key,
            validation,
            organization_claim: config.organization_claim.clone(),
            public_paths: config.public_paths.clone(),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }

    pub fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Option<Principal>, AuthError> {
        if !self.enabled {
            return Ok(None);
        }

        let authz = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| {
                AuthError::InvalidToken("Authorization header is not valid UTF-8".to_string())
            })?;

        let token = authz
            .strip_prefix("Bearer ")
            .or_else(|| authz.strip_prefix("bearer "))
            .ok_or_else(|| {
                AuthError::InvalidToken("Authorization header must be 'Bearer <token>'".to_string())
            })?;

        self.authenticate_token(token).map(Some)
    }

    pub fn authenticate_token(&self, token: &str) -> Result<Principal, AuthError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| AuthError::Misconfigured("no decoding key loaded".to_string()))?;

        let claims = decode::<JsonValue>(token, key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;

        self.principal_from_claims(&claims)
    }

    fn principal_from_claims(&self, claims: &JsonValue) -> Result<Principal, AuthError> {
        let subject = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let issuer = claims
            .get("iss")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let organization = claims
            .get(&self.organization_claim)
            .and_then(organization_from_claim)
            .ok_or_else(|| {
                AuthError::InvalidToken(format!(
                    "token carries no organization identifier in claim '{}'",
                    self.organization_claim
                ))
            })?;

        Ok(Principal {
            subject,
            organization,
            issuer,
        })
    }
}

fn decoding_key(config: &AuthConfig) -> Result<DecodingKey, AuthError> {
    match config.algorithm {
        JwtAlgorithm::HS256 => {
            let secret = config
                .secret
                .as_deref()
                .ok_or_else(|| AuthError::Misconfigured("auth.secret is not set".to_string()))?;
            Ok(DecodingKey::from_secret(secret.as_bytes()))
        }
        JwtAlgorithm::RS256 => {
            let path = config.public_key_path.as_ref().ok_or_else(|| {
                AuthError::Misconfigured("auth.public_key_path is not set".to_string())
            })?;
            let pem = std::fs::read(path).map_err(|e| {
                AuthError::Misconfigured(format!("cannot read {}: {e}", path.display()))
            })?;
            DecodingKey::from_rsa_pem(&pem)
                .map_err(|e| AuthError::Misconfigured(format!("invalid RSA public key: {e}")))
        }
    }
}

/// `{"system": .., "value": ..}` or `"system|value"`.
fn organization_from_claim(claim: &JsonValue) -> Option<Identifier> {
    match claim {
        JsonValue::String(token) => Identifier::from_token(token),
        JsonValue::Object(_) => serde_json::from_value::<Identifier>(claim.clone())
            .ok()
            .filter(Identifier::is_complete),
        _ => None,
    }
}

/// Extractor for the authenticated principal attached by middleware.
///
/// Use `Option<AuthenticatedPrincipal>` in handlers for optional auth.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthenticatedPrincipal)
            .ok_or_else(|| AuthError::MissingToken.into_fhir_response())
    }
}

/// Middleware for attaching `Principal` (or rejecting) on protected routes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if !state.auth.enabled() {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();
    if state.auth.is_public_path(&path) || req.method() == axum::http::Method::OPTIONS {
        return next.run(req).await;
    }

    match state.auth.authenticate_headers(req.headers()) {
        Ok(Some(principal)) => {
            tracing::debug!(
                subject = %principal.subject,
                organization = %principal.organization,
                "Authenticated request"
            );
            req.extensions_mut().insert::<Principal>(principal);
            next.run(req).await
        }
        Ok(None) => next.run(req).await,
        Err(err) => {
            tracing::info!(error = %err.diagnostics(), path = %path, "Authentication failed");
            err.into_fhir_response()
        }
    }
}
