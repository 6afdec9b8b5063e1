//! Signed owner tokens guarding collection writes.
//!
//! A token has the form `<subject>.<expires_at_unix>.<signature>`, where the
//! signature is the hex HMAC-SHA256 of `<subject>.<expires_at_unix>` under the
//! configured secret. Tokens are read from `x-owner-key` or an
//! `Authorization: Bearer` header.

use std::{fmt, sync::Arc, time::Duration};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::{config::GateConfig, error::ApiError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the owner token.
pub const OWNER_KEY_HEADER: &str = "x-owner-key";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GateError {
    #[error("missing owner token")]
    Missing,
    #[error("malformed owner token")]
    Malformed,
    #[error("invalid owner token signature")]
    InvalidSignature,
    #[error("owner token expired")]
    Expired,
    #[error("token subject must be non-empty and must not contain '.'")]
    InvalidSubject,
    #[error("invalid signing key")]
    InvalidKey,
}

/// Verified token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub expires_at: i64,
}

/// Mints and verifies owner tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Arc<[u8]>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").field("secret", &"<redacted>").finish()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
        }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, GateError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| GateError::InvalidKey)?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Issues a token for `subject` that expires `ttl` from now.
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String, GateError> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.issue_until(subject, Utc::now().timestamp().saturating_add(ttl))
    }

    /// Issues a token for `subject` that expires at the given unix time.
    pub fn issue_until(&self, subject: &str, expires_at: i64) -> Result<String, GateError> {
        if subject.is_empty() || subject.contains('.') {
            return Err(GateError::InvalidSubject);
        }

        let payload = format!("{subject}.{expires_at}");
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, GateError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verifies `token` as of the unix time `now`. The signature comparison is
    /// constant-time.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, GateError> {
        let mut parts = token.trim().rsplitn(3, '.');
        let (Some(signature), Some(expires_at), Some(subject)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(GateError::Malformed);
        };
        if subject.is_empty() {
            return Err(GateError::Malformed);
        }

        let expires_at: i64 = expires_at.parse().map_err(|_| GateError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| GateError::Malformed)?;

        self.mac(&format!("{subject}.{expires_at}"))?
            .verify_slice(&signature)
            .map_err(|_| GateError::InvalidSignature)?;

        if now >= expires_at {
            return Err(GateError::Expired);
        }

        Ok(Claims {
            subject: subject.to_string(),
            expires_at,
        })
    }
}

/// Request gate built from [`GateConfig`].
#[derive(Debug, Clone)]
pub struct Gate {
    signer: TokenSigner,
    protect_reads: bool,
}

impl Gate {
    pub fn new(signer: TokenSigner, protect_reads: bool) -> Self {
        Self { signer, protect_reads }
    }

    /// Returns `None` when the gate is disabled.
    pub fn from_config(cfg: &GateConfig) -> Option<Self> {
        match (cfg.enabled, cfg.secret.as_deref()) {
            (true, Some(secret)) if !secret.is_empty() => {
                Some(Self::new(TokenSigner::new(secret), cfg.protect_reads))
            }
            _ => None,
        }
    }

    fn guards(&self, method: &Method) -> bool {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => self.protect_reads,
            _ => true,
        }
    }

    /// Checks the request headers, returning the claims of a valid token.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Claims, GateError> {
        let token = extract_token(headers).ok_or(GateError::Missing)?;
        self.signer.verify(token)
    }
}

fn extract_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(OWNER_KEY_HEADER) {
        return value.to_str().ok().filter(|v| !v.is_empty());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Middleware rejecting gated requests without a valid owner token.
pub async fn require_owner(State(gate): State<Arc<Gate>>, mut request: Request, next: Next) -> Response {
    if !gate.guards(request.method()) {
        return next.run(request).await;
    }

    match gate.authorize(request.headers()) {
        Ok(claims) => {
            debug!(subject = %claims.subject, "owner token accepted");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => ApiError::Unauthorized(e.to_string()).into_response(),
    }
}
