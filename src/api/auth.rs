//! Bearer-token gate in front of the rate endpoints.

use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, web};

use super::response::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
}

/// Verifies bearer tokens. Token issuance lives outside this service.
pub trait Authenticator: Send + Sync {
    fn verify(&self, token: &str) -> Option<Principal>;
}

/// Accepts a fixed set of tokens, usually taken from `API_TOKENS`.
pub struct StaticTokenAuthenticator {
    tokens: Vec<String>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn verify(&self, token: &str) -> Option<Principal> {
        // No early exit: every token is compared, the first match wins.
        let mut matched = None;
        for (idx, known) in self.tokens.iter().enumerate() {
            if constant_time_eq(known.as_bytes(), token.as_bytes()) && matched.is_none() {
                matched = Some(idx);
            }
        }
        matched.map(|idx| Principal {
            subject: format!("api-token-{}", idx + 1),
        })
    }
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    std::hint::black_box(diff) == 0
}

/// Extractor that rejects the request with 401 unless the caller presents
/// a token accepted by the registered [`Authenticator`].
#[derive(Debug)]
pub struct Authenticated(pub Principal);

impl FromRequest for Authenticated {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<Authenticated, ApiError> {
    let Some(authenticator) = req.app_data::<web::Data<dyn Authenticator>>() else {
        return Err(ApiError::unauthorized("authentication is not configured"));
    };

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if header.is_empty() {
        return Err(ApiError::unauthorized("missing token"));
    }
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();

    authenticator
        .verify(token)
        .map(Authenticated)
        .ok_or_else(|| ApiError::unauthorized("invalid token"))
}
