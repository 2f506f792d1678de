//! HTTP boundary: query validation and JSON rendering around [`RateService`].

pub mod auth;
pub mod response;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::middleware::{DefaultHeaders, Next};
use actix_web::{Error, HttpResponse, get, web};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::service::RateService;
use crate::snapshot::{is_currency_code, normalize_currency};

pub use auth::{Authenticated, Authenticator, Principal, StaticTokenAuthenticator};
pub use response::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Registers all routes. Expects `web::Data<RateService>` and
/// `web::Data<dyn Authenticator>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(healthcheck)
        .service(web::scope("/api/v1").service(get_rates).service(convert));
}

/// Hardening headers set on every response, including errors.
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "0"))
        .add(("Referrer-Policy", "no-referrer"))
        .add(("Content-Security-Policy", "default-src 'none'; frame-ancestors 'none'"))
}

/// Tags every response with a fresh `X-Request-Id`.
pub async fn request_id(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let id = Uuid::new_v4();
    let mut res = next.call(req).await?;
    let value = HeaderValue::from_str(&id.to_string())
        .map_err(actix_web::error::ErrorInternalServerError)?;
    res.headers_mut()
        .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    Ok(res)
}

#[get("/healthcheck")]
async fn healthcheck() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct RatesQuery {
    #[serde(default)]
    base: String,
}

#[get("/rates")]
async fn get_rates(
    _auth: Authenticated,
    service: web::Data<RateService>,
    query: web::Query<RatesQuery>,
) -> Result<HttpResponse, ApiError> {
    let base = normalize_currency(&query.base);
    if !base.is_empty() && !is_currency_code(&base) {
        return Err(ApiError::validation("base must be a 3-letter currency code"));
    }

    let snapshot = service
        .get_rates(&base)
        .await
        .map_err(|e| ApiError::from_rate_error(e, "rates_unavailable"))?;

    Ok(HttpResponse::Ok().json(snapshot))
}

#[derive(Debug, Deserialize)]
struct ConvertQuery {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    amount: Option<String>,
}

#[get("/convert")]
async fn convert(
    _auth: Authenticated,
    service: web::Data<RateService>,
    query: web::Query<ConvertQuery>,
) -> Result<HttpResponse, ApiError> {
    let from = normalize_currency(&query.from);
    let to = normalize_currency(&query.to);
    if !is_currency_code(&from) || !is_currency_code(&to) {
        return Err(ApiError::validation(
            "from and to must be 3-letter currency codes",
        ));
    }
    let amount = parse_amount(query.amount.as_deref())?;

    let conversion = service
        .convert(&from, &to, amount)
        .await
        .map_err(|e| ApiError::from_rate_error(e, "conversion_failed"))?;

    Ok(HttpResponse::Ok().json(conversion))
}

fn parse_amount(raw: Option<&str>) -> Result<f64, ApiError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ApiError::validation("amount is required"));
    }
    match raw.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        _ => Err(ApiError::validation("amount must be a non-negative number")),
    }
}
