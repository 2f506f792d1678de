//! Rate rebasing and pairwise conversion over a single snapshot.
//!
//! Every rate in a snapshot is quoted against one base, so for any two
//! currencies `rate(X -> Y) = rate(base -> Y) / rate(base -> X)`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{RateError, RateResult};
use crate::snapshot::{RateSnapshot, normalize_currency};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub rate: f64,
    pub result: f64,
    pub updated_at: DateTime<Utc>,
}

/// Expresses the snapshot's rates against `requested`.
///
/// An empty request, or one naming the snapshot's own base, returns a copy
/// of the snapshot unchanged.
pub fn rebase(snapshot: &RateSnapshot, requested: &str) -> RateResult<RateSnapshot> {
    let requested = normalize_currency(requested);
    if requested.is_empty() || requested == snapshot.base {
        return Ok(RateSnapshot::new(
            &snapshot.base,
            snapshot.rates.clone(),
            snapshot.updated_at,
        ));
    }

    let base_rate = match snapshot.rate(&requested) {
        Some(rate) if rate != 0.0 => rate,
        _ => return Err(RateError::UnsupportedBase(requested)),
    };

    let rates = snapshot
        .rates
        .iter()
        .map(|(code, rate)| (code.clone(), rate / base_rate))
        .collect::<HashMap<_, _>>();

    Ok(RateSnapshot::new(&requested, rates, snapshot.updated_at))
}

/// Converts `amount` of `from` into `to`. No rounding is applied.
pub fn convert(
    snapshot: &RateSnapshot,
    from: &str,
    to: &str,
    amount: f64,
) -> RateResult<Conversion> {
    let from = normalize_currency(from);
    let to = normalize_currency(to);
    validate_request(&from, &to, amount)?;

    let from_rate = match snapshot.rate(&from) {
        Some(rate) if rate != 0.0 => rate,
        _ => return Err(RateError::UnsupportedCurrency(from)),
    };
    // A zero target rate is allowed and converts to zero.
    let to_rate = snapshot
        .rate(&to)
        .ok_or_else(|| RateError::UnsupportedCurrency(to.clone()))?;

    let rate = to_rate / from_rate;
    Ok(Conversion {
        from,
        to,
        amount,
        rate,
        result: amount * rate,
        updated_at: snapshot.updated_at,
    })
}

/// Checks a conversion request before any snapshot is consulted.
/// Codes must already be normalized.
pub fn validate_request(from: &str, to: &str, amount: f64) -> RateResult<()> {
    if from.is_empty() || to.is_empty() {
        return Err(RateError::Validation(
            "from and to currencies are required".to_string(),
        ));
    }
    if amount.is_nan() || amount < 0.0 {
        return Err(RateError::Validation("amount must be non-negative".to_string()));
    }
    Ok(())
}
