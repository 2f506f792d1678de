use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rates of one unit of `base` expressed in every known currency.
///
/// `rates[base]` is always `1.0`; the constructor enforces it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub base: String,
    pub rates: HashMap<String, f64>,
    pub updated_at: DateTime<Utc>,
}

impl RateSnapshot {
    pub fn new(base: &str, mut rates: HashMap<String, f64>, updated_at: DateTime<Utc>) -> Self {
        let base = normalize_currency(base);
        rates.insert(base.clone(), 1.0);

        Self {
            base,
            rates,
            updated_at,
        }
    }

    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }
}

pub fn normalize_currency(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Three ASCII letters, already normalized.
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}
