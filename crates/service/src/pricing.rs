//! USD amounts and the fixed USD/ETH conversion used for contributions and
//! treasury transfers. The rate is configured, never fetched.

use molc_chain::{Wei, WEI_PER_ETH};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ServiceError;

/// Mock rate used when nothing is configured: 1 USD = 0.0005 ETH.
pub const DEFAULT_ETH_PER_USD: f64 = 0.0005;

/// Amount in US cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsdCents(pub u64);

impl UsdCents {
    pub const ZERO: UsdCents = UsdCents(0);

    pub fn from_dollars(dollars: u64) -> Self {
        UsdCents(dollars.saturating_mul(100))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: UsdCents) -> Option<UsdCents> {
        self.0.checked_add(other.0).map(UsdCents)
    }
}

/// Parses decimal dollar strings such as `"500000"`, `"12.5"` or `"$0.99"`.
/// Negative numbers and more than two fraction digits are rejected.
impl FromStr for UsdCents {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ServiceError::validation(format!("'{}' is not a valid USD amount", s));

        let raw = s.trim();
        let raw = raw.strip_prefix('$').unwrap_or(raw).replace(',', "");
        let (whole, fraction) = match raw.split_once('.') {
            Some((w, f)) => (w, f),
            None => (raw.as_str(), ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if fraction.len() > 2 || !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let dollars: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        dollars
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents))
            .map(UsdCents)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for UsdCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawAmount> for String {
    fn from(raw: RawAmount) -> Self {
        match raw {
            RawAmount::Text(text) => text,
            RawAmount::Number(number) => number.to_string(),
        }
    }
}

/// Accepts an amount sent either as a JSON string or a JSON number.
pub fn deserialize_amount<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawAmount::deserialize(d).map(String::from)
}

pub fn deserialize_optional_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawAmount>::deserialize(d)?.map(String::from))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRate {
    wei_per_cent: Wei,
}

impl ExchangeRate {
    pub fn from_eth_per_usd(eth_per_usd: f64) -> Result<Self, ServiceError> {
        if !eth_per_usd.is_finite() || eth_per_usd <= 0.0 {
            return Err(ServiceError::validation(format!("invalid ETH/USD rate {}", eth_per_usd)));
        }
        let raw = (eth_per_usd * WEI_PER_ETH as f64 / 100.0).round();
        // `as` would saturate silently past u128
        if !raw.is_finite() || raw >= u128::MAX as f64 {
            return Err(ServiceError::validation(format!("ETH/USD rate {} is out of range", eth_per_usd)));
        }
        let wei_per_cent = raw as Wei;
        if wei_per_cent == 0 {
            return Err(ServiceError::validation(format!("ETH/USD rate {} is below one wei per cent", eth_per_usd)));
        }
        Ok(Self { wei_per_cent })
    }

    pub fn wei_per_cent(&self) -> Wei {
        self.wei_per_cent
    }

    pub fn usd_cents_to_wei(&self, amount: UsdCents) -> Wei {
        Wei::from(amount.0).saturating_mul(self.wei_per_cent)
    }

    /// Rounds down to the cent.
    pub fn wei_to_usd_cents(&self, wei: Wei) -> UsdCents {
        UsdCents(u64::try_from(wei / self.wei_per_cent).unwrap_or(u64::MAX))
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self { wei_per_cent: 5_000_000_000_000 }
    }
}
