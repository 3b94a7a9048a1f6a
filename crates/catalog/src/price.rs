//! Money values and price comparison.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use woosync_core::{DomainError, ValueObject};

/// A non-negative price in the store currency.
///
/// Both upstreams are loose about representation (ERPNext answers floats,
/// WooCommerce answers strings such as `"19.90"` or `""`), so parsing accepts
/// either and the value is kept as an exact decimal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl ValueObject for Price {}

impl Price {
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!("price must not be negative: {value}")));
        }
        Ok(Self(value.normalize()))
    }

    pub fn from_f64(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() {
            return Err(DomainError::validation(format!("price is not finite: {value}")));
        }
        let d = Decimal::try_from(value)
            .map_err(|e| DomainError::validation(format!("price {value}: {e}")))?;
        Self::new(d)
    }

    /// Parse a WooCommerce-style price string. Blank means "no price".
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, DomainError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Two-decimal string as WooCommerce expects for `regular_price`.
    pub fn to_wc_string(&self) -> String {
        let mut d = self.0.round_dp(2);
        d.rescale(2);
        d.to_string()
    }
}

impl FromStr for Price {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let d = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("price {s:?}: {e}")))?;
        Self::new(d)
    }
}

impl core::fmt::Display for Price {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Price::from_f64(n),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// Equality rule for prices.
///
/// Two prices are equal when their absolute difference is within `absolute`
/// (rounding noise), or within `percent` of the storefront price when a
/// percentage tolerance is configured.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PriceTolerance {
    absolute: Decimal,
    percent: Decimal,
}

impl Default for PriceTolerance {
    fn default() -> Self {
        Self {
            absolute: Decimal::new(5, 3),
            percent: Decimal::ZERO,
        }
    }
}

impl PriceTolerance {
    /// Default absolute tolerance plus a percentage tolerance (0 = exact).
    pub fn with_percent(percent: Decimal) -> Result<Self, DomainError> {
        if percent.is_sign_negative() && !percent.is_zero() {
            return Err(DomainError::validation("price tolerance must not be negative"));
        }
        Ok(Self {
            percent,
            ..Self::default()
        })
    }

    pub fn percent(&self) -> Decimal {
        self.percent
    }

    /// Compare the ERP price against the storefront price.
    ///
    /// An ERP item without a price never forces a difference.
    pub fn differs(&self, erp: Option<Price>, storefront: Option<Price>) -> bool {
        let Some(erp) = erp else {
            return false;
        };
        let Some(current) = storefront else {
            return true;
        };

        let diff = (erp.0 - current.0).abs();
        if diff <= self.absolute {
            return false;
        }
        if self.percent.is_zero() {
            return true;
        }

        let base = if current.0.is_zero() { Decimal::ONE } else { current.0 };
        diff / base * Decimal::ONE_HUNDRED > self.percent
    }
}
