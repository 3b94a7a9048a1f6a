//! Configuration loading and representation.
//!
//! Everything comes from the process environment; a `.env` file in the working
//! directory is loaded first when present.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

pub const DEFAULT_MAPPING_FILE: &str = "mapping/product_mapping.json";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_ERP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_WC_TIMEOUT_SECS: u64 = 30;

/// WooCommerce refuses `per_page` above 100.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// A credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Secret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct ErpConfig {
    pub base_url: String,
    pub api_key: Secret,
    pub api_secret: Secret,
    /// Forces the selling price list instead of resolving it from ERPNext.
    pub price_list: Option<String>,
    /// Item field mirrored into the WooCommerce short description.
    pub short_description_field: Option<String>,
    pub timeout: Duration,
    pub page_size: usize,
}

#[derive(Debug, Clone)]
pub struct WcConfig {
    pub base_url: String,
    pub consumer_key: Secret,
    pub consumer_secret: Secret,
    pub timeout: Duration,
    pub page_size: usize,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub erp: ErpConfig,
    pub wc: WcConfig,
    pub mapping_file: PathBuf,
    pub concurrency: usize,
    pub price_tolerance_pct: Decimal,
    /// When set, admin endpoints require `Authorization: Bearer <token>`.
    pub admin_token: Option<Secret>,
    pub bind_addr: SocketAddr,
}

impl SyncConfig {
    /// Load from the environment (after applying `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        // a missing .env is normal in production
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let page_size = parse_or(&get, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(invalid("PAGE_SIZE", page_size, "must be between 1 and 100"));
        }

        let concurrency = parse_or(&get, "SYNC_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(invalid("SYNC_CONCURRENCY", concurrency, "must be at least 1"));
        }

        let price_tolerance_pct = parse_or(&get, "PRICE_TOLERANCE_PCT", Decimal::ZERO)?;
        if price_tolerance_pct.is_sign_negative() && !price_tolerance_pct.is_zero() {
            return Err(invalid("PRICE_TOLERANCE_PCT", price_tolerance_pct, "must not be negative"));
        }

        let erp = ErpConfig {
            base_url: base_url("ERP_URL", required("ERP_URL")?)?,
            api_key: Secret::new(required("ERP_API_KEY")?),
            api_secret: Secret::new(required("ERP_API_SECRET")?),
            price_list: get("ERP_PRICE_LIST"),
            short_description_field: get("ERP_SHORT_DESCRIPTION_FIELD"),
            timeout: Duration::from_secs(parse_or(&get, "ERP_TIMEOUT_SECS", DEFAULT_ERP_TIMEOUT_SECS)?),
            page_size,
        };

        let wc = WcConfig {
            base_url: base_url("WC_BASE_URL", required("WC_BASE_URL")?)?,
            consumer_key: Secret::new(required("WC_API_KEY")?),
            consumer_secret: Secret::new(required("WC_API_SECRET")?),
            timeout: Duration::from_secs(parse_or(&get, "WC_TIMEOUT_SECS", DEFAULT_WC_TIMEOUT_SECS)?),
            page_size,
        };

        Ok(Self {
            erp,
            wc,
            mapping_file: get("MAPPING_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_FILE)),
            concurrency,
            price_tolerance_pct,
            admin_token: get("ADMIN_TOKEN").map(Secret::new),
            bind_addr: parse_or(&get, "BIND_ADDR", default_bind_addr())?,
        })
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn invalid(key: &'static str, value: impl core::fmt::Display, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn base_url(key: &'static str, raw: String) -> Result<String, ConfigError> {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(invalid(key, &raw, "must start with http:// or https://"));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
