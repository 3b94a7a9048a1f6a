//! Errors of the upstream REST clients.

use std::time::Duration;

use serde::Deserialize;

/// Failure talking to ERPNext or WooCommerce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        /// Machine-readable error code when the upstream provides one
        /// (WooCommerce: `product_invalid_sku`, ...).
        code: Option<String>,
        message: String,
    },
    #[error("parse error: {0}")]
    Parse(String),
}

/// WooCommerce / Frappe error body. Both use `message`; WooCommerce adds `code`,
/// Frappe adds `exc_type`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    exc_type: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

const MAX_ERROR_BODY_CHARS: usize = 512;

impl RemoteError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Build an `Api` error from a non-2xx status and its body.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = match parsed.message {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => {
                let mut preview: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
                if body.chars().count() > MAX_ERROR_BODY_CHARS {
                    preview.push_str("...");
                }
                preview
            }
        };
        Self::Api {
            status,
            code: parsed.code.or(parsed.exc_type),
            message,
        }
    }

    /// The upstream rejected a product because its SKU is already taken.
    pub fn is_duplicate_sku(&self) -> bool {
        match self {
            Self::Api { code, message, .. } => match code.as_deref() {
                Some("product_invalid_sku") => true,
                Some("woocommerce_rest_product_not_created") => {
                    message.to_ascii_lowercase().contains("sku")
                }
                _ => false,
            },
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_woocommerce_error_body() {
        let err = RemoteError::from_status(
            400,
            r#"{"code":"product_invalid_sku","message":"Invalid or duplicated SKU.","data":{"status":400}}"#,
        );
        assert!(err.is_duplicate_sku());
        assert_eq!(err.to_string(), "API error (400): Invalid or duplicated SKU.");
    }

    #[test]
    fn falls_back_to_raw_body() {
        let err = RemoteError::from_status(502, "Bad Gateway");
        assert_eq!(
            err,
            RemoteError::Api { status: 502, code: None, message: "Bad Gateway".into() }
        );
        assert!(!err.is_duplicate_sku());
    }

    #[test]
    fn frappe_exception_type_is_the_code() {
        let err = RemoteError::from_status(
            417,
            r#"{"exc_type":"ValidationError","message":"Item disabled"}"#,
        );
        assert!(matches!(err, RemoteError::Api { code: Some(ref c), .. } if c == "ValidationError"));
    }
}
