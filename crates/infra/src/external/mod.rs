//! External service clients/adapters.

pub mod erpnext;
pub mod error;
pub mod woocommerce;

pub use erpnext::ErpNextClient;
pub use error::RemoteError;
pub use woocommerce::WooCommerceClient;

use std::time::Duration;

/// Send a request and decode a 2xx JSON body; anything else is a `RemoteError`.
pub(crate) async fn send_json<T>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, RemoteError>
where
    T: serde::de::DeserializeOwned,
{
    let response = request
        .send()
        .await
        .map_err(|e| RemoteError::from_reqwest(e, timeout))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RemoteError::from_reqwest(e, timeout))?;

    if !status.is_success() {
        return Err(RemoteError::from_status(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| RemoteError::Parse(e.to_string()))
}
