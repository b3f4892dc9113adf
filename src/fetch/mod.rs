//! HTTP plumbing shared by the feed client and the routing provider.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::NetworkError;

/// GETs `url` with a per-request timeout and returns the body of a 2xx response.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, NetworkError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| NetworkError::InvalidUrl(url.to_string()))?;
    let mut req = reqwest::Request::new(reqwest::Method::GET, parsed);
    *req.timeout_mut() = Some(timeout);
    req.headers_mut().insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(NetworkError::Status {
            url: url.to_string(),
            status,
        });
    }

    let bytes = resp.bytes().await?;
    debug!(url, bytes = bytes.len(), "Fetched response body");
    Ok(bytes.to_vec())
}

/// GETs `url` and decodes the body as JSON.
pub async fn fetch_json<C, T>(client: &C, url: &str, timeout: Duration) -> Result<T, NetworkError>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    let bytes = fetch_bytes(client, url, timeout).await?;
    decode_json(url, &bytes)
}

pub(crate) fn decode_json<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<T, NetworkError> {
    serde_json::from_slice(bytes).map_err(|e| NetworkError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Envelope {
        r#type: String,
    }

    #[test]
    fn test_decode_json_ok() {
        let env: Envelope = decode_json("http://x", br#"{"type":"RouteList"}"#).unwrap();
        assert_eq!(env.r#type, "RouteList");
    }

    #[test]
    fn test_decode_json_malformed() {
        let err = decode_json::<Envelope>("http://x", b"<html>").unwrap_err();
        assert!(matches!(err, NetworkError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_request() {
        let client = BasicClient::new().unwrap();
        let err = fetch_bytes(&client, "not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl(_)));
    }
}
