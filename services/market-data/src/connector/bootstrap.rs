//! REST full-book fetches
//!
//! Used both for bootstrap snapshots on streaming feeds and for every cycle
//! of a polling feed. Status handling:
//!
//! - 2xx: body is decoded by the exchange codec
//! - 4xx: `BootstrapError::NotFound`, definite, never retried
//! - 5xx, timeout, connection failure: `BootstrapError::Transient`

use reqwest::StatusCode;

use crate::error::BootstrapError;
use crate::events::UpdateBatch;
use crate::exchanges::ExchangeCodec;

/// Map a non-success HTTP status onto the bootstrap error taxonomy.
pub fn classify_status(url: &str, status: StatusCode) -> Option<BootstrapError> {
    if status.is_success() {
        None
    } else if status.is_client_error() {
        Some(BootstrapError::NotFound {
            url: url.to_string(),
            status: status.as_u16(),
        })
    } else {
        Some(BootstrapError::Transient(format!("{url} returned {status}")))
    }
}

/// GET `url` and return the body.
pub async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String, BootstrapError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| BootstrapError::Transient(e.to_string()))?;

    if let Some(err) = classify_status(url, response.status()) {
        return Err(err);
    }

    response
        .text()
        .await
        .map_err(|e| BootstrapError::Transient(e.to_string()))
}

/// Fetch and decode a full book.
pub async fn fetch_snapshot(
    client: &reqwest::Client,
    codec: &dyn ExchangeCodec,
    url: &str,
) -> Result<UpdateBatch, BootstrapError> {
    let body = fetch_body(client, url).await?;
    Ok(codec.decode_snapshot(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert!(classify_status("http://x", StatusCode::OK).is_none());
    }

    #[test]
    fn test_classify_client_error_is_definite() {
        let err = classify_status("http://x", StatusCode::NOT_FOUND).unwrap();
        assert_eq!(
            err,
            BootstrapError::NotFound {
                url: "http://x".into(),
                status: 404
            }
        );
        assert!(!err.is_retryable());

        let err = classify_status("http://x", StatusCode::FORBIDDEN).unwrap();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_server_error_is_transient() {
        let err = classify_status("http://x", StatusCode::BAD_GATEWAY).unwrap();
        assert!(matches!(err, BootstrapError::Transient(_)));
        assert!(err.is_retryable());
    }
}
