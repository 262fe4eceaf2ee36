//! HTTP client for web caches.

use super::{CacheRequest, CacheResponse};
use crate::DiscoveryError;
use lattice_crypto::webcache::WebCacheCipher;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Issues encrypted requests to web caches
#[derive(Debug, Clone)]
pub struct WebCacheClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl WebCacheClient {
    /// Client with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Http` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, timeout })
    }

    /// Per-request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request and return the decrypted, parsed response
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::WebCache` when the cache answers `error:` or an
    /// empty body, and transport or cipher errors otherwise.
    pub async fn request(
        &self,
        address: &str,
        access_key: &[u8],
        request: &CacheRequest,
    ) -> Result<CacheResponse, DiscoveryError> {
        let cipher = WebCacheCipher::new(access_key)?;
        let url = request_url(address, &cipher.encrypt_request(&request.to_string())?)?;

        debug!(address, kind = request.kind().name(), "web cache request");
        let body = tokio::time::timeout(self.timeout, async {
            self.http
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        })
        .await
        .map_err(|_| DiscoveryError::Timeout)??;

        let text = decode_body(&cipher, &body)?;
        Ok(CacheResponse::parse(&text))
    }
}

/// `<address>?get=<urlencoded base64>`
fn request_url(address: &str, encoded: &str) -> Result<Url, DiscoveryError> {
    let mut url = Url::parse(address)?;
    url.query_pairs_mut().append_pair("get", encoded);
    Ok(url)
}

fn decode_body(cipher: &WebCacheCipher, body: &str) -> Result<String, DiscoveryError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(DiscoveryError::WebCache("access key not accepted".to_string()));
    }
    if let Some(message) = body.strip_prefix("error:") {
        return Err(DiscoveryError::WebCache(message.trim().to_string()));
    }

    let text = cipher.decrypt_response(body)?;
    match text.strip_prefix("error:") {
        Some(message) => Err(DiscoveryError::WebCache(message.trim().to_string())),
        None => Ok(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const KEY: [u8; 32] = [0x11; 32];

    #[test]
    fn test_request_url_encodes_parameter() {
        let url = request_url("http://cache.example.net/update.php", "ab+/=").unwrap();
        assert_eq!(url.as_str(), "http://cache.example.net/update.php?get=ab%2B%2F%3D");
    }

    #[test]
    fn test_decode_body_error_line() {
        let cipher = WebCacheCipher::new(&KEY).unwrap();
        assert!(matches!(
            decode_body(&cipher, "error: unknown network"),
            Err(DiscoveryError::WebCache(m)) if m == "unknown network"
        ));
        assert!(matches!(
            decode_body(&cipher, ""),
            Err(DiscoveryError::WebCache(_))
        ));
    }

    #[test]
    fn test_decode_body_encrypted() {
        let cipher = WebCacheCipher::new(&KEY).unwrap();
        let body = cipher.encrypt_request("pong").unwrap();
        assert_eq!(decode_body(&cipher, &body).unwrap(), "pong");
    }

    /// Serve one HTTP response containing `body`
    async fn serve_once(body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/cache")
    }

    #[tokio::test]
    async fn test_query_against_local_cache() {
        let cipher = WebCacheCipher::new(&KEY).unwrap();
        let body = cipher
            .encrypt_request("node:9/192.0.2.1/4000/4001\ntimeout:30")
            .unwrap();
        let address = serve_once(body).await;

        let client = WebCacheClient::new(Duration::from_secs(5)).unwrap();
        let response = client
            .request(&address, &KEY, &CacheRequest::Query { network_id: 1 })
            .await
            .unwrap();
        assert_eq!(response.nodes.len(), 1);
        assert_eq!(response.timeout_minutes, Some(30.0));
    }

    #[tokio::test]
    async fn test_bad_key_length() {
        let client = WebCacheClient::new(Duration::from_secs(1)).unwrap();
        let result = client
            .request("http://127.0.0.1:9/", &[0u8; 3], &CacheRequest::Ping { network_id: 0 })
            .await;
        assert!(matches!(result, Err(DiscoveryError::Crypto(_))));
    }
}
