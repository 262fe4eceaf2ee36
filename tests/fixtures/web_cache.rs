//! A local HTTP web cache speaking the encrypted `?get=` protocol.

use lattice_crypto::webcache::WebCacheCipher;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Responder = dyn Fn(&str) -> String + Send + Sync;

/// Running fake cache
pub struct FakeWebCache {
    /// Base URL to configure as the cache address
    pub url: String,
    /// Decrypted request lines, in arrival order
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl FakeWebCache {
    /// Serve on a random local port. `respond` maps a decrypted request line
    /// to the plaintext response; answers starting with `error:` are sent
    /// unencrypted.
    pub async fn start(
        access_key: [u8; 32],
        respond: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond: Arc<Responder> = Arc::new(respond);
        let cipher = WebCacheCipher::new(&access_key).unwrap();

        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = seen.clone();
                let respond = respond.clone();
                let cipher = cipher.clone();
                tokio::spawn(async move {
                    serve(stream, &cipher, &*respond, &seen).await;
                });
            }
        });

        Self {
            url: format!("http://{addr}/cache"),
            requests,
        }
    }

    /// Request lines received so far
    pub fn received(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

async fn serve(
    mut stream: TcpStream,
    cipher: &WebCacheCipher,
    respond: &Responder,
    seen: &Mutex<Vec<String>>,
) {
    let mut data = Vec::new();
    let mut buf = [0u8; 2048];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&data);
    let target = head.split_whitespace().nth(1).unwrap_or("/");
    let encoded = url::Url::parse(&format!("http://localhost{target}"))
        .ok()
        .and_then(|u| u.query_pairs().find(|(k, _)| k == "get").map(|(_, v)| v.into_owned()));

    let body = match encoded.map(|e| cipher.decrypt_response(&e)) {
        Some(Ok(line)) => {
            seen.lock().push(line.clone());
            let reply = respond(&line);
            if reply.starts_with("error:") {
                reply
            } else {
                cipher.encrypt_request(&reply).unwrap()
            }
        }
        _ => String::new(),
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
}
