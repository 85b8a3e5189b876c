//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Install a log subscriber for test debugging; honors `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    /// Header name (lowercased) and value pairs, in wire order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    /// First value of a header, by lowercase name.
    #[allow(dead_code)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of values carried for a header.
    #[allow(dead_code)]
    pub fn header_count(&self, name: &str) -> usize {
        self.headers.iter().filter(|(k, _)| k == name).count()
    }
}

/// A programmable mock HTTP/1.1 backend. Serves every request on a
/// connection (keep-alive), so pooled connection reuse is observable.
#[derive(Clone)]
pub struct MockBackend {
    /// Response status code.
    pub status: u16,
    /// Response body.
    pub body: String,
    /// Delay before responding.
    pub delay: Duration,
    /// Close the socket after reading the request, without responding.
    pub close_without_response: bool,
    /// Channel receiving every request the backend sees.
    pub capture: Option<mpsc::UnboundedSender<CapturedRequest>>,
    /// Incremented once per accepted TCP connection.
    pub connections: Option<Arc<AtomicUsize>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            status: 200,
            body: "{}".to_string(),
            delay: Duration::ZERO,
            close_without_response: false,
            capture: None,
            connections: None,
        }
    }
}

impl MockBackend {
    /// Bind to an ephemeral port and start serving. Returns the address.
    pub async fn spawn(self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        if let Some(counter) = &self.connections {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::spawn(handle_connection(socket, self.clone()));
                    }
                    Err(_) => break,
                }
            }
        });

        addr
    }
}

async fn handle_connection(mut socket: TcpStream, backend: MockBackend) {
    let mut buf: Vec<u8> = Vec::new();

    loop {
        // Read one full request head.
        let header_end = loop {
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
            let mut chunk = [0u8; 4096];
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        // Read the body.
        while buf.len() < header_end + content_length {
            let mut chunk = [0u8; 4096];
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        let body: Vec<u8> = buf[header_end..header_end + content_length].to_vec();
        buf.drain(..header_end + content_length);

        if let Some(tx) = &backend.capture {
            let mut lines = head.lines();
            let request_line = lines.next().unwrap_or_default().to_string();
            let headers = lines
                .take_while(|line| !line.is_empty())
                .filter_map(|line| line.split_once(':'))
                .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
                .collect();
            let _ = tx.send(CapturedRequest {
                request_line,
                headers,
                body: body.clone(),
            });
        }

        if backend.delay > Duration::ZERO {
            tokio::time::sleep(backend.delay).await;
        }
        if backend.close_without_response {
            return;
        }

        let status_text = match backend.status {
            200 => "200 OK",
            204 => "204 No Content",
            404 => "404 Not Found",
            500 => "500 Internal Server Error",
            503 => "503 Service Unavailable",
            _ => "200 OK",
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            status_text,
            backend.body.len(),
            backend.body
        );
        if socket.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
