//! Canned single-use HTTP servers for exercising the protocol client
//! against real sockets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use memchr::memmem;
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::core::gateway::{GatewayResponse, PaymentGateway, WalletIdentity};

pub struct CannedResponse {
    pub status: u16,
    pub body: String,
}

impl CannedResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Serve one canned response per accepted connection, in order, then stop.
/// Returns the base URL and a handle resolving to the recorded requests.
pub async fn start_server(
    responses: Vec<CannedResponse>,
) -> (String, JoinHandle<Vec<RecordedRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");

    let handle = tokio::spawn(async move {
        let mut recorded = Vec::new();
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            if let Ok(request) = read_request(&mut stream).await {
                recorded.push(request);
            }
            let payload = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status,
                reason_phrase(response.status),
                response.body.len(),
                response.body
            );
            let _ = stream.write_all(payload.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        recorded
    });

    (format!("http://{}", addr), handle)
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

async fn read_request(stream: &mut TcpStream) -> Result<RecordedRequest, String> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = memmem::find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut tmp).await.map_err(|err| err.to_string())?;
        if n == 0 {
            return Err("connection closed before headers".to_string());
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut tmp).await.map_err(|err| err.to_string())?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }
    body.truncate(content_length);

    Ok(RecordedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

/// Gateway double that replays a scripted list of responses and counts how
/// often it was asked to sign or refresh.
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<GatewayResponse>>,
    pub requests: AtomicUsize,
    pub refreshes: AtomicUsize,
    refreshable: bool,
}

impl ScriptedGateway {
    pub fn new(responses: Vec<(u16, &str)>, refreshable: bool) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| GatewayResponse {
                        status: StatusCode::from_u16(status).expect("valid status"),
                        body: body.to_string(),
                    })
                    .collect(),
            ),
            requests: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            refreshable,
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn signed_request(
        &self,
        _identity: &WalletIdentity,
        _node_url: &str,
        _slot: &str,
        _method: &str,
        _action: &str,
        _body: String,
    ) -> Result<GatewayResponse, Box<dyn std::error::Error + Send + Sync>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .expect("scripted responses lock")
            .pop_front()
            .ok_or_else(|| "no scripted response left".into())
    }

    fn supports_nonce_refresh(&self) -> bool {
        self.refreshable
    }

    async fn refresh_nonce(
        &self,
        _node_url: &str,
        _identity: &WalletIdentity,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
