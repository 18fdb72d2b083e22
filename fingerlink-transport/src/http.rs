//! HTTP transport
//!
//! Drives a terminal that exposes its commands as REST endpoints (usually
//! through a tunnel). Each command written becomes one request; the JSON
//! reply is rendered back into the configured dialect's lines so that the
//! protocol layer sees the same grammar as on a serial line.

use std::time::Duration;

use async_trait::async_trait;
use fingerlink_core::constants::{DEFAULT_PROGRESSIVE_TIMEOUT_MS, DEFAULT_QUICK_TIMEOUT_MS};
use fingerlink_core::{Command, CommandKind, Dialect, Reply};
use fingerlink_types::Template;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::{error::*, ReadOutcome, Transport};

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CountReply {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct EnrollReply {
    status: String,
    id: Option<u32>,
    #[serde(default)]
    messages: Vec<String>,
    error: Option<String>,
    template: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyReply {
    #[serde(default)]
    found: bool,
    id: Option<u32>,
    confidence: Option<u16>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptureReply {
    template: String,
}

#[derive(Debug, Deserialize)]
struct ScanReply {
    #[serde(default)]
    success: bool,
    uid: Option<String>,
    message: Option<String>,
}

/// Request/response adapter over the device's REST endpoints
pub struct HttpTransport {
    base_url: String,
    dialect: Dialect,
    connect_timeout: Duration,
    quick_timeout: Duration,
    progressive_timeout: Duration,
    endpoint: Option<Endpoint>,
    inflight: Option<InFlight>,
}

/// Opened client and parsed base URL
#[derive(Clone)]
struct Endpoint {
    client: Client,
    base_url: Url,
}

/// Reply lines of the last written command
struct InFlight {
    task: JoinHandle<()>,
    lines: mpsc::UnboundedReceiver<Result<String>>,
}

impl HttpTransport {
    /// Create new HTTP transport
    ///
    /// # Arguments
    /// * `base_url` - Root of the device API (e.g., "https://terminal.example.net")
    /// * `dialect` - Grammar the replies are rendered in
    pub fn new(base_url: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            base_url: base_url.into(),
            dialect,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            quick_timeout: Duration::from_millis(DEFAULT_QUICK_TIMEOUT_MS),
            progressive_timeout: Duration::from_millis(DEFAULT_PROGRESSIVE_TIMEOUT_MS),
            endpoint: None,
            inflight: None,
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set per-request timeouts for quick and progressive commands
    pub fn with_request_timeouts(mut self, quick: Duration, progressive: Duration) -> Self {
        self.quick_timeout = quick;
        self.progressive_timeout = progressive;
        self
    }

    fn request_timeout(&self, command: Command) -> Duration {
        match command.kind() {
            CommandKind::Quick => self.quick_timeout,
            CommandKind::Progressive => self.progressive_timeout,
        }
    }

    fn abort_inflight(&mut self) -> usize {
        let Some(mut inflight) = self.inflight.take() else {
            return 0;
        };

        inflight.task.abort();

        let mut dropped = 0;
        while inflight.lines.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

impl Endpoint {
    async fn send(&self, method: Method, path: &str, timeout: Duration) -> Result<Response> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", path, e)))?;

        debug!("{} {}", method, url);

        let response = self
            .client
            .request(method, url)
            .timeout(timeout)
            .send()
            .await?;

        Ok(response)
    }

    /// Perform the request for `command` and translate the reply
    #[instrument(skip(self, timeout))]
    async fn exchange(&self, command: Command, timeout: Duration) -> Result<Vec<Reply>> {
        let (method, path) = route(command);
        let response = self.send(method, &path, timeout).await?;
        let status = response.status();

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            };
            return Ok(vec![Reply::Failed(message)]);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let replies = match command {
            Command::Ping => vec![Reply::Pong],
            Command::Delete(_) | Command::Empty => vec![Reply::Done],
            Command::Count => {
                let reply: CountReply = response.json().await?;
                vec![Reply::Count(reply.count)]
            }
            Command::Enroll => enroll_replies(response.json().await?),
            Command::Verify => verify_replies(response.json().await?),
            Command::Capture => {
                let reply: CaptureReply = response.json().await?;
                match Template::from_hex(&reply.template) {
                    Ok(template) => vec![Reply::Template(template)],
                    Err(e) => vec![Reply::Failed(format!("invalid template: {}", e))],
                }
            }
            Command::ScanCard => scan_replies(response.json().await?),
        };

        Ok(replies)
    }
}

fn route(command: Command) -> (Method, String) {
    match command {
        Command::Ping => (Method::GET, "/api/fingerprint/ping".to_string()),
        Command::Count => (Method::GET, "/api/fingerprint/count".to_string()),
        Command::Delete(id) => (Method::DELETE, format!("/api/fingerprint/{}", id)),
        Command::Empty => (Method::DELETE, "/api/fingerprint/empty".to_string()),
        Command::Enroll => (Method::POST, "/api/fingerprint/enroll".to_string()),
        Command::Verify => (Method::POST, "/api/fingerprint/verify".to_string()),
        Command::Capture => (Method::POST, "/api/fingerprint/capture".to_string()),
        Command::ScanCard => (Method::POST, "/api/rfid/scan".to_string()),
    }
}

fn enroll_replies(reply: EnrollReply) -> Vec<Reply> {
    let mut replies: Vec<Reply> = reply.messages.into_iter().map(Reply::Progress).collect();

    if let Some(template) = reply.template.as_deref().and_then(|hex| Template::from_hex(hex).ok()) {
        replies.push(Reply::Template(template));
    }

    let terminal = match (reply.status.eq_ignore_ascii_case("success"), reply.id) {
        (true, Some(id)) => Reply::Enrolled(id),
        (true, None) => Reply::Failed("enrollment succeeded without an id".to_string()),
        (false, _) => Reply::Failed(reply.error.unwrap_or_else(|| "Unknown error".to_string())),
    };
    replies.push(terminal);

    replies
}

fn verify_replies(reply: VerifyReply) -> Vec<Reply> {
    let mut replies = Vec::new();

    if let Some(message) = reply.message.filter(|m| !m.trim().is_empty()) {
        replies.push(Reply::Progress(message));
    }

    let terminal = match (reply.found, reply.id, reply.confidence) {
        (true, Some(id), Some(confidence)) => Reply::Match { id, confidence },
        (true, _, _) => Reply::Failed("match reported without id or confidence".to_string()),
        (false, _, _) => Reply::NoMatch,
    };
    replies.push(terminal);

    replies
}

fn scan_replies(reply: ScanReply) -> Vec<Reply> {
    match reply.uid.filter(|uid| reply.success && !uid.trim().is_empty()) {
        Some(uid) => vec![Reply::Card(uid.trim().to_string())],
        None => vec![Reply::Failed(
            reply.message.unwrap_or_else(|| "No card detected".to_string()),
        )],
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let base_url = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", self.base_url, e)))?;

        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        debug!("HTTP transport ready for {}", base_url);

        self.endpoint = Some(Endpoint { client, base_url });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.abort_inflight();
        self.endpoint = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let endpoint = self.endpoint.clone().ok_or(Error::NotOpen)?;
        let command = Command::parse(line).ok_or_else(|| Error::Unsupported(line.to_string()))?;

        let dropped = self.abort_inflight();
        if dropped > 0 {
            warn!("Discarded {} unread lines from previous request", dropped);
        }

        let timeout = self.request_timeout(command);
        let dialect = self.dialect;
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            match endpoint.exchange(command, timeout).await {
                Ok(replies) => {
                    for reply in &replies {
                        let line = dialect.render(command, reply);
                        trace!("Rendered line: {:?}", line);
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            }
        });

        self.inflight = Some(InFlight { task, lines: rx });
        Ok(())
    }

    async fn read_line(&mut self, deadline: Instant) -> Result<ReadOutcome> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }

        if let Some(inflight) = self.inflight.as_mut() {
            match timeout_at(deadline, inflight.lines.recv()).await {
                Err(_) => return Ok(ReadOutcome::Idle),
                Ok(Some(Ok(line))) => return Ok(ReadOutcome::Line(line)),
                Ok(Some(Err(e))) => return Err(e),
                // Reply fully delivered; nothing more will arrive
                Ok(None) => {}
            }
        }

        sleep_until(deadline).await;
        Ok(ReadOutcome::Idle)
    }

    async fn drain_stale(&mut self) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        Ok(self.abort_inflight())
    }

    fn sends_handshake(&self) -> bool {
        false
    }

    fn remote_addr(&self) -> String {
        self.base_url.clone()
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.abort_inflight();
    }
}
