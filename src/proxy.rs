use std::io;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::Method;
use axum::response::Response;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::redirect::Policy;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use url::Url;

use crate::capture::{SseAnswerCapture, extract_completion_answer};

pub const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";
pub const MODELS_PATH: &str = "v1/models";

const RELAY_CHANNEL_CAPACITY: usize = 16;
const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Parse an operator-supplied host into a base URL ending in `/`.
///
/// Bare hosts get `http://`; anything other than http(s) is rejected. Query
/// and fragment are discarded.
pub fn normalize_host(text: &str) -> Option<Url> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let candidate = if text.contains("://") {
        text.to_string()
    } else {
        format!("http://{text}")
    };

    let mut url = Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Some(url)
}

/// Resolve an API path such as [`CHAT_COMPLETIONS_PATH`] against a base URL.
pub fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .with_context(|| format!("failed to build upstream url from {base} and {path}"))
}

pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
        })
}

/// Headers sent upstream: everything inbound minus connection-specific ones.
/// `Accept-Encoding` is dropped so the body comes back uncompressed.
pub fn forwarded_request_headers(inbound: &HeaderMap, injecting_bearer: bool) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        let skip = name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == header::CONNECTION
            || name == header::ACCEPT_ENCODING
            || (injecting_bearer && name == header::AUTHORIZATION);
        if !skip {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Headers relayed back to the caller, without hop-by-hop fields.
pub fn relayed_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        let hop_by_hop = name == header::TRANSFER_ENCODING
            || name == header::CONNECTION
            || name == KEEP_ALIVE
            || name == header::PROXY_AUTHENTICATE
            || name == header::PROXY_AUTHORIZATION
            || name == header::TE
            || name == header::TRAILER
            || name == header::UPGRADE
            || name == header::CONTENT_LENGTH;
        if !hop_by_hop {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// One outbound call.
#[derive(Debug)]
pub struct ForwardRequest<'a> {
    pub method: Method,
    pub url: Url,
    pub headers: &'a HeaderMap,
    pub body: Option<Bytes>,
    /// Sent as `Authorization: Bearer <token>`, replacing the inbound header.
    pub bearer: Option<&'a str>,
}

/// HTTP client for OpenAI-compatible upstreams.
///
/// No request timeout is applied and redirects are returned to the caller
/// instead of being followed.
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: Client,
}

impl UpstreamProxy {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("modelbench/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::none())
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self { client })
    }

    pub async fn forward(&self, request: ForwardRequest<'_>) -> Result<reqwest::Response> {
        let mut headers = forwarded_request_headers(request.headers, request.bearer.is_some());
        if let Some(token) = request.bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("provider api key is not a valid header value")?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", request.method, request.url))?;
        debug!(
            upstream = %request.url,
            status = %response.status(),
            "upstream responded"
        );
        Ok(response)
    }
}

/// How the relayed body is inspected for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    None,
    Buffered,
    Sse,
}

enum Capture {
    None,
    Buffered(Vec<u8>),
    Sse(SseAnswerCapture),
}

impl Capture {
    fn new(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::None => Capture::None,
            CaptureMode::Buffered => Capture::Buffered(Vec::new()),
            CaptureMode::Sse => Capture::Sse(SseAnswerCapture::new()),
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        match self {
            Capture::None => {}
            Capture::Buffered(buffer) => buffer.extend_from_slice(chunk),
            Capture::Sse(capture) => {
                capture.feed(chunk);
            }
        }
    }

    fn finish(self) -> Option<String> {
        match self {
            Capture::None => None,
            Capture::Buffered(buffer) => extract_completion_answer(&buffer),
            Capture::Sse(capture) => capture.finish(),
        }
    }

    /// Outcome when the relay stops early: only a streamed capture has a
    /// usable partial answer.
    fn interrupted(self) -> Option<String> {
        match self {
            Capture::Sse(capture) => capture.snapshot().map(str::to_owned),
            Capture::None | Capture::Buffered(_) => None,
        }
    }
}

/// Relayed response plus the answer captured once the relay ends.
pub struct Relay {
    pub response: Response,
    pub answer: oneshot::Receiver<Option<String>>,
}

/// Turn an upstream response into a streaming response for the caller.
///
/// A background task copies every chunk to the caller before inspecting it.
/// If the caller goes away the task stops and reports the latest snapshot.
pub fn relay(upstream: reqwest::Response, mode: CaptureMode) -> Relay {
    let status = upstream.status();
    let headers = relayed_response_headers(upstream.headers());

    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(RELAY_CHANNEL_CAPACITY);
    let (answer_tx, answer_rx) = oneshot::channel();
    tokio::spawn(async move {
        let answer = pump(upstream, tx, Capture::new(mode)).await;
        let _ = answer_tx.send(answer);
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Relay {
        response,
        answer: answer_rx,
    }
}

async fn pump(
    upstream: reqwest::Response,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    mut capture: Capture,
) -> Option<String> {
    let url = upstream.url().clone();
    let mut stream = upstream.bytes_stream();
    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = tx.closed() => {
                debug!(upstream = %url, "client disconnected during relay");
                return capture.interrupted();
            }
        };

        match next {
            Some(Ok(chunk)) => {
                if tx.send(Ok(chunk.clone())).await.is_err() {
                    debug!(upstream = %url, "client disconnected during relay");
                    return capture.interrupted();
                }
                capture.feed(&chunk);
            }
            Some(Err(err)) => {
                warn!(upstream = %url, error = %err, "upstream body failed mid-stream");
                let _ = tx.send(Err(io::Error::other(err))).await;
                return capture.interrupted();
            }
            None => return capture.finish(),
        }
    }
}
