use crate::envelope::{HttpResponse, reason_phrase};
use crate::openapi::openapi_document;
use crate::route::{Route, RouteError, parse_request_line, parse_route};
use plinth_kernel::{ApiDocument, Channel, Dispatcher};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind: SocketAddr,
}

#[derive(Debug, Error)]
pub enum HttpServeError {
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
    #[error("failed to describe registry: {0}")]
    Describe(String),
    #[error("failed to start runtime: {0}")]
    Runtime(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub body: Vec<u8>,
}

/// The network channel. Its description documents are built once, from the
/// registry as it stands when the channel is created, and served unchanged.
#[derive(Debug)]
pub struct NetworkChannel {
    dispatcher: Dispatcher,
    title: String,
    document: ApiDocument,
    document_json: Value,
    openapi: Value,
    handlers: Vec<String>,
    served: AtomicU64,
}

impl NetworkChannel {
    pub fn new(dispatcher: Dispatcher) -> Result<Self, HttpServeError> {
        Self::with_title(dispatcher, "plinth", env!("CARGO_PKG_VERSION"))
    }

    pub fn with_title(
        dispatcher: Dispatcher,
        title: &str,
        version: &str,
    ) -> Result<Self, HttpServeError> {
        let document = dispatcher
            .tree()
            .read()
            .describe(Some(Channel::Network))
            .map_err(|err| HttpServeError::Describe(err.to_string()))?;
        let document_json =
            serde_json::to_value(&document).map_err(|e| HttpServeError::Describe(e.to_string()))?;
        let openapi = openapi_document(title, version, &document);
        let handlers = document
            .root
            .children
            .iter()
            .map(|c| c.name.clone())
            .filter(|name| !name.starts_with('_'))
            .collect();
        info!(
            methods = document.root.all_methods().len(),
            "network description built"
        );
        Ok(Self {
            dispatcher,
            title: title.to_string(),
            document,
            document_json,
            openapi,
            handlers,
            served: AtomicU64::new(0),
        })
    }

    pub fn document(&self) -> &ApiDocument {
        &self.document
    }

    pub fn handlers(&self) -> &[String] {
        &self.handlers
    }

    pub fn requests_served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Answer one request. Must run inside a tokio runtime; suspending
    /// handlers are awaited on it and blocking ones are offloaded.
    pub async fn respond(&self, method: &str, target: &str, body: &[u8]) -> HttpResponse {
        self.served.fetch_add(1, Ordering::Relaxed);
        let route = match parse_route(method, target) {
            Ok(route) => route,
            Err(err) => return HttpResponse::from_route(&err),
        };
        debug!(%method, %target, "request");
        match route {
            Route::Index => HttpResponse::ok(json!({
                "service": self.title,
                "handlers": self.handlers,
                "routes": [
                    "POST /<handler>/<method>",
                    "POST /_system/<method>",
                    "GET /_http/health",
                    "GET /_http/openapi",
                    "GET /_http/describe?handler=<name>",
                    "GET /_http/metrics"
                ]
            })),
            Route::Health => HttpResponse::ok(json!({
                "status": "ok",
                "handlers": self.handlers.len(),
            })),
            Route::OpenApi => HttpResponse::ok(self.openapi.clone()),
            Route::Describe { handler: None } => HttpResponse::ok(self.document_json.clone()),
            Route::Describe { handler: Some(name) } => match self.document.root.find(&name) {
                Some(description) => match serde_json::to_value(description) {
                    Ok(body) => HttpResponse::ok(body),
                    Err(err) => HttpResponse::error(500, "runtime", err.to_string()),
                },
                None => HttpResponse::error(404, "not_found", format!("not found: {name}")),
            },
            Route::Metrics => HttpResponse::ok(json!({
                "handlers": self.handlers,
                "requestsServed": self.requests_served(),
            })),
            Route::Call(path) => self.call(&path, body).await,
        }
    }

    async fn call(&self, path: &str, body: &[u8]) -> HttpResponse {
        let payload = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(body) {
                Ok(payload) => payload,
                Err(err) => {
                    let message = format!("invalid JSON body: {err}");
                    return HttpResponse::error(400, "bad_request", message);
                }
            }
        };
        let outcome = self.dispatcher.call_network(path, payload, Handle::current());
        match outcome.resolve().await {
            Ok(result) => HttpResponse::success(result),
            Err(err) => {
                debug!(%path, kind = err.kind(), "call failed");
                HttpResponse::from_dispatch(&err)
            }
        }
    }
}

/// Bind `config.bind` and serve until interrupted.
pub async fn serve(
    config: HttpServerConfig,
    channel: Arc<NetworkChannel>,
) -> Result<(), HttpServeError> {
    let listener = TcpListener::bind(config.bind).await.map_err(HttpServeError::Bind)?;
    info!(bind = %config.bind, handlers = channel.handlers().len(), "serving network channel");
    tokio::select! {
        result = serve_with_limit(listener, channel, None) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    }
}

/// Accept connections on `listener`, one task per connection. With a limit,
/// stop accepting after that many connections and wait for them to finish.
pub async fn serve_with_limit(
    listener: TcpListener,
    channel: Arc<NetworkChannel>,
    max_requests: Option<usize>,
) -> Result<(), HttpServeError> {
    let mut accepted = 0usize;
    let mut workers = JoinSet::new();
    loop {
        if let Some(limit) = max_requests
            && accepted >= limit
        {
            break;
        }
        let (stream, peer) = listener.accept().await.map_err(HttpServeError::Accept)?;
        accepted += 1;
        let channel = Arc::clone(&channel);
        workers.spawn(async move {
            if let Err(err) = handle_connection(stream, &channel).await {
                warn!(%peer, error = %err, "connection failed");
            }
        });
    }
    while workers.join_next().await.is_some() {}
    Ok(())
}

async fn handle_connection(mut stream: TcpStream, channel: &NetworkChannel) -> std::io::Result<()> {
    let response = match read_request(&mut stream).await {
        Ok(request) => channel.respond(&request.method, &request.target, &request.body).await,
        Err(err) => HttpResponse::from_route(&err),
    };
    write_json_response(&mut stream, &response).await
}

pub async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Result<HttpRequest, RouteError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(RouteError::BadRequest("request head too large".to_string()));
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| RouteError::BadRequest(format!("failed to read request: {e}")))?;
        if n == 0 {
            let reason = if buf.is_empty() { "empty request" } else { "truncated request head" };
            return Err(RouteError::BadRequest(reason.to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.lines();
    let line = lines
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing request line".to_string()))?;
    let (method, target) = parse_request_line(line)?;
    let headers: Vec<(&str, &str)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(name, value)| (name.trim(), value.trim()))
        .collect();
    if headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("transfer-encoding"))
    {
        return Err(RouteError::LengthRequired(
            "transfer-encoding is not supported; send content-length".to_string(),
        ));
    }
    let length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.parse::<usize>())
        .transpose()
        .map_err(|_| RouteError::BadRequest("invalid content-length".to_string()))?
        .unwrap_or(0);
    if length > MAX_BODY_BYTES {
        return Err(RouteError::PayloadTooLarge { limit: MAX_BODY_BYTES });
    }

    let mut body = buf[head_end + 4..].to_vec();
    if body.len() < length {
        let mut rest = vec![0u8; length - body.len()];
        stream
            .read_exact(&mut rest)
            .await
            .map_err(|e| RouteError::BadRequest(format!("failed to read body: {e}")))?;
        body.extend_from_slice(&rest);
    }
    body.truncate(length);
    Ok(HttpRequest { method, target, body })
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

pub async fn write_json_response<S: AsyncWrite + Unpin>(
    stream: &mut S,
    response: &HttpResponse,
) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(&response.body)?;
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST\r\nConnection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await
}
