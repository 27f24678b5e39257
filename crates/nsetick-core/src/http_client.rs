use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// HTTP request envelope used by scrape calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers<'h>(
        mut self,
        headers: impl IntoIterator<Item = (&'h String, &'h String)>,
    ) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract: owns all network I/O, cookies and timeouts.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production transport backed by reqwest with a session cookie jar.
///
/// Bodies are decoded as Latin-1 since several NSE pages are not valid UTF-8.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .cookie_store(true)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&request.url)
                .timeout(Duration::from_millis(request.timeout_ms));

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::new(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::new(format!("connection failed: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse {
                status,
                body: decode_latin1(&bytes),
            })
        })
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

#[derive(Debug, Clone)]
struct ScriptedRoute {
    pattern: String,
    outcome: Result<HttpResponse, HttpError>,
    delay: Duration,
}

/// Offline transport serving canned responses, for tests and demos.
///
/// Routes match when the request URL contains the route pattern; the first
/// registered match wins. Unmatched URLs answer with status 404.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    routes: Vec<ScriptedRoute>,
    requests: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Marks one request as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, pattern: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_route(pattern, Ok(HttpResponse::ok(body)), Duration::ZERO)
    }

    pub fn with_delayed_body(
        self,
        pattern: impl Into<String>,
        body: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.with_route(pattern, Ok(HttpResponse::ok(body)), delay)
    }

    pub fn with_status(
        self,
        pattern: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        let response = HttpResponse {
            status,
            body: body.into(),
        };
        self.with_route(pattern, Ok(response), Duration::ZERO)
    }

    pub fn with_error(self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_route(pattern, Err(HttpError::new(message)), Duration::ZERO)
    }

    fn with_route(
        mut self,
        pattern: impl Into<String>,
        outcome: Result<HttpResponse, HttpError>,
        delay: Duration,
    ) -> Self {
        self.routes.push(ScriptedRoute {
            pattern: pattern.into(),
            outcome,
            delay,
        });
        self
    }

    pub fn recorded_requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded requests whose URL contains `pattern`.
    pub fn request_count(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|request| request.url.contains(pattern))
            .count()
    }

    /// Highest number of requests that were awaiting a response at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let route = self
            .routes
            .iter()
            .find(|route| request.url.contains(&route.pattern))
            .cloned();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        Box::pin(async move {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            let _in_flight = InFlight(&self.in_flight);

            match route {
                Some(route) => {
                    if !route.delay.is_zero() {
                        tokio::time::sleep(route.delay).await;
                    }
                    route.outcome
                }
                None => Ok(HttpResponse {
                    status: 404,
                    body: String::new(),
                }),
            }
        })
    }
}
