//! HTTP context collaborator.
//!
//! The logger never owns a web framework. Request and response objects are
//! reached through the [`HttpRequest`] / [`HttpResponse`] traits, either
//! supplied explicitly on a log call or looked up through an
//! [`HttpContextProvider`]. Every accessor is fallible; the property builder
//! turns failures into diagnostic values.

use std::future::Future;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, TryLockError};

use crate::error::BoxError;

/// Result type of every HTTP collaborator accessor.
pub type ContextResult<T> = Result<T, BoxError>;

/// Ordered name/value pairs (headers, form fields).
pub type NameValues = Vec<(String, String)>;

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Seekable body stream shared between the application and the logger.
pub type SharedStream = Arc<Mutex<dyn ReadSeek + Send>>;

/// Wrap an in-memory body as a [`SharedStream`].
pub fn shared_stream(bytes: impl Into<Vec<u8>>) -> SharedStream {
    Arc::new(Mutex::new(Cursor::new(bytes.into())))
}

/// Read the whole stream from the start, then put the cursor back where the
/// application left it. Fails instead of waiting when the stream is locked.
pub fn peek_stream(stream: &SharedStream) -> ContextResult<String> {
    let mut guard = match stream.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::WouldBlock) => return Err("body stream busy".into()),
        Err(TryLockError::Poisoned(_)) => return Err("body stream lock poisoned".into()),
    };
    let original = guard.stream_position()?;
    guard.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    let read = guard.read_to_end(&mut buf);
    guard.seek(SeekFrom::Start(original))?;
    read?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Render name/value pairs as a URL-encoded query string.
pub fn to_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Client IP headers, most trusted first.
const TRUE_CLIENT_IP: &str = "True-Client-IP";
const FORWARDED_FOR: &str = "X-Forwarded-For";
const CLIENT_SIDE: &str = "X-ClientSide";
const CLUSTER_CLIENT_IP: &str = "X-Cluster-Client-IP";

/// Read-only view of an in-flight request.
pub trait HttpRequest: Send + Sync {
    /// Absolute request URL as received.
    fn url(&self) -> ContextResult<String>;

    fn method(&self) -> ContextResult<String>;

    fn headers(&self) -> ContextResult<NameValues>;

    /// Case-insensitive single header lookup.
    fn header(&self, name: &str) -> ContextResult<Option<String>> {
        Ok(self
            .headers()?
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v))
    }

    /// Path and query as sent on the request line.
    fn raw_url(&self) -> ContextResult<String>;

    fn query_string(&self) -> ContextResult<String>;

    fn remote_addr(&self) -> ContextResult<Option<String>>;

    /// Address of the server that accepted the request.
    fn local_addr(&self) -> ContextResult<Option<String>>;

    /// Parsed form fields; empty for non-form requests.
    fn form(&self) -> ContextResult<NameValues> {
        Ok(Vec::new())
    }

    fn body(&self) -> ContextResult<Option<SharedStream>> {
        Ok(None)
    }

    fn user_agent(&self) -> ContextResult<Option<String>> {
        self.header("User-Agent")
    }

    fn referrer(&self) -> ContextResult<Option<String>> {
        self.header("Referer")
    }
}

/// Read-only view of the response being produced.
pub trait HttpResponse: Send + Sync {
    fn status_code(&self) -> u16;

    fn headers(&self) -> ContextResult<NameValues>;

    /// Output stream, if it can be read back.
    fn output_stream(&self) -> ContextResult<Option<SharedStream>> {
        Ok(None)
    }
}

/// First non-empty value of the client IP chain, falling back to the
/// remote address. Only the first entry of `X-Forwarded-For` is used.
pub fn calling_ip(request: &dyn HttpRequest) -> ContextResult<String> {
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    if let Some(ip) = non_empty(request.header(TRUE_CLIENT_IP)?) {
        return Ok(ip);
    }
    if let Some(chain) = non_empty(request.header(FORWARDED_FOR)?) {
        if let Some(first) = chain.split(',').next() {
            return Ok(first.trim().to_string());
        }
    }
    for name in [CLIENT_SIDE, CLUSTER_CLIENT_IP] {
        if let Some(ip) = non_empty(request.header(name)?) {
            return Ok(ip);
        }
    }
    Ok(request.remote_addr()?.unwrap_or_default())
}

/// A request/response pair, either half optional.
#[derive(Clone, Default)]
pub struct HttpContext {
    pub request: Option<Arc<dyn HttpRequest>>,
    pub response: Option<Arc<dyn HttpResponse>>,
}

impl HttpContext {
    pub fn new(request: Arc<dyn HttpRequest>, response: Arc<dyn HttpResponse>) -> Self {
        Self {
            request: Some(request),
            response: Some(response),
        }
    }

    pub fn from_request(request: Arc<dyn HttpRequest>) -> Self {
        Self {
            request: Some(request),
            response: None,
        }
    }
}

/// Source of the ambient ("current") HTTP context.
pub trait HttpContextProvider: Send + Sync {
    /// `Ok(None)` outside request handling; `Err` if the context exists but
    /// cannot be read.
    fn current(&self) -> ContextResult<Option<HttpContext>>;
}

/// Provider for processes that never handle requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHttpContext;

impl HttpContextProvider for NoHttpContext {
    fn current(&self) -> ContextResult<Option<HttpContext>> {
        Ok(None)
    }
}

tokio::task_local! {
    static CURRENT_HTTP_CONTEXT: HttpContext;
}

/// Run `fut` with `context` as the ambient HTTP context of the task.
pub async fn with_http_context<F: Future>(context: HttpContext, fut: F) -> F::Output {
    CURRENT_HTTP_CONTEXT.scope(context, fut).await
}

/// Provider reading the context installed by [`with_http_context`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskLocalHttpContext;

impl HttpContextProvider for TaskLocalHttpContext {
    fn current(&self) -> ContextResult<Option<HttpContext>> {
        Ok(CURRENT_HTTP_CONTEXT.try_with(|ctx| ctx.clone()).ok())
    }
}

/// Owned request description for frameworks that can copy their request
/// up front, and for tests.
#[derive(Clone)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    pub headers: NameValues,
    pub form: NameValues,
    pub remote_addr: Option<String>,
    pub local_addr: Option<String>,
    pub body: Option<SharedStream>,
}

impl RequestSnapshot {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            form: Vec::new(),
            remote_addr: None,
            local_addr: None,
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn local_addr(mut self, addr: impl Into<String>) -> Self {
        self.local_addr = Some(addr.into());
        self
    }

    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Some(shared_stream(bytes));
        self
    }

    /// Share an existing stream so the caller can observe its position.
    pub fn body_stream(mut self, stream: SharedStream) -> Self {
        self.body = Some(stream);
        self
    }

    /// Everything after the scheme and authority.
    fn path_and_query(&self) -> &str {
        let after_scheme = self.url.find("://").map_or(0, |i| i + 3);
        match self.url[after_scheme..].find('/') {
            Some(i) => &self.url[after_scheme + i..],
            None => "/",
        }
    }
}

impl HttpRequest for RequestSnapshot {
    fn url(&self) -> ContextResult<String> {
        Ok(self.url.clone())
    }

    fn method(&self) -> ContextResult<String> {
        Ok(self.method.clone())
    }

    fn headers(&self) -> ContextResult<NameValues> {
        Ok(self.headers.clone())
    }

    fn raw_url(&self) -> ContextResult<String> {
        Ok(self.path_and_query().to_string())
    }

    fn query_string(&self) -> ContextResult<String> {
        Ok(self
            .url
            .split_once('?')
            .map(|(_, q)| q.split('#').next().unwrap_or_default().to_string())
            .unwrap_or_default())
    }

    fn remote_addr(&self) -> ContextResult<Option<String>> {
        Ok(self.remote_addr.clone())
    }

    fn local_addr(&self) -> ContextResult<Option<String>> {
        Ok(self.local_addr.clone())
    }

    fn form(&self) -> ContextResult<NameValues> {
        Ok(self.form.clone())
    }

    fn body(&self) -> ContextResult<Option<SharedStream>> {
        Ok(self.body.clone())
    }
}

/// Owned response description.
#[derive(Clone)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    pub headers: NameValues,
    pub output: Option<SharedStream>,
}

impl ResponseSnapshot {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            output: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.output = Some(shared_stream(bytes));
        self
    }
}

impl HttpResponse for ResponseSnapshot {
    fn status_code(&self) -> u16 {
        self.status_code
    }

    fn headers(&self) -> ContextResult<NameValues> {
        Ok(self.headers.clone())
    }

    fn output_stream(&self) -> ContextResult<Option<SharedStream>> {
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_restores_stream_position() {
        let stream = shared_stream("name=bob&password=x");
        {
            let mut guard = stream.lock().unwrap();
            guard.seek(SeekFrom::Start(5)).unwrap();
        }
        assert_eq!(peek_stream(&stream).unwrap(), "name=bob&password=x");

        let mut rest = String::new();
        stream.lock().unwrap().read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "bob&password=x");
    }

    #[test]
    fn peek_fails_fast_on_a_locked_stream() {
        let stream = shared_stream("abc");
        let _held = stream.lock().unwrap();
        assert_eq!(peek_stream(&stream).unwrap_err().to_string(), "body stream busy");
    }

    #[test]
    fn renders_query_strings() {
        let pairs = vec![
            ("Accept".to_string(), "text/html".to_string()),
            ("X-Id".to_string(), "a b".to_string()),
        ];
        assert_eq!(to_query(&pairs), "Accept=text%2Fhtml&X-Id=a%20b");
        assert_eq!(to_query(&[]), "");
    }

    #[test]
    fn calling_ip_follows_header_precedence() {
        let base = RequestSnapshot::new("GET", "http://h/").remote_addr("10.0.0.9");
        assert_eq!(calling_ip(&base).unwrap(), "10.0.0.9");

        let cluster = base.clone().header("X-Cluster-Client-IP", "10.0.0.4");
        assert_eq!(calling_ip(&cluster).unwrap(), "10.0.0.4");

        let forwarded = cluster.clone().header("x-forwarded-for", " 1.2.3.4 , 5.6.7.8");
        assert_eq!(calling_ip(&forwarded).unwrap(), "1.2.3.4");

        let trusted = forwarded.header("True-Client-IP", "9.9.9.9");
        assert_eq!(calling_ip(&trusted).unwrap(), "9.9.9.9");

        let blank = RequestSnapshot::new("GET", "http://h/").header("True-Client-IP", "  ");
        assert_eq!(calling_ip(&blank).unwrap(), "");
    }

    #[test]
    fn snapshot_derives_raw_url_and_query() {
        let req = RequestSnapshot::new("GET", "https://example.com:8080/orders/1?x=1&y=2#top");
        assert_eq!(req.raw_url().unwrap(), "/orders/1?x=1&y=2#top");
        assert_eq!(req.query_string().unwrap(), "x=1&y=2");
        assert_eq!(RequestSnapshot::new("GET", "http://h").raw_url().unwrap(), "/");
    }

    #[tokio::test]
    async fn task_local_provider_sees_scoped_context() {
        let provider = TaskLocalHttpContext;
        assert!(provider.current().unwrap().is_none());

        let ctx = HttpContext::from_request(Arc::new(RequestSnapshot::new("PUT", "http://h/a")));
        let method = with_http_context(ctx, async move {
            let current = provider.current().unwrap().unwrap();
            current.request.unwrap().method().unwrap()
        })
        .await;
        assert_eq!(method, "PUT");
    }
}
