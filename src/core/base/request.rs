use std::fmt;
use std::time::Duration;

pub const RETRY_AFTER_HEADER: &str = "Retry-After";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Default for Method {
    fn default() -> Method {
        Method::Get
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        };
        write!(f, "{}", name)
    }
}

impl Method {
    /// Whether this verb is safe to retry by default.
    /// `Request::with_idempotent` overrides this for individual requests.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Method::Post | Method::Patch)
    }
}

/// An outbound request. Immutable once dispatched; the dispatcher never
/// mutates it across attempts.
#[derive(Debug, Clone)]
pub struct Request {
    endpoint: String,
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    deadline: Option<Duration>,
    idempotent: bool,
}

impl Request {
    pub fn new<S: Into<String>, U: Into<String>>(endpoint: S, method: Method, url: U) -> Self {
        Request {
            endpoint: endpoint.into(),
            idempotent: method.is_idempotent(),
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            deadline: None,
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Overall deadline across all attempts, overriding the endpoint default.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Marks whether retrying this request is safe.
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

/// The response of one attempt.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Elapsed time of the attempt that produced this response.
    pub elapsed: Duration,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Response {
            status,
            ..Default::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The remote `Retry-After` hint, when present as integer seconds.
    /// The HTTP-date form is not supported and yields `None`.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header(RETRY_AFTER_HEADER)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}
