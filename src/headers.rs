//! CORS specific request headers and header names

use std::convert::Infallible;
use std::fmt;
use std::ops::Deref;

use rocket::http::{Method, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest};
use unicase::UniCase;

/// `Origin` request header
pub const ORIGIN: &str = "Origin";
/// `Access-Control-Request-Headers` request header
pub const ACCESS_CONTROL_REQUEST_HEADERS: &str = "Access-Control-Request-Headers";
/// `Access-Control-Allow-Origin` response header
pub const ACCESS_CONTROL_ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
/// `Access-Control-Allow-Credentials` response header
pub const ACCESS_CONTROL_ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
/// `Access-Control-Allow-Methods` response header
pub const ACCESS_CONTROL_ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
/// `Access-Control-Allow-Headers` response header
pub const ACCESS_CONTROL_ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
/// `Access-Control-Max-Age` response header
pub const ACCESS_CONTROL_MAX_AGE: &str = "Access-Control-Max-Age";
/// `Access-Control-Expose-Headers` response header
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
/// `Vary` response header
pub const VARY: &str = "Vary";

/// An empty header value counts as an absent header
fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(ToString::to_string)
}

/// The `Origin` request header, kept verbatim.
///
/// Origins are compared as case-sensitive strings, so no URL parsing or normalization happens
/// here. An empty `Origin` header is treated the same as a missing one.
///
/// You can use this as a rocket [Request Guard](https://rocket.rs/guide/requests/#request-guards).
/// Requests without an origin are forwarded.
#[derive(Eq, PartialEq, Clone, Hash, Debug)]
pub struct Origin(pub String);

impl Origin {
    /// Derives an instance of `Self` from the incoming request metadata.
    ///
    /// `Forward` is returned when the request does not assert an origin.
    pub fn from_request_sync(request: &'_ rocket::Request<'_>) -> request::Outcome<Self, Infallible> {
        match non_empty(request.headers().get_one(ORIGIN)) {
            Some(origin) => Outcome::Success(Origin(origin)),
            None => Outcome::Forward(Status::NotFound),
        }
    }
}

impl Deref for Origin {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Origin {
    type Error = Infallible;

    async fn from_request(request: &'r rocket::Request<'_>) -> request::Outcome<Self, Infallible> {
        Origin::from_request_sync(request)
    }
}

/// The `Access-Control-Request-Headers` request header, kept verbatim so that it can be
/// reflected back in `Access-Control-Allow-Headers`.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct AccessControlRequestHeaders(pub String);

impl AccessControlRequestHeaders {
    /// Derives an instance of `Self` from the incoming request metadata.
    ///
    /// `Forward` is returned when the header is missing or empty.
    pub fn from_request_sync(request: &'_ rocket::Request<'_>) -> request::Outcome<Self, Infallible> {
        match non_empty(request.headers().get_one(ACCESS_CONTROL_REQUEST_HEADERS)) {
            Some(headers) => Outcome::Success(AccessControlRequestHeaders(headers)),
            None => Outcome::Forward(Status::NotFound),
        }
    }

    /// Individual header field names, trimmed. Case is preserved.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.split(',').map(str::trim).filter(|name| !name.is_empty())
    }
}

impl Deref for AccessControlRequestHeaders {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AccessControlRequestHeaders {
    type Error = Infallible;

    async fn from_request(request: &'r rocket::Request<'_>) -> request::Outcome<Self, Infallible> {
        AccessControlRequestHeaders::from_request_sync(request)
    }
}

/// The parts of a request the header composer looks at.
///
/// Build one from a Rocket request with [`RequestView::from_request`], or by hand when driving
/// [`compose`](crate::compose) from another framework.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestView {
    /// Request method
    pub method: Method,
    /// `Origin` header, `None` when absent or empty
    pub origin: Option<String>,
    /// `Access-Control-Request-Headers` header, `None` when absent or empty
    pub request_headers: Option<String>,
}

impl RequestView {
    /// A view of a request with no CORS headers
    pub fn new(method: Method) -> Self {
        Self {
            method,
            origin: None,
            request_headers: None,
        }
    }

    /// Consumes the view and returns it with the `Origin` header set
    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = non_empty(Some(origin));
        self
    }

    /// Consumes the view and returns it with `Access-Control-Request-Headers` set
    pub fn request_headers(mut self, headers: &str) -> Self {
        self.request_headers = non_empty(Some(headers));
        self
    }

    /// Extract the view from a Rocket request
    pub fn from_request(request: &rocket::Request<'_>) -> Self {
        let origin = match Origin::from_request_sync(request) {
            Outcome::Success(Origin(origin)) => Some(origin),
            _ => None,
        };
        let request_headers = match AccessControlRequestHeaders::from_request_sync(request) {
            Outcome::Success(AccessControlRequestHeaders(headers)) => Some(headers),
            _ => None,
        };

        Self {
            method: request.method(),
            origin,
            request_headers,
        }
    }

    /// Whether this is a preflight (`OPTIONS`) request
    pub fn is_preflight(&self) -> bool {
        self.method == Method::Options
    }
}

/// Add `Origin` to the existing `Vary` header values.
///
/// Existing values are joined with `", "`. `Origin` is not appended again when some field is
/// already a case-insensitive match for it, and `Vary: *` is left alone.
pub fn merge_vary<'a, I>(existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let values: Vec<&str> = existing
        .into_iter()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();
    let current = values.join(", ");

    let origin = UniCase::new(ORIGIN);
    let covered = current
        .split(',')
        .map(str::trim)
        .any(|field| field == "*" || UniCase::new(field) == origin);

    if covered {
        current
    } else if current.is_empty() {
        ORIGIN.to_string()
    } else {
        format!("{}, {}", current, ORIGIN)
    }
}
