//! Cross-origin resource sharing (CORS) header composition for [Rocket](https://rocket.rs/)
//! applications
//!
//! This crate decides, per request, which CORS response headers to send and whether a preflight
//! `OPTIONS` request is answered right away. It never blocks a request by itself: browsers
//! enforce CORS based on the headers they receive.
//!
//! ## Requirements
//!
//! - Rocket >= 0.5
//!
//! ## Features
//!
//! By default, a `serialization` feature is enabled in this crate that allows you to
//! (de)serialize the [`CorsOptions`] struct and to read it from Rocket's configuration. If you
//! would like to disable this, change your `Cargo.toml` to:
//!
//! ```toml
//! rocket_cors_compose = { version = "0.1.0", default-features = false }
//! ```
//!
//! ## Usage
//!
//! Create a [`CorsOptions`] struct with the settings you need. Every field is optional and
//! defaults to the values documented on [`CorsConfig`]. Turn it into a [`Cors`] fairing and
//! attach it to Rocket.
//!
//! ```rust,no_run
//! use rocket::{get, routes};
//! use rocket_cors_compose::{CorsOptions, HeaderList, OriginPolicy};
//!
//! #[get("/")]
//! fn hello() -> &'static str {
//!     "Hello CORS"
//! }
//!
//! #[rocket::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cors = CorsOptions {
//!         origin: Some(OriginPolicy::some_exact(&["https://www.acme.com"])?),
//!         methods: Some(HeaderList::some(&["GET", "POST"])),
//!         credentials: Some(true),
//!         ..Default::default()
//!     }
//!     .to_cors()?;
//!
//!     let _ = rocket::build()
//!         .mount("/", routes![hello])
//!         .attach(cors)
//!         .launch()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Origin policies
//!
//! [`OriginPolicy`] decides which origins are answered with `Access-Control-Allow-Origin`:
//!
//! |           Policy           |       Request origin `O` allowed       | `Vary: Origin` |
//! |:--------------------------:|:--------------------------------------:|:--------------:|
//! |         `Disabled`         |   never; no CORS headers at all         |       ✗        |
//! |           `Any`            |           always, with `*`              |       ✗        |
//! |         `Reflect`          |           always, with `O`              |       ✔        |
//! | `Exact`, `Pattern`, `List` |   when `O` matches, with `O`            |       ✔        |
//! |         `Dynamic`          | as the [`OriginDelegate`] decides      |   depends      |
//!
//! A request without an `Origin` header is treated as allowed and answered with `*`.
//!
//! ### Preflights
//!
//! `OPTIONS` requests get `Access-Control-Allow-Methods`, `Access-Control-Allow-Headers` and
//! `Access-Control-Max-Age` in addition to the headers of every other request. Unless
//! `preflight_continue` is set, the fairing answers them itself with `options_success_status`
//! (`204` by default) and an empty body; your `OPTIONS` routes never run. With
//! `preflight_continue`, the request is routed as usual and the headers are added to whatever
//! your route responds with.
//!
//! ### Configuration per request
//!
//! Configuration may also come from a [`ConfigDelegate`], awaited once per request, for example
//! to give some routes different settings:
//!
//! ```rust,no_run
//! use rocket::Request;
//! use rocket_cors_compose::{BoxError, ConfigDelegate, Cors, CorsOptions, OriginPolicy};
//!
//! struct ByPath;
//!
//! #[rocket::async_trait]
//! impl ConfigDelegate for ByPath {
//!     async fn options(&self, request: &Request<'_>) -> Result<CorsOptions, BoxError> {
//!         let origin = if request.uri().path().as_str().starts_with("/public") {
//!             OriginPolicy::any()
//!         } else {
//!             OriginPolicy::exact("https://admin.acme.com")
//!         };
//!
//!         Ok(CorsOptions {
//!             origin: Some(origin),
//!             ..Default::default()
//!         })
//!     }
//! }
//!
//! let cors = Cors::from_delegate(ByPath);
//! let _ = rocket::build().attach(cors);
//! ```
//!
//! If a delegate fails, no CORS header is sent and the request is failed with a `500` so that
//! your catchers format the error.
//!
//! ### Other frameworks
//!
//! [`compose`] is a pure function of a [`CorsConfig`], an evaluated [`OriginPolicy`] and a
//! [`headers::RequestView`]. It can be driven from any HTTP stack; only the fairing is Rocket
//! specific.

#![deny(
    missing_docs,
    non_camel_case_types,
    non_shorthand_field_patterns,
    non_upper_case_globals,
    overflowing_literals,
    path_statements,
    trivial_casts,
    trivial_numeric_casts,
    unconditional_recursion,
    unreachable_code,
    unused_allocation,
    unused_assignments,
    unused_attributes,
    unused_comparisons,
    unused_extern_crates,
    unused_imports,
    unused_import_braces,
    unused_must_use,
    unused_mut,
    unused_parens,
    unused_results,
    unused_variables,
    while_true
)]
#![doc(test(attr(allow(unused_variables))))]

#[cfg(test)]
#[macro_use]
mod test_macros;

mod compose;
mod config;
mod fairing;
mod origin;

pub mod headers;

use std::error;
use std::fmt;
use std::sync::Arc;

use log::debug;
use rocket::http::Status;
use rocket::Request;

pub use crate::compose::{compose, CorsHeaders, CorsOutcome, Disposition};
pub use crate::config::{ConfigDelegate, ConfigSource, CorsConfig, CorsOptions, HeaderList};
pub use crate::origin::{OriginDecision, OriginDelegate, OriginMatcher, OriginPolicy};

use crate::headers::RequestView;

/// Errors returned by delegates
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// Errors during operations
///
/// Runtime errors come from the delegates and abort CORS processing for a single request. The
/// other variants are configuration errors reported when the configuration is built.
#[derive(Debug)]
pub enum Error {
    /// A configured origin could not be parsed as a URL
    BadOrigin(url::ParseError),
    /// A configured origin pattern is not a valid regular expression
    BadPattern(regex::Error),
    /// The configured preflight success status is not an HTTP status code
    InvalidStatus(u16),
    /// The configuration delegate reported an error
    ConfigDelegate(BoxError),
    /// The origin delegate reported an error
    OriginDelegate(BoxError),
    /// The origin delegate overrode the policy with another dynamic policy
    NestedOriginDelegate,
}

impl Error {
    /// The status a request failing with this error is answered with.
    ///
    /// None of these errors is the client's fault, so this is always `500`.
    pub fn status(&self) -> Status {
        Status::InternalServerError
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::BadOrigin(ref e) => Some(e),
            Error::BadPattern(ref e) => Some(e),
            Error::ConfigDelegate(ref e) | Error::OriginDelegate(ref e) => Some(&**e),
            Error::InvalidStatus(_) | Error::NestedOriginDelegate => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::BadOrigin(ref e) => write!(f, "Invalid origin in CORS configuration: {}", e),
            Error::BadPattern(ref e) => write!(f, "Invalid origin pattern: {}", e),
            Error::InvalidStatus(code) => {
                write!(f, "{} is not a valid preflight success status", code)
            }
            Error::ConfigDelegate(ref e) => write!(f, "CORS configuration delegate failed: {}", e),
            Error::OriginDelegate(ref e) => write!(f, "CORS origin delegate failed: {}", e),
            Error::NestedOriginDelegate => write!(
                f,
                "An origin delegate cannot override the policy with another dynamic policy"
            ),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::BadOrigin(error)
    }
}

impl From<regex::Error> for Error {
    fn from(error: regex::Error) -> Self {
        Error::BadPattern(error)
    }
}

/// The CORS [Fairing](https://rocket.rs/guide/fairings/).
///
/// Build it from [`CorsOptions::to_cors`], [`Cors::new`] or [`Cors::from_delegate`] and attach
/// it to Rocket. See the documentation at the [crate root](index.html) for usage information.
///
/// The fairing mounts one route, `<fairing_route_base>/<status>` (`/cors/<status>` by default),
/// which answers preflights and failed requests after they are rerouted to it. Pick a base that
/// does not clash with your own routes.
#[derive(Clone, Debug)]
pub struct Cors {
    source: ConfigSource,
    fairing_route_base: String,
    fairing_route_rank: isize,
}

impl Cors {
    /// A fairing using the same configuration for every request
    pub fn new(config: CorsConfig) -> Self {
        Self::with_source(ConfigSource::Static(Arc::new(config)))
    }

    /// A fairing asking `delegate` for the configuration of every request
    pub fn from_delegate<D: ConfigDelegate>(delegate: D) -> Self {
        Self::with_source(ConfigSource::Delegate(Arc::new(delegate)))
    }

    fn with_source(source: ConfigSource) -> Self {
        Self {
            source,
            fairing_route_base: "/cors".to_string(),
            fairing_route_rank: 0,
        }
    }

    /// Consumes the fairing and returns it with the base of its route changed
    pub fn fairing_route_base(mut self, base: &str) -> Self {
        self.fairing_route_base = base.to_string();
        self
    }

    /// Consumes the fairing and returns it with the rank of its route changed
    pub fn fairing_route_rank(mut self, rank: isize) -> Self {
        self.fairing_route_rank = rank;
        self
    }

    /// Where the configuration comes from
    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Resolve the configuration, evaluate the origin policy and compose the CORS headers for
    /// `request`.
    ///
    /// On error, nothing about the request should be changed except failing it.
    pub async fn process(&self, request: &Request<'_>) -> Result<CorsOutcome, Error> {
        let config = self.source.resolve(request).await?;
        let view = RequestView::from_request(request);
        let policy = config.origin.evaluate(view.origin.as_deref()).await?;

        let outcome = compose(&config, &policy, &view);
        debug!(
            "CORS for {} {} from {:?}: {:?}",
            request.method(),
            request.uri(),
            view.origin,
            outcome
        );
        Ok(outcome)
    }
}
