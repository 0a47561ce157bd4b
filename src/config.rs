//! CORS configuration and its resolution per request

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use rocket::http::Method;
use rocket::Request;
#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use crate::origin::OriginPolicy;
use crate::{BoxError, Error};

/// A list of header field names or methods, either as one verbatim string or as an ordered list.
///
/// The string form is emitted as given. The list form is joined with `","` in the given order,
/// without sorting or de-duplication.
///
/// This enum is (de)serialized as either a string or a list of strings.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialization", serde(untagged))]
pub enum HeaderList {
    /// Emitted verbatim
    Raw(String),
    /// Joined with `","`
    List(Vec<String>),
}

impl HeaderList {
    /// A list from string slices
    pub fn some(items: &[&str]) -> Self {
        HeaderList::List(items.iter().map(ToString::to_string).collect())
    }

    /// A list of methods
    pub fn methods(methods: &[Method]) -> Self {
        HeaderList::List(methods.iter().map(|m| m.as_str().to_string()).collect())
    }

    /// The header value, or `None` when there is nothing to emit
    pub fn to_header_value(&self) -> Option<String> {
        let value = match *self {
            HeaderList::Raw(ref raw) => raw.clone(),
            HeaderList::List(ref list) => list.join(","),
        };

        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

impl<'a> From<&'a str> for HeaderList {
    fn from(raw: &'a str) -> Self {
        HeaderList::Raw(raw.to_string())
    }
}

impl From<Vec<String>> for HeaderList {
    fn from(list: Vec<String>) -> Self {
        HeaderList::List(list)
    }
}

/// User supplied CORS settings.
///
/// Every field is optional. Supplied fields win over the defaults of [`CorsConfig`], absent
/// fields keep them; see [`CorsOptions::resolve`].
///
/// With the `serialization` feature this struct can be deserialized from JSON, TOML or anything
/// else serde supports, and extracted from Rocket's configuration with
/// [`CorsOptions::from_figment`]. An empty document yields all defaults.
///
/// ```json
/// {
///   "origin": ["https://www.acme.com", {"pattern": "^https://(.+)\\.acme\\.com$"}],
///   "methods": ["GET", "POST"],
///   "allowed_headers": "Authorization,Accept",
///   "exposed_headers": ["Content-Type", "X-Custom"],
///   "credentials": true,
///   "max_age": 42,
///   "preflight_continue": false,
///   "options_success_status": 200
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialization", serde(default))]
pub struct CorsOptions {
    /// Which origins are allowed. Defaults to `Any`.
    #[cfg_attr(feature = "serialization", serde(skip_serializing_if = "Option::is_none"))]
    pub origin: Option<OriginPolicy>,
    /// `Access-Control-Allow-Methods` for preflights.
    /// Defaults to `GET,HEAD,PUT,PATCH,POST,DELETE`.
    #[cfg_attr(feature = "serialization", serde(skip_serializing_if = "Option::is_none"))]
    pub methods: Option<HeaderList>,
    /// `Access-Control-Allow-Headers` for preflights. When unset, the request's
    /// `Access-Control-Request-Headers` is reflected.
    #[cfg_attr(feature = "serialization", serde(skip_serializing_if = "Option::is_none"))]
    pub allowed_headers: Option<HeaderList>,
    /// `Access-Control-Expose-Headers`. Unset by default.
    #[cfg_attr(feature = "serialization", serde(skip_serializing_if = "Option::is_none"))]
    pub exposed_headers: Option<HeaderList>,
    /// Emit `Access-Control-Allow-Credentials: true`. Defaults to `false`.
    #[cfg_attr(feature = "serialization", serde(skip_serializing_if = "Option::is_none"))]
    pub credentials: Option<bool>,
    /// `Access-Control-Max-Age` in seconds for preflights. Unset by default.
    #[cfg_attr(feature = "serialization", serde(skip_serializing_if = "Option::is_none"))]
    pub max_age: Option<u64>,
    /// Hand preflights to the next stage instead of answering them. Defaults to `false`.
    #[cfg_attr(feature = "serialization", serde(skip_serializing_if = "Option::is_none"))]
    pub preflight_continue: Option<bool>,
    /// Status of locally answered preflights. Defaults to `204`.
    #[cfg_attr(feature = "serialization", serde(skip_serializing_if = "Option::is_none"))]
    pub options_success_status: Option<u16>,
}

impl CorsOptions {
    /// Merge the supplied fields over [`CorsConfig::default`] and validate the result
    pub fn resolve(self) -> Result<CorsConfig, Error> {
        let defaults = CorsConfig::default();
        let config = CorsConfig {
            origin: self.origin.unwrap_or(defaults.origin),
            methods: self.methods.unwrap_or(defaults.methods),
            allowed_headers: self.allowed_headers.or(defaults.allowed_headers),
            exposed_headers: self.exposed_headers.or(defaults.exposed_headers),
            credentials: self.credentials.unwrap_or(defaults.credentials),
            max_age: self.max_age.or(defaults.max_age),
            preflight_continue: self.preflight_continue.unwrap_or(defaults.preflight_continue),
            options_success_status: self
                .options_success_status
                .unwrap_or(defaults.options_success_status),
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve these options into a [`Cors`](crate::Cors) fairing with a static configuration
    pub fn to_cors(self) -> Result<crate::Cors, Error> {
        Ok(crate::Cors::new(self.resolve()?))
    }

    /// Extract options from a Rocket [`Figment`](rocket::figment::Figment) under `key`.
    ///
    /// With `key = "cors"`, a `Rocket.toml` like the following is read:
    ///
    /// ```toml
    /// [default.cors]
    /// origin = ["https://www.acme.com"]
    /// credentials = true
    /// ```
    #[cfg(feature = "serialization")]
    pub fn from_figment(
        figment: &rocket::figment::Figment,
        key: &str,
    ) -> Result<Self, rocket::figment::Error> {
        figment.extract_inner(key)
    }
}

/// Effective CORS configuration for a request.
///
/// Immutable once resolved. `Default` yields the defaults every [`CorsOptions`] is merged over.
#[derive(Clone, Debug, PartialEq)]
pub struct CorsConfig {
    /// Which origins are allowed
    pub origin: OriginPolicy,
    /// `Access-Control-Allow-Methods`
    pub methods: HeaderList,
    /// `Access-Control-Allow-Headers`, `None` to reflect the request
    pub allowed_headers: Option<HeaderList>,
    /// `Access-Control-Expose-Headers`
    pub exposed_headers: Option<HeaderList>,
    /// Emit `Access-Control-Allow-Credentials: true`
    pub credentials: bool,
    /// `Access-Control-Max-Age` in seconds
    pub max_age: Option<u64>,
    /// Hand preflights to the next stage
    pub preflight_continue: bool,
    /// Status of locally answered preflights
    pub options_success_status: u16,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: OriginPolicy::Any,
            methods: Self::default_methods(),
            allowed_headers: None,
            exposed_headers: None,
            credentials: false,
            max_age: None,
            preflight_continue: false,
            options_success_status: 204,
        }
    }
}

impl CorsConfig {
    fn default_methods() -> HeaderList {
        HeaderList::methods(&[
            Method::Get,
            Method::Head,
            Method::Put,
            Method::Patch,
            Method::Post,
            Method::Delete,
        ])
    }

    /// Validates the settings that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), Error> {
        if !(100..=599).contains(&self.options_success_status) {
            return Err(Error::InvalidStatus(self.options_success_status));
        }
        Ok(())
    }

    /// Log settings that are legal but that browsers will not honour
    pub(crate) fn warn_on_misconfiguration(&self) {
        if self.credentials && self.origin.is_any() {
            warn!(
                "CORS credentials are allowed while the origin is `*`. \
                 Browsers reject credentialed responses with a wildcard origin."
            );
        }
    }
}

/// Supplies CORS options per request, for example after looking up the route or the tenant.
///
/// Awaited at most once per request. The returned options are merged over
/// [`CorsConfig::default`]. Returning an error aborts CORS processing for the request, which is
/// then failed with a `500`.
///
/// Plain closures `Fn(&Request<'_>) -> Result<CorsOptions, BoxError>` implement this trait.
#[rocket::async_trait]
pub trait ConfigDelegate: Send + Sync + 'static {
    /// Options for this request
    async fn options(&self, request: &Request<'_>) -> Result<CorsOptions, BoxError>;
}

#[rocket::async_trait]
impl<F> ConfigDelegate for F
where
    F: Fn(&Request<'_>) -> Result<CorsOptions, BoxError> + Send + Sync + 'static,
{
    async fn options(&self, request: &Request<'_>) -> Result<CorsOptions, BoxError> {
        (self)(request)
    }
}

/// Where the configuration for a request comes from
#[derive(Clone)]
pub enum ConfigSource {
    /// The same configuration for every request
    Static(Arc<CorsConfig>),
    /// Configuration computed per request, never cached across requests
    Delegate(Arc<dyn ConfigDelegate>),
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ConfigSource::Static(ref config) => f.debug_tuple("Static").field(config).finish(),
            ConfigSource::Delegate(_) => f.write_str("Delegate(..)"),
        }
    }
}

impl ConfigSource {
    /// The effective configuration for `request`
    pub async fn resolve(&self, request: &Request<'_>) -> Result<Cow<'_, CorsConfig>, Error> {
        match *self {
            ConfigSource::Static(ref config) => Ok(Cow::Borrowed(&**config)),
            ConfigSource::Delegate(ref delegate) => {
                let options = delegate
                    .options(request)
                    .await
                    .map_err(Error::ConfigDelegate)?;
                debug!("Configuration delegate supplied {:?}", options);
                Ok(Cow::Owned(options.resolve()?))
            }
        }
    }
}
