//! Origin policies and the origin matcher

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use log::debug;
use regex::Regex;

use crate::{BoxError, Error};

/// A single entry of an [`OriginPolicy::List`]
#[derive(Clone, Debug)]
pub enum OriginMatcher {
    /// Case-sensitive exact match
    Exact(String),
    /// Regular expression match
    Pattern(Regex),
}

impl OriginMatcher {
    /// Whether `origin` is acceptable to this matcher
    pub fn matches(&self, origin: &str) -> bool {
        match *self {
            OriginMatcher::Exact(ref exact) => exact == origin,
            OriginMatcher::Pattern(ref regex) => regex.is_match(origin),
        }
    }
}

impl PartialEq for OriginMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OriginMatcher::Exact(a), OriginMatcher::Exact(b)) => a == b,
            (OriginMatcher::Pattern(a), OriginMatcher::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl<'a> From<&'a str> for OriginMatcher {
    fn from(origin: &'a str) -> Self {
        OriginMatcher::Exact(origin.to_string())
    }
}

impl From<String> for OriginMatcher {
    fn from(origin: String) -> Self {
        OriginMatcher::Exact(origin)
    }
}

impl From<Regex> for OriginMatcher {
    fn from(regex: Regex) -> Self {
        OriginMatcher::Pattern(regex)
    }
}

/// What an [`OriginDelegate`] decided for a request
#[derive(Clone, Debug, PartialEq)]
pub enum OriginDecision {
    /// Allow the origin. Equivalent to [`OriginPolicy::Reflect`].
    Allow,
    /// Deny the origin. Equivalent to [`OriginPolicy::Disabled`].
    Deny,
    /// Use this policy instead of the configured one
    Override(OriginPolicy),
}

impl From<bool> for OriginDecision {
    fn from(allow: bool) -> Self {
        if allow {
            OriginDecision::Allow
        } else {
            OriginDecision::Deny
        }
    }
}

/// Decides per request whether an origin is allowed.
///
/// The delegate receives the request's `Origin` header, or `None` when the request did not
/// assert one. It is awaited at most once per request.
///
/// Async closures taking an `Option<String>` implement this trait:
///
/// ```rust
/// use rocket_cors_compose::{BoxError, OriginDecision, OriginPolicy};
///
/// let policy = OriginPolicy::dynamic(|origin: Option<String>| async move {
///     let allowed = origin.map_or(false, |o| o.ends_with(".acme.com"));
///     Ok::<_, BoxError>(OriginDecision::from(allowed))
/// });
/// assert!(policy.is_dynamic());
/// ```
#[rocket::async_trait]
pub trait OriginDelegate: Send + Sync + 'static {
    /// Decide on the request origin
    async fn decide(&self, origin: Option<&str>) -> Result<OriginDecision, BoxError>;
}

#[rocket::async_trait]
impl<F, Fut> OriginDelegate for F
where
    F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OriginDecision, BoxError>> + Send + 'static,
{
    async fn decide(&self, origin: Option<&str>) -> Result<OriginDecision, BoxError> {
        (self)(origin.map(ToString::to_string)).await
    }
}

/// The rule determining which origins are acceptable.
///
/// `Default` is implemented for this enum and is `Any`.
///
/// When the `serialization` feature is enabled, policies are (de)serialized as
///
/// - `false` for `Disabled` and `true` for `Reflect`
/// - `"*"` for `Any`
/// - any other string for `Exact`
/// - `{"pattern": "^https://(.+)\\.acme\\.com$"}` for `Pattern`
/// - a list of strings and patterns for `List`
///
/// `Dynamic` cannot be serialized.
#[derive(Clone)]
pub enum OriginPolicy {
    /// No CORS headers at all; requests pass straight through
    Disabled,
    /// Any origin, answered with the wildcard `*`
    Any,
    /// Any origin, answered with the request's own origin
    Reflect,
    /// Exactly this origin
    Exact(String),
    /// Origins matching this regular expression
    Pattern(Regex),
    /// Origins accepted by at least one of the matchers
    List(Vec<OriginMatcher>),
    /// Ask a delegate on every request
    Dynamic(Arc<dyn OriginDelegate>),
}

impl Default for OriginPolicy {
    fn default() -> Self {
        OriginPolicy::Any
    }
}

impl fmt::Debug for OriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            OriginPolicy::Disabled => f.write_str("Disabled"),
            OriginPolicy::Any => f.write_str("Any"),
            OriginPolicy::Reflect => f.write_str("Reflect"),
            OriginPolicy::Exact(ref exact) => f.debug_tuple("Exact").field(exact).finish(),
            OriginPolicy::Pattern(ref regex) => f.debug_tuple("Pattern").field(regex).finish(),
            OriginPolicy::List(ref list) => f.debug_tuple("List").field(list).finish(),
            OriginPolicy::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl PartialEq for OriginPolicy {
    fn eq(&self, other: &Self) -> bool {
        use OriginPolicy::*;

        match (self, other) {
            (Disabled, Disabled) | (Any, Any) | (Reflect, Reflect) => true,
            (Exact(a), Exact(b)) => a == b,
            (Pattern(a), Pattern(b)) => a.as_str() == b.as_str(),
            (List(a), List(b)) => a == b,
            (Dynamic(a), Dynamic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl OriginPolicy {
    /// Allow any origin with the wildcard `*`
    pub fn any() -> Self {
        OriginPolicy::Any
    }

    /// Allow any origin by echoing it back
    pub fn reflect() -> Self {
        OriginPolicy::Reflect
    }

    /// Allow exactly one origin, compared verbatim
    pub fn exact(origin: &str) -> Self {
        OriginPolicy::Exact(origin.to_string())
    }

    /// Allow origins matching a regular expression
    pub fn pattern(regex: &str) -> Result<Self, Error> {
        Ok(OriginPolicy::Pattern(Regex::new(regex)?))
    }

    /// Allow a list of exact origins, normalized to their ASCII serialization first.
    ///
    /// Browsers send origins as `scheme://host[:port]`, so `"https://www.acme.com/"` in
    /// configuration is stored as `"https://www.acme.com"`. Opaque origins are kept as given.
    pub fn some_exact(origins: &[&str]) -> Result<Self, Error> {
        let matchers = origins
            .iter()
            .map(|origin| to_ascii_origin(origin).map(OriginMatcher::Exact))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(OriginPolicy::List(matchers))
    }

    /// Allow origins accepted by any of the matchers
    pub fn list<I, M>(matchers: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<OriginMatcher>,
    {
        OriginPolicy::List(matchers.into_iter().map(Into::into).collect())
    }

    /// Decide per request with a delegate
    pub fn dynamic<D: OriginDelegate>(delegate: D) -> Self {
        OriginPolicy::Dynamic(Arc::new(delegate))
    }

    /// Returns whether this is the `Any` variant
    pub fn is_any(&self) -> bool {
        matches!(*self, OriginPolicy::Any)
    }

    /// Returns whether this is the `Dynamic` variant
    pub fn is_dynamic(&self) -> bool {
        matches!(*self, OriginPolicy::Dynamic(_))
    }

    /// Whether `origin` is acceptable under this policy.
    ///
    /// `Disabled`, `Any` and `Dynamic` are resolved by the caller before matching and never
    /// match here.
    pub fn matches(&self, origin: &str) -> bool {
        match *self {
            OriginPolicy::Reflect => true,
            OriginPolicy::Exact(ref exact) => exact == origin,
            OriginPolicy::Pattern(ref regex) => regex.is_match(origin),
            OriginPolicy::List(ref matchers) => matchers.iter().any(|m| m.matches(origin)),
            OriginPolicy::Disabled | OriginPolicy::Any | OriginPolicy::Dynamic(_) => false,
        }
    }

    /// Resolve a `Dynamic` policy into the policy its delegate decided on for this origin.
    ///
    /// Every other policy is returned as is.
    pub async fn evaluate(&self, origin: Option<&str>) -> Result<Cow<'_, OriginPolicy>, Error> {
        let delegate = match *self {
            OriginPolicy::Dynamic(ref delegate) => delegate,
            _ => return Ok(Cow::Borrowed(self)),
        };

        let decision = delegate
            .decide(origin)
            .await
            .map_err(Error::OriginDelegate)?;
        debug!("Origin delegate decided {:?} for origin {:?}", decision, origin);

        match decision {
            OriginDecision::Allow => Ok(Cow::Owned(OriginPolicy::Reflect)),
            OriginDecision::Deny => Ok(Cow::Owned(OriginPolicy::Disabled)),
            OriginDecision::Override(OriginPolicy::Dynamic(_)) => Err(Error::NestedOriginDelegate),
            OriginDecision::Override(policy) => Ok(Cow::Owned(policy)),
        }
    }
}

/// Parse a URL and return the ASCII serialization of its origin
fn to_ascii_origin(input: &str) -> Result<String, Error> {
    let url = url::Url::parse(input)?;
    match url.origin() {
        url::Origin::Opaque(_) => Ok(input.to_string()),
        tuple @ url::Origin::Tuple(..) => Ok(tuple.ascii_serialization()),
    }
}

#[cfg(feature = "serialization")]
mod origin_serde {
    use regex::Regex;
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

    use super::{OriginMatcher, OriginPolicy};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum MatcherRepr {
        Exact(String),
        Pattern { pattern: String },
    }

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum PolicyRepr {
        Flag(bool),
        Text(String),
        // before `Pattern`, which would also accept a one element sequence
        List(Vec<MatcherRepr>),
        Pattern { pattern: String },
    }

    impl<'a> From<&'a OriginMatcher> for MatcherRepr {
        fn from(matcher: &'a OriginMatcher) -> Self {
            match *matcher {
                OriginMatcher::Exact(ref exact) => MatcherRepr::Exact(exact.clone()),
                OriginMatcher::Pattern(ref regex) => MatcherRepr::Pattern {
                    pattern: regex.as_str().to_string(),
                },
            }
        }
    }

    fn compile<E: de::Error>(pattern: &str) -> Result<Regex, E> {
        Regex::new(pattern).map_err(|e| E::custom(format!("invalid origin pattern: {}", e)))
    }

    impl MatcherRepr {
        fn into_matcher<E: de::Error>(self) -> Result<OriginMatcher, E> {
            match self {
                MatcherRepr::Exact(exact) => Ok(OriginMatcher::Exact(exact)),
                MatcherRepr::Pattern { pattern } => compile(&pattern).map(OriginMatcher::Pattern),
            }
        }
    }

    impl Serialize for OriginMatcher {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            MatcherRepr::from(self).serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for OriginMatcher {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            MatcherRepr::deserialize(deserializer)?.into_matcher()
        }
    }

    impl Serialize for OriginPolicy {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let repr = match *self {
                OriginPolicy::Disabled => PolicyRepr::Flag(false),
                OriginPolicy::Reflect => PolicyRepr::Flag(true),
                OriginPolicy::Any => PolicyRepr::Text("*".to_string()),
                OriginPolicy::Exact(ref exact) => PolicyRepr::Text(exact.clone()),
                OriginPolicy::Pattern(ref regex) => PolicyRepr::Pattern {
                    pattern: regex.as_str().to_string(),
                },
                OriginPolicy::List(ref matchers) => {
                    PolicyRepr::List(matchers.iter().map(MatcherRepr::from).collect())
                }
                OriginPolicy::Dynamic(_) => {
                    return Err(ser::Error::custom(
                        "a dynamic origin policy cannot be serialized",
                    ))
                }
            };
            repr.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for OriginPolicy {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            Ok(match PolicyRepr::deserialize(deserializer)? {
                PolicyRepr::Flag(false) => OriginPolicy::Disabled,
                PolicyRepr::Flag(true) => OriginPolicy::Reflect,
                PolicyRepr::Text(ref text) if text == "*" => OriginPolicy::Any,
                PolicyRepr::Text(exact) => OriginPolicy::Exact(exact),
                PolicyRepr::Pattern { pattern } => OriginPolicy::Pattern(compile(&pattern)?),
                PolicyRepr::List(items) => OriginPolicy::List(
                    items
                        .into_iter()
                        .map(MatcherRepr::into_matcher)
                        .collect::<Result<_, _>>()?,
                ),
            })
        }
    }
}
