//! Header composition: the CORS headers for a request and what to do with the request

use std::io::Cursor;

use log::{debug, warn};
use rocket::http::Status;

use crate::config::{CorsConfig, HeaderList};
use crate::headers::{self, RequestView};
use crate::origin::OriginPolicy;

/// The CORS response headers for one request.
///
/// Each header is either set or not; nothing here is ever emitted with an empty or `false`
/// value. Apply it to a response with [`CorsHeaders::merge`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CorsHeaders {
    /// Add `Origin` to `Vary`
    pub vary_origin: bool,
    /// `Access-Control-Allow-Origin`
    pub allow_origin: Option<String>,
    /// `Access-Control-Allow-Credentials: true`
    pub allow_credentials: bool,
    /// `Access-Control-Allow-Methods`
    pub allow_methods: Option<String>,
    /// `Access-Control-Allow-Headers`
    pub allow_headers: Option<String>,
    /// `Access-Control-Max-Age`
    pub max_age: Option<u64>,
    /// `Access-Control-Expose-Headers`
    pub expose_headers: Option<String>,
}

impl CorsHeaders {
    /// Whether no header would be touched
    pub fn is_empty(&self) -> bool {
        *self == CorsHeaders::default()
    }

    /// The `Access-Control-*` headers in wire order. `Vary` is not included since it depends on
    /// the response it is merged into.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();

        if let Some(ref origin) = self.allow_origin {
            pairs.push((headers::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone()));
        }
        if self.allow_credentials {
            pairs.push((headers::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true".to_string()));
        }
        if let Some(ref methods) = self.allow_methods {
            pairs.push((headers::ACCESS_CONTROL_ALLOW_METHODS, methods.clone()));
        }
        if let Some(ref allowed) = self.allow_headers {
            pairs.push((headers::ACCESS_CONTROL_ALLOW_HEADERS, allowed.clone()));
        }
        if let Some(max_age) = self.max_age {
            pairs.push((headers::ACCESS_CONTROL_MAX_AGE, max_age.to_string()));
        }
        if let Some(ref exposed) = self.expose_headers {
            pairs.push((headers::ACCESS_CONTROL_EXPOSE_HEADERS, exposed.clone()));
        }

        pairs
    }

    /// Merge these headers into an existing `rocket::Response`.
    ///
    /// CORS headers already present are overwritten, other headers are kept. `Origin` is added
    /// to `Vary` when needed.
    pub fn merge(&self, response: &mut rocket::Response<'_>) {
        if self.vary_origin {
            let vary = headers::merge_vary(response.headers().get(headers::VARY));
            let _ = response.set_raw_header(headers::VARY, vary);
        }

        for (name, value) in self.to_pairs() {
            let _ = response.set_raw_header(name, value);
        }
    }
}

/// What happens to the request after the headers are composed
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// Hand the request to the next stage
    Continue,
    /// Answer the preflight right away with this status and an empty body
    Terminate(Status),
}

/// The result of composing CORS headers for a request
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CorsOutcome {
    /// Headers to apply to the response
    pub headers: CorsHeaders,
    /// Whether the request continues
    pub disposition: Disposition,
}

impl CorsOutcome {
    /// No CORS headers, the request continues untouched
    pub fn pass() -> Self {
        Self {
            headers: CorsHeaders::default(),
            disposition: Disposition::Continue,
        }
    }

    /// Whether the request is answered without running the next stage
    pub fn is_terminated(&self) -> bool {
        matches!(self.disposition, Disposition::Terminate(_))
    }

    /// Apply the outcome to a response: merge the headers and, for a terminated preflight, set
    /// the status and replace the body with an empty one.
    pub fn merge(&self, response: &mut rocket::Response<'_>) {
        self.headers.merge(response);

        if let Disposition::Terminate(status) = self.disposition {
            response.set_status(status);
            response.set_sized_body(Some(0usize), Cursor::new(""));
            let _ = response.set_raw_header("Content-Length", "0");
        }
    }
}

/// Compose the CORS headers for a request.
///
/// `policy` must already be evaluated, see [`OriginPolicy::evaluate`]. A request without an
/// origin is treated as allowed and answered with `*` unless the policy is `Disabled`.
///
/// This is pure: composing twice for the same inputs yields the same outcome.
pub fn compose(config: &CorsConfig, policy: &OriginPolicy, request: &RequestView) -> CorsOutcome {
    let origin = request.origin.as_deref();

    let allow_origin = match *policy {
        OriginPolicy::Disabled => {
            debug!("CORS disabled for origin {:?}", origin);
            return CorsOutcome::pass();
        }
        OriginPolicy::Dynamic(_) => {
            warn!("Unevaluated dynamic origin policy, skipping CORS headers");
            return CorsOutcome::pass();
        }
        OriginPolicy::Any => Some("*".to_string()),
        _ => match origin {
            None => Some("*".to_string()),
            Some(origin) if policy.matches(origin) => Some(origin.to_string()),
            Some(origin) => {
                debug!("Origin {} is not allowed", origin);
                None
            }
        },
    };

    let mut headers = CorsHeaders {
        vary_origin: !policy.is_any(),
        allow_origin,
        allow_credentials: config.credentials,
        expose_headers: config
            .exposed_headers
            .as_ref()
            .and_then(HeaderList::to_header_value),
        ..Default::default()
    };

    if !request.is_preflight() {
        return CorsOutcome {
            headers,
            disposition: Disposition::Continue,
        };
    }

    headers.allow_methods = config.methods.to_header_value();
    headers.allow_headers = match config.allowed_headers {
        Some(ref allowed) => allowed.to_header_value(),
        None => request.request_headers.clone(),
    };
    headers.max_age = config.max_age;

    let disposition = if config.preflight_continue {
        Disposition::Continue
    } else {
        Disposition::Terminate(Status::new(config.options_success_status))
    };

    CorsOutcome {
        headers,
        disposition,
    }
}

#[cfg(test)]
mod tests {
    use rocket::http::Method;

    use super::*;

    fn preflight(origin: &str) -> RequestView {
        RequestView::new(Method::Options).origin(origin)
    }

    fn actual(origin: &str) -> RequestView {
        RequestView::new(Method::Get).origin(origin)
    }

    fn compose_default(policy: &OriginPolicy, request: &RequestView) -> CorsOutcome {
        compose(&CorsConfig::default(), policy, request)
    }

    #[test]
    fn wildcard_policy_sends_wildcard_without_vary() {
        let outcome = compose_default(&OriginPolicy::Any, &actual("https://www.acme.com"));
        assert_eq!(Some("*".to_string()), outcome.headers.allow_origin);
        assert!(!outcome.headers.vary_origin);
        assert_eq!(Disposition::Continue, outcome.disposition);
    }

    #[test]
    fn reflect_policy_echoes_origin() {
        let outcome = compose_default(&OriginPolicy::Reflect, &actual("https://www.acme.com"));
        assert_eq!(
            Some("https://www.acme.com".to_string()),
            outcome.headers.allow_origin
        );
        assert!(outcome.headers.vary_origin);
    }

    #[test]
    fn reflect_policy_without_origin_sends_wildcard() {
        let outcome = compose_default(&OriginPolicy::Reflect, &RequestView::new(Method::Get));
        assert_eq!(Some("*".to_string()), outcome.headers.allow_origin);
    }

    #[test]
    fn exact_policy() {
        let policy = OriginPolicy::exact("https://www.acme.com");

        let outcome = compose_default(&policy, &actual("https://www.acme.com"));
        assert_eq!(
            Some("https://www.acme.com".to_string()),
            outcome.headers.allow_origin
        );

        let outcome = compose_default(&policy, &actual("https://www.example.com"));
        assert_eq!(None, outcome.headers.allow_origin);
        assert!(outcome.headers.vary_origin);
        assert_eq!(Disposition::Continue, outcome.disposition);
    }

    #[test]
    fn list_policy() {
        let policy = OriginPolicy::list(vec!["https://a.com", "https://b.com"]);

        let outcome = compose_default(&policy, &actual("https://b.com"));
        assert_eq!(Some("https://b.com".to_string()), outcome.headers.allow_origin);

        let outcome = compose_default(&policy, &actual("https://c.com"));
        assert_eq!(None, outcome.headers.allow_origin);
    }

    #[test]
    fn pattern_policy_echoes_full_origin() {
        let policy = not_err!(OriginPolicy::pattern(r"example\.com$"));
        let outcome = compose_default(&policy, &actual("http://sub.example.com"));
        assert_eq!(
            Some("http://sub.example.com".to_string()),
            outcome.headers.allow_origin
        );
    }

    #[test]
    fn matching_policy_without_origin_sends_wildcard() {
        let policy = OriginPolicy::exact("https://www.acme.com");
        let outcome = compose_default(&policy, &RequestView::new(Method::Get));
        assert_eq!(Some("*".to_string()), outcome.headers.allow_origin);
        assert!(outcome.headers.vary_origin);
    }

    #[test]
    fn disabled_policy_passes_through() {
        let outcome = compose_default(&OriginPolicy::Disabled, &preflight("https://www.acme.com"));
        assert_eq!(CorsOutcome::pass(), outcome);
        assert!(outcome.headers.is_empty());
    }

    #[test]
    fn unevaluated_dynamic_policy_passes_through() {
        let policy = OriginPolicy::dynamic(|_: Option<String>| async {
            Ok::<_, crate::BoxError>(crate::OriginDecision::Allow)
        });
        let outcome = compose_default(&policy, &actual("https://www.acme.com"));
        assert_eq!(CorsOutcome::pass(), outcome);
    }

    #[test]
    fn credentials_are_only_sent_when_enabled() {
        let request = actual("https://www.acme.com");

        let outcome = compose_default(&OriginPolicy::Any, &request);
        assert!(!outcome.headers.allow_credentials);
        assert!(outcome
            .headers
            .to_pairs()
            .iter()
            .all(|(name, _)| *name != headers::ACCESS_CONTROL_ALLOW_CREDENTIALS));

        let config = CorsConfig {
            credentials: true,
            ..Default::default()
        };
        let outcome = compose(&config, &OriginPolicy::Any, &request);
        assert!(outcome
            .headers
            .to_pairs()
            .contains(&(headers::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true".to_string())));
    }

    #[test]
    fn default_preflight_terminates_with_204() {
        let outcome = compose_default(&OriginPolicy::Any, &preflight("https://www.acme.com"));
        assert_eq!(Disposition::Terminate(Status::NoContent), outcome.disposition);
        assert!(outcome.is_terminated());
        assert_eq!(
            Some("GET,HEAD,PUT,PATCH,POST,DELETE".to_string()),
            outcome.headers.allow_methods
        );
    }

    #[test]
    fn preflight_continue_is_honoured() {
        let config = CorsConfig {
            preflight_continue: true,
            ..Default::default()
        };
        let outcome = compose(&config, &OriginPolicy::Any, &preflight("https://www.acme.com"));
        assert_eq!(Disposition::Continue, outcome.disposition);
        assert!(outcome.headers.allow_methods.is_some());
    }

    #[test]
    fn preflight_uses_configured_success_status() {
        let config = CorsConfig {
            options_success_status: 200,
            ..Default::default()
        };
        let outcome = compose(&config, &OriginPolicy::Any, &preflight("https://www.acme.com"));
        assert_eq!(Disposition::Terminate(Status::Ok), outcome.disposition);
    }

    #[test]
    fn methods_keep_their_order() {
        let config = CorsConfig {
            methods: HeaderList::some(&["GET", "POST", "PUT"]),
            ..Default::default()
        };
        let outcome = compose(&config, &OriginPolicy::Any, &preflight("https://www.acme.com"));
        assert_eq!(Some("GET,POST,PUT".to_string()), outcome.headers.allow_methods);
    }

    #[test]
    fn request_headers_are_reflected_verbatim() {
        let request = preflight("https://www.acme.com").request_headers("X,Y");
        let outcome = compose_default(&OriginPolicy::Any, &request);
        assert_eq!(Some("X,Y".to_string()), outcome.headers.allow_headers);
    }

    #[test]
    fn configured_allowed_headers_win_over_reflection() {
        let config = CorsConfig {
            allowed_headers: Some(HeaderList::some(&["Authorization", "Accept"])),
            ..Default::default()
        };
        let request = preflight("https://www.acme.com").request_headers("X,Y");
        let outcome = compose(&config, &OriginPolicy::Any, &request);
        assert_eq!(
            Some("Authorization,Accept".to_string()),
            outcome.headers.allow_headers
        );
    }

    #[test]
    fn empty_allowed_headers_are_omitted() {
        let config = CorsConfig {
            allowed_headers: Some(HeaderList::some(&[])),
            ..Default::default()
        };
        let request = preflight("https://www.acme.com").request_headers("X,Y");
        let outcome = compose(&config, &OriginPolicy::Any, &request);
        assert_eq!(None, outcome.headers.allow_headers);
    }

    #[test]
    fn zero_max_age_is_sent() {
        let config = CorsConfig {
            max_age: Some(0),
            ..Default::default()
        };
        let outcome = compose(&config, &OriginPolicy::Any, &preflight("https://www.acme.com"));
        assert!(outcome
            .headers
            .to_pairs()
            .contains(&(headers::ACCESS_CONTROL_MAX_AGE, "0".to_string())));
    }

    #[test]
    fn actual_request_only_gets_origin_credentials_and_exposed_headers() {
        let config = CorsConfig {
            credentials: true,
            max_age: Some(42),
            exposed_headers: Some(HeaderList::some(&["Content-Type", "X-Custom"])),
            allowed_headers: Some(HeaderList::some(&["Authorization"])),
            ..Default::default()
        };
        let request = actual("https://www.acme.com").request_headers("X");
        let outcome = compose(&config, &OriginPolicy::Reflect, &request);

        let expected = CorsHeaders {
            vary_origin: true,
            allow_origin: Some("https://www.acme.com".to_string()),
            allow_credentials: true,
            expose_headers: Some("Content-Type,X-Custom".to_string()),
            ..Default::default()
        };
        assert_eq!(expected, outcome.headers);
        assert_eq!(Disposition::Continue, outcome.disposition);
    }

    #[test]
    fn preflight_headers_are_in_wire_order() {
        let config = CorsConfig {
            credentials: true,
            max_age: Some(42),
            exposed_headers: Some(HeaderList::from("X-Custom")),
            ..Default::default()
        };
        let request = preflight("https://www.acme.com").request_headers("Authorization");
        let outcome = compose(&config, &OriginPolicy::Reflect, &request);

        let names: Vec<_> = outcome.headers.to_pairs().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            vec![
                headers::ACCESS_CONTROL_ALLOW_ORIGIN,
                headers::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                headers::ACCESS_CONTROL_ALLOW_METHODS,
                headers::ACCESS_CONTROL_ALLOW_HEADERS,
                headers::ACCESS_CONTROL_MAX_AGE,
                headers::ACCESS_CONTROL_EXPOSE_HEADERS,
            ],
            names
        );
    }

    #[test]
    fn composing_is_idempotent() {
        let config = CorsConfig {
            credentials: true,
            ..Default::default()
        };
        let policy = OriginPolicy::list(vec!["https://a.com"]);
        let request = preflight("https://a.com").request_headers("X");

        let first = compose(&config, &policy, &request);
        let second = compose(&config, &policy, &request);
        assert_eq!(first, second);
    }

    #[test]
    fn merge_appends_to_existing_vary() {
        let mut response = rocket::Response::build()
            .raw_header("Vary", "Accept")
            .finalize();

        let outcome = compose_default(&OriginPolicy::Reflect, &actual("https://www.acme.com"));
        outcome.merge(&mut response);
        outcome.merge(&mut response);

        let vary: Vec<_> = response.headers().get("Vary").collect();
        assert_eq!(vec!["Accept, Origin"], vary);
    }

    #[test]
    fn merge_keeps_other_headers_and_overwrites_cors_headers() {
        let original = rocket::Response::build()
            .status(Status::ImATeapot)
            .raw_header("X-Teapot-Make", "Rocket")
            .raw_header("Access-Control-Allow-Origin", "https://stale.example")
            .finalize();
        let mut response = original;

        let outcome = compose_default(&OriginPolicy::Any, &actual("https://www.acme.com"));
        outcome.merge(&mut response);

        assert_eq!(Status::ImATeapot, response.status());
        assert_eq!(Some("Rocket"), response.headers().get_one("X-Teapot-Make"));
        let origins: Vec<_> = response
            .headers()
            .get("Access-Control-Allow-Origin")
            .collect();
        assert_eq!(vec!["*"], origins);
        assert!(response.headers().get_one("Vary").is_none());
    }

    #[test]
    fn merge_terminates_preflight() {
        let mut response = rocket::Response::build()
            .status(Status::NotFound)
            .sized_body(Some(9usize), Cursor::new("Not Found"))
            .finalize();

        let outcome = compose_default(&OriginPolicy::Any, &preflight("https://www.acme.com"));
        outcome.merge(&mut response);

        assert_eq!(Status::NoContent, response.status());
        assert_eq!(Some("0"), response.headers().get_one("Content-Length"));
        assert_eq!(
            Some("GET,HEAD,PUT,PATCH,POST,DELETE"),
            response.headers().get_one("Access-Control-Allow-Methods")
        );
    }
}
