//! Fairing implementation
use std::io::Cursor;

use log::{error, info};
use rocket::http::uri::Origin as UriOrigin;
use rocket::http::{self, Status};
use rocket::{fairing, route, Build, Data, Request, Rocket};

use crate::compose::{CorsOutcome, Disposition};
use crate::{ConfigSource, Cors};

/// What the fairing decided in `on_request`, kept in the request local cache for the fairing
/// route and `on_response`.
#[derive(Debug)]
enum FairingState {
    /// `on_request` did not run for this request
    Untouched,
    /// Headers to apply, possibly terminating a preflight
    Composed(CorsOutcome),
    /// CORS processing failed; no header is touched
    Failed(Status),
}

impl FairingState {
    /// Status to reroute the request to the fairing route with, if any
    fn reroute_status(&self) -> Option<Status> {
        match *self {
            FairingState::Composed(CorsOutcome {
                disposition: Disposition::Terminate(status),
                ..
            }) => Some(status),
            FairingState::Failed(status) => Some(status),
            _ => None,
        }
    }
}

/// An empty response with `status`
fn empty_response<'r>(status: Status) -> rocket::Response<'r> {
    rocket::Response::build()
        .status(status)
        .sized_body(Some(0usize), Cursor::new(""))
        .raw_header("Content-Length", "0")
        .finalize()
}

/// Route answering preflights and failed CORS processing for the fairing
fn fairing_route_handler<'r>(request: &'r Request<'_>, _: Data<'r>) -> route::BoxFuture<'r> {
    let outcome = match *request.local_cache(|| FairingState::Untouched) {
        FairingState::Composed(CorsOutcome {
            disposition: Disposition::Terminate(status),
            ..
        }) => {
            info!("Answering CORS preflight with {}", status);
            route::Outcome::Success(empty_response(status))
        }
        FairingState::Failed(status) => route::Outcome::Error(status),
        _ => {
            // Reached directly rather than through a reroute
            let code = request
                .param::<u16>(0)
                .and_then(Result::ok)
                .unwrap_or_else(|| {
                    error!("Fairing route reached with an invalid status parameter");
                    500
                });
            let status = Status::from_code(code).unwrap_or(Status::InternalServerError);
            route::Outcome::Error(status)
        }
    };

    Box::pin(async move { outcome })
}

/// Create a new `Route` for Fairing handling
fn fairing_route(rank: isize) -> rocket::Route {
    rocket::Route::ranked(rank, http::Method::Get, "/<status>", fairing_route_handler)
}

/// Modifies a `Request` to route to the fairing route
fn route_to_fairing_handler(cors: &Cors, status: Status, request: &mut Request<'_>) {
    let uri = format!("{}/{}", cors.fairing_route_base, status.code);
    match UriOrigin::parse_owned(uri) {
        Ok(uri) => {
            request.set_method(http::Method::Get);
            request.set_uri(uri);
        }
        Err(e) => error!(
            "Invalid CORS fairing route base {}: {}",
            cors.fairing_route_base, e
        ),
    }
}

#[rocket::async_trait]
impl fairing::Fairing for Cors {
    fn info(&self) -> fairing::Info {
        fairing::Info {
            name: "CORS",
            kind: fairing::Kind::Ignite | fairing::Kind::Request | fairing::Kind::Response,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        if let ConfigSource::Static(ref config) = self.source {
            if let Err(e) = config.validate() {
                error!("Error attaching CORS fairing: {}", e);
                return Err(rocket);
            }
            config.warn_on_misconfiguration();
        }

        Ok(rocket.mount(
            self.fairing_route_base.as_str(),
            vec![fairing_route(self.fairing_route_rank)],
        ))
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let state = match self.process(request).await {
            Ok(outcome) => FairingState::Composed(outcome),
            Err(err) => {
                error!("CORS Error: {}", err);
                FairingState::Failed(err.status())
            }
        };

        let reroute = state.reroute_status();
        let _ = request.local_cache(|| state);
        if let Some(status) = reroute {
            route_to_fairing_handler(self, status, request);
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut rocket::Response<'r>) {
        if let FairingState::Composed(ref outcome) = *request.local_cache(|| FairingState::Untouched)
        {
            outcome.merge(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::http::{Header, Method, Status};
    use rocket::local::blocking::Client;

    use crate::{BoxError, CorsConfig, CorsOptions, OriginPolicy};

    use super::*;

    const CORS_ROOT: &str = "/my_cors";

    fn make_cors() -> Cors {
        CorsOptions {
            origin: Some(OriginPolicy::exact("https://www.acme.com")),
            credentials: Some(true),
            ..Default::default()
        }
        .to_cors()
        .expect("To not fail")
        .fairing_route_base(CORS_ROOT)
    }

    fn rocket(fairing: Cors) -> Rocket<Build> {
        rocket::build().attach(fairing)
    }

    #[test]
    fn fairing_route_returns_passed_in_status() {
        let client = Client::tracked(rocket(make_cors())).expect("to not fail");
        let request = client.get(format!("{}/403", CORS_ROOT));
        let response = request.dispatch();
        assert_eq!(Status::Forbidden, response.status());
    }

    #[test]
    fn fairing_route_returns_500_for_unknown_status() {
        let client = Client::tracked(rocket(make_cors())).expect("to not fail");
        let request = client.get(format!("{}/999", CORS_ROOT));
        let response = request.dispatch();
        assert_eq!(Status::InternalServerError, response.status());
    }

    #[test]
    fn fairing_route_is_mounted_on_ignite() {
        let rocket = rocket::async_test(rocket(make_cors()).ignite()).expect("to ignite");

        let expected_uri = format!("{}/<status>", CORS_ROOT);
        let fairing_route = rocket
            .routes()
            .find(|r| r.method == Method::Get && r.uri.to_string() == expected_uri);
        assert!(fairing_route.is_some());
    }

    #[test]
    fn invalid_config_fails_ignite() {
        let cors = Cors::new(CorsConfig {
            options_success_status: 1000,
            ..Default::default()
        });

        match rocket::async_test(rocket(cors).ignite()) {
            Ok(_) => panic!("ignite should fail with an invalid configuration"),
            Err(error) => {
                assert_matches!(error.kind(), rocket::error::ErrorKind::FailedFairings(_))
            }
        }
    }

    #[test]
    fn preflight_is_rerouted_and_answered() {
        let client = Client::tracked(rocket(make_cors())).expect("to not fail");
        let response = client
            .options("/")
            .header(Header::new("Origin", "https://www.acme.com"))
            .dispatch();

        assert_eq!(Status::NoContent, response.status());
        assert_eq!(
            Some("https://www.acme.com"),
            response.headers().get_one("Access-Control-Allow-Origin")
        );
        assert_eq!(
            Some("true"),
            response.headers().get_one("Access-Control-Allow-Credentials")
        );
    }

    #[test]
    fn delegate_error_fails_without_cors_headers() {
        let cors = Cors::from_delegate(|_: &Request<'_>| -> Result<CorsOptions, BoxError> {
            Err("configuration store unavailable".into())
        });
        let client = Client::tracked(rocket(cors)).expect("to not fail");
        let response = client
            .get("/")
            .header(Header::new("Origin", "https://www.acme.com"))
            .dispatch();

        assert_eq!(Status::InternalServerError, response.status());
        assert!(response
            .headers()
            .get_one("Access-Control-Allow-Origin")
            .is_none());
    }
}
