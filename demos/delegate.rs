//! This example shows CORS settings decided per request.
//!
//! Routes below `/public` accept any origin. Everything else only answers origins that the
//! origin delegate approves, here any subdomain of `acme.com`.
use std::error::Error;

use rocket::{get, routes, Request};
use rocket_cors_compose::{
    BoxError, ConfigDelegate, Cors, CorsOptions, OriginDecision, OriginPolicy,
};

#[get("/")]
fn private<'a>() -> &'a str {
    "Hello private CORS"
}

#[get("/public")]
fn public<'a>() -> &'a str {
    "Hello public CORS"
}

struct ByPath;

#[rocket::async_trait]
impl ConfigDelegate for ByPath {
    async fn options(&self, request: &Request<'_>) -> Result<CorsOptions, BoxError> {
        if request.uri().path().as_str().starts_with("/public") {
            return Ok(CorsOptions::default());
        }

        // A real application would look this up, e.g. in a tenant registry
        let origin = OriginPolicy::dynamic(|origin: Option<String>| async move {
            let allowed = origin.map_or(false, |o| o.ends_with(".acme.com"));
            Ok::<_, BoxError>(OriginDecision::from(allowed))
        });

        Ok(CorsOptions {
            origin: Some(origin),
            credentials: Some(true),
            max_age: Some(600),
            ..Default::default()
        })
    }
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = rocket::build()
        .mount("/", routes![private, public])
        .attach(Cors::from_delegate(ByPath))
        .launch()
        .await?;

    Ok(())
}
