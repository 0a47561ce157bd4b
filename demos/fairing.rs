use std::error::Error;

use rocket::http::Method;
use rocket::{get, routes};
use rocket_cors_compose::{CorsOptions, HeaderList, OriginPolicy};

#[get("/")]
fn cors<'a>() -> &'a str {
    "Hello CORS"
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let origin = OriginPolicy::some_exact(&["https://www.acme.com"])?;

    // You can also deserialize this
    let fairing = CorsOptions {
        origin: Some(origin),
        methods: Some(HeaderList::methods(&[Method::Get])),
        allowed_headers: Some(HeaderList::some(&["Authorization", "Accept"])),
        credentials: Some(true),
        ..Default::default()
    }
    .to_cors()?;

    let _ = rocket::build()
        .mount("/", routes![cors])
        .attach(fairing)
        .launch()
        .await?;

    Ok(())
}
