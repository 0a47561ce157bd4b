//! This example is to demonstrate the JSON serialization and deserialization of the Cors settings
//! and reading them from Rocket's configuration
//!
//! Note: This requires the `serialization` feature which is enabled by default.
use std::error::Error;

use rocket::figment::providers::{Format, Toml};
use rocket::figment::Figment;
use rocket_cors_compose::{CorsOptions, HeaderList, OriginMatcher, OriginPolicy};

fn main() -> Result<(), Box<dyn Error>> {
    // Nothing is set, so everything falls back to the defaults
    let default = CorsOptions::default();

    let origin = OriginPolicy::list(vec![
        OriginMatcher::from("https://www.acme.com"),
        OriginMatcher::from(regex::Regex::new("^https://(.+).acme.com$")?),
    ]);

    let options = CorsOptions {
        origin: Some(origin),
        methods: Some(HeaderList::some(&["GET", "POST", "DELETE"])),
        allowed_headers: Some(HeaderList::from("Authorization,Accept")),
        exposed_headers: Some(HeaderList::some(&["Content-Type", "X-Custom"])),
        credentials: Some(true),
        max_age: Some(42),
        preflight_continue: Some(false),
        options_success_status: Some(200),
    };

    println!("Default settings");
    println!("{}", serde_json::to_string_pretty(&default)?);

    println!("Defined settings");
    let json = serde_json::to_string_pretty(&options)?;
    println!("{}", json);

    let parsed: CorsOptions = serde_json::from_str(&json)?;
    println!("Resolved settings");
    println!("{:#?}", parsed.resolve()?);

    // The same settings as they would appear in `Rocket.toml`
    let toml = r#"
        [default.cors]
        origin = ["https://www.acme.com", { pattern = "^https://(.+).acme.com$" }]
        methods = ["GET", "POST", "DELETE"]
        credentials = true
    "#;
    let figment = Figment::new().merge(Toml::string(toml).nested());
    let from_config = CorsOptions::from_figment(&figment, "cors")?;
    println!("Settings from Rocket.toml");
    println!("{:#?}", from_config);

    Ok(())
}
