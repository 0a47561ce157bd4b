//! This crate tests that the CORS request headers are parsed correctly in the round trip
use rocket::http::{Header, Status};
use rocket::local::blocking::Client;
use rocket::{get, routes};
use rocket_cors_compose::headers::*;

#[get("/request_headers")]
fn request_headers(origin: Origin, headers: AccessControlRequestHeaders) -> String {
    let names: Vec<&str> = headers.field_names().collect();
    format!("{}\n{}", origin, names.join("|"))
}

#[get("/origin")]
fn origin_only(origin: Origin) -> String {
    origin.to_string()
}

fn make_client() -> Client {
    let rocket = rocket::build().mount("/", routes![request_headers, origin_only]);
    Client::tracked(rocket).expect("A valid Rocket client")
}

/// Tests that all the request headers are parsed correcly in a HTTP request
#[test]
fn request_headers_round_trip_smoke_test() {
    let client = make_client();

    let response = client
        .get("/request_headers")
        .header(Header::new(ORIGIN, "https://foo.bar.xyz"))
        .header(Header::new(
            ACCESS_CONTROL_REQUEST_HEADERS,
            "accept-language, X-Ping",
        ))
        .dispatch();

    assert!(response.status().class().is_success());
    let body_str = response.into_string().expect("Non-empty body");
    let expected_body = "https://foo.bar.xyz\naccept-language|X-Ping".to_string();
    assert_eq!(expected_body, body_str);
}

#[test]
fn origin_is_passed_verbatim() {
    let client = make_client();

    let response = client
        .get("/origin")
        .header(Header::new(ORIGIN, "null"))
        .dispatch();

    assert_eq!(Status::Ok, response.status());
    assert_eq!(Some("null".to_string()), response.into_string());
}

#[test]
fn missing_origin_is_forwarded() {
    let client = make_client();

    let response = client.get("/origin").dispatch();
    assert_eq!(Status::NotFound, response.status());
}

#[test]
fn empty_origin_is_forwarded() {
    let client = make_client();

    let response = client
        .get("/origin")
        .header(Header::new(ORIGIN, ""))
        .dispatch();
    assert_eq!(Status::NotFound, response.status());
}
