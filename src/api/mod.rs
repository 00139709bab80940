use rocket::{http::Status, Catcher, Request, Route};

use crate::error::Error;

mod auth;
mod elections;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(elections::routes());
    routes.extend(voting::routes());
    routes
}

/// JSON error bodies for requests Rocket rejects before a handler runs.
pub fn catchers() -> Vec<Catcher> {
    catchers![bad_request, not_found, unprocessable]
}

#[catch(400)]
fn bad_request() -> Error {
    Error::Status(Status::BadRequest, "Bad request".to_string())
}

#[catch(404)]
fn not_found(req: &Request) -> Error {
    Error::Status(Status::NotFound, format!("No route for {}", req.uri()))
}

/// Well-formed JSON of the wrong shape is still the client's fault.
#[catch(422)]
fn unprocessable() -> Error {
    Error::Status(Status::BadRequest, "Malformed request body".to_string())
}
