use rocket::{Build, Rocket, catchers, figment::Figment, routes};

use crate::{
    catchers::{bad_request, internal_error, not_found, unprocessable},
    queue::VoteQueue,
    routes::{cast_vote, get_results, poll_page, results_page, IntakeState, ResultsState},
    store::VoteStore,
};

fn with_catchers(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.register(
        "/",
        catchers![
            bad_request,
            not_found,
            unprocessable,
            internal_error
        ],
    )
}

/// The vote intake service: a voting page and `POST /vote`.
pub fn intake_service(figment: Figment, queue: impl VoteQueue + 'static) -> Rocket<Build> {
    let rocket = rocket::custom(figment)
        .manage(IntakeState::new(queue))
        .mount("/", routes![poll_page, cast_vote]);
    with_catchers(rocket)
}

/// The results service: a results page and `GET /results`.
pub fn results_service(figment: Figment, store: impl VoteStore + 'static) -> Rocket<Build> {
    let rocket = rocket::custom(figment)
        .manage(ResultsState::new(store))
        .mount("/", routes![results_page, get_results]);
    with_catchers(rocket)
}
