use include_dir::{include_dir, Dir};
use rocket::{State, get, post, form::Form, response::content::RawHtml, serde::json::Json};
use shared::{models::{TallySnapshot, VoteForm}, validation::validate_vote};
use tracing::{debug, instrument};

use crate::{error::ApiError, queue::VoteQueue, store::VoteStore};

static STATIC_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

pub struct IntakeState {
    pub queue: Box<dyn VoteQueue>,
}

impl IntakeState {
    pub fn new(queue: impl VoteQueue + 'static) -> Self {
        Self { queue: Box::new(queue) }
    }
}

/// Holds the one store connection opened at startup. It is never replaced:
/// once it dies, every results request fails.
pub struct ResultsState {
    pub store: Box<dyn VoteStore>,
}

impl ResultsState {
    pub fn new(store: impl VoteStore + 'static) -> Self {
        Self { store: Box::new(store) }
    }
}

fn page(path: &str) -> Option<RawHtml<&'static str>> {
    STATIC_DIR
        .get_file(path)
        .and_then(|file| file.contents_utf8())
        .map(RawHtml)
}

#[get("/")]
pub fn poll_page() -> Option<RawHtml<&'static str>> {
    page("poll/index.html")
}

#[get("/")]
pub fn results_page() -> Option<RawHtml<&'static str>> {
    page("result/index.html")
}

#[instrument(skip(state, ballot))]
#[post("/vote", data = "<ballot>")]
pub async fn cast_vote(state: &State<IntakeState>, ballot: Form<VoteForm>) -> Result<String, ApiError> {
    let vote = validate_vote(&ballot.vote)?;
    state.queue.push(vote).await?;
    debug!(vote = %vote, "Vote queued");
    Ok(format!("Voted for {}!", vote))
}

#[get("/results")]
pub async fn get_results(state: &State<ResultsState>) -> Result<Json<TallySnapshot>, ApiError> {
    let tally = state.store.tally().await?;
    Ok(Json(tally))
}
