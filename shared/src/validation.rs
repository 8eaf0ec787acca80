#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Vote value is empty")]
    EmptyVote,
}

/// The only check applied to a ballot: a value must be present. Anything else is forwarded verbatim.
pub fn validate_vote(vote: &str) -> Result<&str, ValidationError> {
    if vote.is_empty() {
        return Err(ValidationError::EmptyVote);
    }
    Ok(vote)
}
