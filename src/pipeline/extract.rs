use thiserror::Error;
use tracing::debug;

use crate::records::Meal;

const FENCE_OPEN: &str = "```json\n";
const FENCE_CLOSE: &str = "\n```";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no fenced json block in model reply")]
    NoJsonBlock,
    #[error("fenced block is not valid json")]
    MalformedJson(#[source] serde_json::Error),
    #[error("json payload has no meals array")]
    SchemaMismatch,
}

/// Pulls the meal list out of a free-text model reply.
///
/// The envelope is strict: the first "```json\n" ... "\n```" fence must exist
/// and hold syntactically valid JSON with a `meals` array. Individual meal
/// entries are lenient: an entry missing or mistyping a required field is
/// dropped, the rest survive. This tolerates model verbosity without
/// accepting garbage wholesale.
pub fn extract_meals(raw: &str) -> Result<Vec<Meal>, ExtractError> {
    let start = raw.find(FENCE_OPEN).ok_or(ExtractError::NoJsonBlock)? + FENCE_OPEN.len();
    let len = raw[start..]
        .find(FENCE_CLOSE)
        .ok_or(ExtractError::NoJsonBlock)?;
    let body = &raw[start..start + len];

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(ExtractError::MalformedJson)?;
    let entries = value
        .get("meals")
        .and_then(|m| m.as_array())
        .ok_or(ExtractError::SchemaMismatch)?;

    let mut meals = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<Meal>(entry.clone()) {
            Ok(meal) => meals.push(meal),
            Err(err) => debug!(%err, "dropping malformed meal entry"),
        }
    }
    Ok(meals)
}
