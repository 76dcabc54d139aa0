pub mod artifacts;
pub mod audit;
pub mod capsules;
pub mod chunks;
pub mod decisions;
pub mod edits;
pub mod events;
pub mod handoffs;
pub mod jobs;
pub mod notes;
pub mod purge;
pub mod reflections;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Serialize a list/object field into its JSON column representation.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a JSON column back into its typed field.
pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}
