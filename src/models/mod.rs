//! Data models for the flood relief backend.
//!
//! Wire shapes use camelCase to match the mobile client.

mod identity;
mod mission;
mod organization;
mod request;
mod team;

pub use identity::*;
pub use mission::*;
pub use organization::*;
pub use request::*;
pub use team::*;

use serde::{Deserialize, Serialize};

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
