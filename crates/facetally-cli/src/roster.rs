//! Employee roster snapshot read from a JSON file.

use facetally_core::EnrolledFace;
use serde::Deserialize;
use serde_json::Value;

/// One employee as exported by the attendance service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Stored face profile, in whatever format it was persisted.
    #[serde(default)]
    pub face_data: Option<Value>,
}

fn default_active() -> bool {
    true
}

impl EnrolledFace for RosterEntry {
    fn face_data(&self) -> Option<&Value> {
        self.face_data.as_ref()
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

pub fn parse_roster(raw: &str) -> serde_json::Result<Vec<RosterEntry>> {
    serde_json::from_str(raw)
}
