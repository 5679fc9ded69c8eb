use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user record. Everything besides `id` is kept as-is in `profile` and
/// serialized flat next to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>, profile: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            profile,
        }
    }

    /// Overwrites every top-level field present in `patch`. The id never changes.
    pub fn merge(&mut self, patch: User) {
        for (key, value) in patch.profile {
            self.profile.insert(key, value);
        }
    }
}
