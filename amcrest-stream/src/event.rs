//! Event types for the amcrest-stream crate.

use serde::{Deserialize, Serialize};

/// A single device event parsed from one stream segment.
///
/// Events are transient: each one is produced once per parsed segment and
/// handed to the consumer, nothing is persisted.
///
/// ```text
/// Code=VideoMotion;action=Start;index=0;data={"Id":[0],"RegionName":["Region1"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event code, e.g. `VideoMotion`, `_DoTalkAction_`, `NewFile`
    pub code: String,
    /// Usually `Start`, `Stop` or `Pulse`
    pub action: String,
    /// Channel index, 0 when absent or not a number
    pub index: i64,
    /// Structured payload, normally a JSON document
    pub data: String,
    /// Set when the segment could not be decoded cleanly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    pub fn is_start(&self) -> bool {
        self.action.eq_ignore_ascii_case("start")
    }

    pub fn is_stop(&self) -> bool {
        self.action.eq_ignore_ascii_case("stop")
    }

    /// Parse `data` as JSON
    pub fn data_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(self.data.trim()).ok()
    }

    /// Look up a dotted path such as `Object.ObjectType` in `data`.
    ///
    /// Numeric segments index into arrays. Strings are returned as-is, other
    /// scalars in their JSON form.
    pub fn data_field(&self, path: &str) -> Option<String> {
        let root = self.data_json()?;
        let mut value = &root;
        for segment in path.split('.') {
            value = match value {
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                other => other.get(segment)?,
            };
        }

        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
