//! Application snapshot captured by recovery points.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The persisted subtrees of a window at one point in time.
///
/// `form_state` and `view_state` are keyed by form/view id without the
/// store key prefix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_workspace: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub form_state: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub view_state: BTreeMap<String, Value>,
}

impl AppSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_none()
            && self.current_workspace.is_none()
            && self.form_state.is_empty()
            && self.view_state.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_subtrees_are_omitted() {
        let snapshot = AppSnapshot {
            tasks: Some(vec![json!({"id": "t1"})]),
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value, json!({"tasks": [{"id": "t1"}]}));

        let back: AppSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
        assert!(AppSnapshot::default().is_empty());
    }
}
