/*!
The deletion event that flows through the pipeline
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rendering used for fields the audit record did not carry
pub const MISSING: &str = "missing";

/// Name substituted when a uid cannot be resolved
pub const UNKNOWN_USER: &str = "Unknown";

/// A single observed deletion.
///
/// Created by the parser, enriched with `user_name` by the resolver, then
/// read by the output handlers and dropped. `None` marks a field that was
/// missing from the raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionEvent {
    /// Audit record id, e.g. `1697725262.123:456`
    pub event_id: Option<String>,
    pub path: Option<String>,
    /// Best-effort; only known when `path` is
    pub is_directory: Option<bool>,
    /// Raw numeric uid from the audit subsystem
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DeletionEvent {
    pub fn path_or_missing(&self) -> &str {
        self.path.as_deref().unwrap_or(MISSING)
    }

    pub fn user_name_or_unknown(&self) -> &str {
        self.user_name.as_deref().unwrap_or(UNKNOWN_USER)
    }

    /// "Directory" or "File" for alert text. Unknown kinds read as files.
    pub fn kind_label(&self) -> &'static str {
        if self.is_directory == Some(true) {
            "Directory"
        } else {
            "File"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> DeletionEvent {
        DeletionEvent {
            event_id: None,
            path: None,
            is_directory: None,
            user_id: None,
            user_name: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn missing_fields_render_with_markers() {
        let event = event();
        assert_eq!(event.path_or_missing(), "missing");
        assert_eq!(event.user_name_or_unknown(), "Unknown");
        assert_eq!(event.kind_label(), "File");
    }

    #[test]
    fn directory_label_requires_known_directory() {
        let mut event = event();
        event.path = Some("/data/project/old".to_string());
        event.is_directory = Some(true);
        assert_eq!(event.kind_label(), "Directory");
    }
}
