//! services/client/src/app/notice.rs
//!
//! Transient user-facing notifications produced by the action flows.

use daily_gk_core::ports::PortError;
use serde::Serialize;
use std::fmt;

use super::mutations::ToggleOutcome;

pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    Success { title: String, description: String },
    Error { title: String, description: String },
}

impl Notice {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notice::Success {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notice::Error {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error { .. })
    }

    pub fn title(&self) -> &str {
        match self {
            Notice::Success { title, .. } | Notice::Error { title, .. } => title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Notice::Success { description, .. } | Notice::Error { description, .. } => description,
        }
    }

    /// Notice for a finished bookmark toggle.
    pub fn for_toggle(outcome: &ToggleOutcome) -> Self {
        match outcome {
            ToggleOutcome::Added { .. } => {
                Notice::success("Bookmark added", "Summary added to bookmarks")
            }
            ToggleOutcome::Removed { .. } => {
                Notice::success("Bookmark removed", "Summary removed from bookmarks")
            }
        }
    }

    pub fn toggle_failed() -> Self {
        Notice::error("Error", "Failed to update bookmark")
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.description())
    }
}

/// The notice shown when an operation fails with `error`. The provider's own
/// message is surfaced; unclassified failures get a generic line.
pub fn notice_for_error(error: &PortError) -> Notice {
    let description = match error {
        PortError::Unknown(_) => UNEXPECTED_ERROR,
        other if other.message().trim().is_empty() => UNEXPECTED_ERROR,
        other => other.message(),
    };
    Notice::error("Error", description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_messages_are_surfaced() {
        let notice = notice_for_error(&PortError::InvalidCredentials(
            "Invalid login credentials".into(),
        ));
        assert_eq!(notice, Notice::error("Error", "Invalid login credentials"));
        assert!(notice.is_error());
    }

    #[test]
    fn unknown_errors_get_the_generic_line() {
        assert_eq!(
            notice_for_error(&PortError::Unknown("socket hang up".into())).description(),
            UNEXPECTED_ERROR
        );
        assert_eq!(
            notice_for_error(&PortError::NetworkOrServiceUnavailable(" ".into())).description(),
            UNEXPECTED_ERROR
        );
    }

    #[test]
    fn notices_serialize_with_a_type_tag() {
        let value = serde_json::to_value(Notice::success("Success", "Done")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "type": "success", "title": "Success", "description": "Done" })
        );
    }
}
