//! User-facing error types with suggestions.
//!
//! Only a small closed set of failures ever reaches the user: a position that
//! could not be resolved, an unknown region, a cancelled operation, and
//! rejected input. Host failures are modelled separately by [`SourceError`]
//! and are converted before they surface.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for user-visible failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PositionUnavailable,
    RegionNotFound,
    OperationCancelled,
    InvalidInput,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::PositionUnavailable => write!(f, "POSITION_UNAVAILABLE"),
            ErrorCode::RegionNotFound => write!(f, "REGION_NOT_FOUND"),
            ErrorCode::OperationCancelled => write!(f, "OPERATION_CANCELLED"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// An error with a short, speakable message and a hint for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn position_unavailable() -> Self {
        Self {
            code: ErrorCode::PositionUnavailable,
            message: "Position unavailable".to_string(),
            suggestion: Some("Move the review cursor and try again".into()),
        }
    }

    /// Position error raised when the host text could not be read at all.
    pub fn terminal_not_accessible() -> Self {
        Self {
            code: ErrorCode::PositionUnavailable,
            message: "Position unavailable: terminal text is not accessible".to_string(),
            suggestion: Some(
                "The terminal may have closed or been cleared. Focus it and try again".into(),
            ),
        }
    }

    pub fn region_not_found(name: &str) -> Self {
        Self {
            code: ErrorCode::RegionNotFound,
            message: format!("Region '{}' not found", name),
            suggestion: Some("List the defined regions to see available names".into()),
        }
    }

    /// Create a cancellation error reporting how far the operation got.
    pub fn operation_cancelled(rows_done: usize, rows_total: usize) -> Self {
        Self {
            code: ErrorCode::OperationCancelled,
            message: format!(
                "Operation cancelled after {} of {} rows",
                rows_done, rows_total
            ),
            suggestion: Some("Start the operation again to get the full result".into()),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some("Check the arguments and try again".into()),
        }
    }

    /// Create an invalid input error with a custom suggestion.
    pub fn invalid_input_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn duplicate_region_name(name: &str) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: format!("Region name '{}' already exists", name),
            suggestion: Some(format!(
                "Choose a different name, or remove the existing '{}' region first",
                name
            )),
        }
    }

    pub fn invalid_poll_interval() -> Self {
        Self::invalid_input_with_suggestion(
            "Poll interval must be greater than zero",
            "Use an interval such as 500 milliseconds",
        )
    }

    pub fn selection_too_large(rows: u64, max: u32) -> Self {
        Self::invalid_input_with_suggestion(
            format!("Selection too large: {} rows exceeds maximum of {}", rows, max),
            "Select fewer rows, or raise extraction.max_selection_rows in the settings",
        )
    }

    pub fn selection_too_wide(cols: u64, max: u32) -> Self {
        Self::invalid_input_with_suggestion(
            format!(
                "Selection too wide: {} columns exceeds maximum of {}",
                cols, max
            ),
            "Select fewer columns, or raise extraction.max_selection_cols in the settings",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: message.into(),
            suggestion: Some("This is an internal error. Please report it if it persists.".into()),
        }
    }
}

/// Failures reported by a host [`TextSource`](crate::source::TextSource).
///
/// These describe the host, not the user's request, so they are never shown
/// verbatim: see the `From` conversion into [`ApiError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The host text could not be reached (closed window, detached process).
    #[error("text source unavailable: {0}")]
    Unavailable(String),
    /// The token refers to a location that no longer exists in the buffer.
    #[error("position token is stale")]
    StaleToken,
}

impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(_) => ApiError::terminal_not_accessible(),
            SourceError::StaleToken => ApiError::position_unavailable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every user-visible error carries a hint.
    fn assert_has_suggestion(err: &ApiError, context: &str) {
        assert!(
            err.suggestion.is_some(),
            "{} should have a suggestion, but got None",
            context
        );
    }

    #[test]
    fn test_position_unavailable_has_suggestion() {
        let err = ApiError::position_unavailable();
        assert_has_suggestion(&err, "position_unavailable");
        assert_eq!(err.code, ErrorCode::PositionUnavailable);
    }

    #[test]
    fn test_region_not_found_names_region() {
        let err = ApiError::region_not_found("status");
        assert_has_suggestion(&err, "region_not_found");
        assert!(err.message.contains("status"));
    }

    #[test]
    fn test_operation_cancelled_reports_progress() {
        let err = ApiError::operation_cancelled(40, 500);
        assert_has_suggestion(&err, "operation_cancelled");
        assert!(err.message.contains("40 of 500"));
    }

    #[test]
    fn test_duplicate_region_name() {
        let err = ApiError::duplicate_region_name("build");
        assert_has_suggestion(&err, "duplicate_region_name");
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert!(err.suggestion.as_ref().unwrap().contains("build"));
    }

    #[test]
    fn test_selection_limits_mention_maximum() {
        let err = ApiError::selection_too_large(20000, 10000);
        assert!(err.message.contains("10000"));
        let err = ApiError::selection_too_wide(2000, 1000);
        assert!(err.message.contains("columns"));
    }

    #[test]
    fn test_source_errors_are_not_surfaced_raw() {
        let err: ApiError = SourceError::Unavailable("pipe closed".into()).into();
        assert_eq!(err.code, ErrorCode::PositionUnavailable);
        assert!(!err.message.contains("pipe closed"));

        let err: ApiError = SourceError::StaleToken.into();
        assert_eq!(err, ApiError::position_unavailable());
    }

    #[test]
    fn test_display_format_with_suggestion() {
        let err = ApiError::region_not_found("logs");
        let display = format!("{}", err);
        assert!(display.contains("[REGION_NOT_FOUND]"));
        assert!(display.contains("logs"));
        assert!(display.contains("(hint:"));
    }

    #[test]
    fn test_json_round_trip() {
        let err = ApiError::invalid_poll_interval();
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("INVALID_INPUT"));
        let back: ApiError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
