//! Error types shared across the access and streaming layers.

use thiserror::Error;

/// Errors produced by access-control operations.
///
/// Each variant carries a stable machine code so the WS/HTTP surface can
/// report a consistent `{code, message}` body regardless of wording.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("activity not found: {0}")]
    ActivityNotFound(String),

    #[error("token must not be empty")]
    EmptyToken,

    #[error("subscription language must not be empty")]
    EmptyLanguage,

    #[error("token id must not be empty")]
    EmptyTokenId,

    #[error("token not found")]
    TokenNotFound,

    #[error("token type mismatch")]
    TokenTypeMismatch,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("token has expired")]
    TokenExpired,

    #[error("activity is closed, streaming is no longer allowed")]
    ActivityClosed,

    #[error("activity is not published yet")]
    ActivityNotPublished,

    #[error("language {0} does not match the activity input language")]
    LanguageMismatch(String),

    #[error("language {0} is not enabled for this activity")]
    LanguageNotEnabled(String),

    #[error("viewer entry has not been generated yet")]
    ViewerEntryMissing,

    #[error("viewer entry is not active")]
    ViewerEntryDisabled,

    #[error("no viewer invite code exists, generate one first")]
    NoViewerToken,

    #[error("the latest viewer invite code has expired, please regenerate")]
    LatestViewerTokenExpired,

    #[error("store error: {0}")]
    Store(String),
}

impl AccessError {
    /// Stable code string for wire-level error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::ActivityNotFound(_) => "ACTIVITY_NOT_FOUND",
            AccessError::EmptyToken => "EMPTY_TOKEN",
            AccessError::EmptyLanguage => "EMPTY_LANGUAGE",
            AccessError::EmptyTokenId => "EMPTY_TOKEN_ID",
            AccessError::TokenNotFound => "TOKEN_NOT_FOUND",
            AccessError::TokenTypeMismatch => "TOKEN_TYPE_MISMATCH",
            AccessError::TokenRevoked => "TOKEN_REVOKED",
            AccessError::TokenExpired => "TOKEN_EXPIRED",
            AccessError::ActivityClosed => "ACTIVITY_CLOSED",
            AccessError::ActivityNotPublished => "ACTIVITY_NOT_PUBLISHED",
            AccessError::LanguageMismatch(_) => "LANGUAGE_MISMATCH",
            AccessError::LanguageNotEnabled(_) => "LANGUAGE_NOT_ENABLED",
            AccessError::ViewerEntryMissing => "VIEWER_ENTRY_MISSING",
            AccessError::ViewerEntryDisabled => "VIEWER_ENTRY_DISABLED",
            AccessError::NoViewerToken => "NO_VIEWER_TOKEN",
            AccessError::LatestViewerTokenExpired => "VIEWER_TOKEN_EXPIRED",
            AccessError::Store(_) => "STORE_ERROR",
        }
    }

    /// Whether the error is the caller's fault (4xx) rather than ours.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AccessError::Store(_))
    }
}

/// Errors produced by the translation pipeline's session API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("session already exists for activity {0}")]
    SessionExists(String),

    #[error("session not found for activity {0}")]
    SessionNotFound(String),

    #[error("at least one target language is required")]
    NoTargetLanguages,

    #[error("audio buffer full")]
    AudioBufferFull,

    #[error("session closed")]
    SessionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_error_codes_are_stable() {
        assert_eq!(AccessError::TokenRevoked.code(), "TOKEN_REVOKED");
        assert_eq!(
            AccessError::ActivityNotFound("a1".into()).code(),
            "ACTIVITY_NOT_FOUND"
        );
        assert_eq!(
            AccessError::LatestViewerTokenExpired.code(),
            "VIEWER_TOKEN_EXPIRED"
        );
    }

    #[test]
    fn store_errors_are_not_client_errors() {
        assert!(!AccessError::Store("boom".into()).is_client_error());
        assert!(AccessError::TokenExpired.is_client_error());
    }
}
