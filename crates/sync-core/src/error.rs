use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ListKind;

/// Broad error category used for retry and user-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendErrorCategory {
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by the backend.
    RateLimited,
    /// Authentication/authorization failure.
    Auth,
    /// Backend refused the request (invalid peer, forbidden content, ...).
    Rejected,
    /// Referenced conversation or media does not exist.
    NotFound,
    /// Internal backend bug or invariant break.
    Internal,
}

/// Stable error payload returned by backend fetch/command calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct BackendError {
    /// High-level error category.
    pub category: BackendErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl BackendError {
    /// Construct a new backend error.
    pub fn new(
        category: BackendErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Standard network failure used by transports that lose the connection.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCategory::Network, "network_unavailable", message)
    }

    /// Whether the same request may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category,
            BackendErrorCategory::Network | BackendErrorCategory::RateLimited
        )
    }
}

/// Failures the sync engine contains locally.
///
/// None of these terminate the scheduler loop. Only [`SyncFault::SendRejected`]
/// is surfaced to the user; the rest are logged and observable in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFault {
    /// A poll fetch failed; the list keeps its previous rows.
    #[error("{list} fetch failed: {error}")]
    TransientFetch {
        list: &'static str,
        error: BackendError,
    },
    /// The backend refused a submitted message.
    #[error("send rejected: {error}")]
    SendRejected { error: BackendError },
    /// A cache read or write failed; treated as a miss or skipped cache.
    #[error("cache io failure: {message}")]
    CacheIo { message: String },
    /// A fetch completed after its context stopped being relevant.
    #[error("stale {list} result discarded: {reason}")]
    StaleResultDiscarded {
        list: &'static str,
        reason: &'static str,
    },
}

impl SyncFault {
    pub fn transient_fetch(list: ListKind, error: BackendError) -> Self {
        Self::TransientFetch {
            list: list.as_str(),
            error,
        }
    }

    pub fn stale(list: ListKind, reason: &'static str) -> Self {
        Self::StaleResultDiscarded {
            list: list.as_str(),
            reason,
        }
    }

    /// Stable label used as the `fault` log field.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TransientFetch { .. } => "transient_fetch",
            Self::SendRejected { .. } => "send_rejected",
            Self::CacheIo { .. } => "cache_io",
            Self::StaleResultDiscarded { .. } => "stale_result_discarded",
        }
    }

    /// Whether the fault is shown to the user as a notification.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::SendRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_rate_limit_errors_are_transient() {
        assert!(BackendError::network("down").is_transient());
        assert!(
            BackendError::new(BackendErrorCategory::RateLimited, "rate_limited", "wait")
                .is_transient()
        );
        assert!(!BackendError::new(BackendErrorCategory::Rejected, "forbidden", "no").is_transient());
    }

    #[test]
    fn only_send_rejections_are_user_visible() {
        let rejected = SyncFault::SendRejected {
            error: BackendError::new(BackendErrorCategory::Rejected, "forbidden", "no"),
        };
        let stale = SyncFault::stale(ListKind::Messages, "conversation_closed");
        let fetch = SyncFault::transient_fetch(ListKind::Dialogs, BackendError::network("down"));

        assert!(rejected.is_user_visible());
        assert!(!stale.is_user_visible());
        assert!(!fetch.is_user_visible());
        assert_eq!(stale.label(), "stale_result_discarded");
        assert_eq!(
            stale.to_string(),
            "stale messages result discarded: conversation_closed"
        );
    }
}
