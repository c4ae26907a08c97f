use std::sync::Arc;

use thiserror::Error;

use crate::api::ApiError;

/// Shown when a query or mutation needs a token and none is present
pub const SESSION_EXPIRED: &str = "Phiên đăng nhập hết hạn";

/// Shown when the shared-charts list is requested without a session
pub const LOGIN_REQUIRED_FOR_SHARED: &str =
    "Vui lòng đăng nhập để xem danh sách gia phả được chia sẻ";

/// Field-level message for a collaborator email the service cannot resolve
pub const INVALID_COLLABORATOR: &str =
    "Email không tồn tại hoặc không hợp lệ. Vui lòng kiểm tra lại.";

/// Errors surfaced by queries (per cache entry) and mutations (to the caller).
///
/// Cloneable so a single failed fetch can be handed to every reader that
/// was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// No token was present; raised without contacting the transport.
    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    RemoteFailure(Arc<ApiError>),

    /// The collaborator email does not resolve to a user.
    #[error("{}", INVALID_COLLABORATOR)]
    InvalidCollaborator { email: String },

    #[error("Cached value for {0} has an unexpected type")]
    CacheTypeMismatch(String),
}

impl SyncError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, SyncError::Unauthenticated(_))
    }

    pub fn is_invalid_collaborator(&self) -> bool {
        matches!(self, SyncError::InvalidCollaborator { .. })
    }

    /// The underlying transport error, if this is a remote failure.
    pub fn remote(&self) -> Option<&ApiError> {
        match self {
            SyncError::RemoteFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(e: ApiError) -> Self {
        SyncError::RemoteFailure(Arc::new(e))
    }
}
