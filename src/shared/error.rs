use axum::{response::IntoResponse, Json};

/// Failure taxonomy shared by every CRM module. No variant is process-fatal;
/// each failure is scoped to the entity being mutated and callers surface
/// the message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Not found: {0}")]
    NotFound(String),
    /// A guarded-transition precondition failed. Resolved client-side and
    /// never logged as a system failure; the message names the missing
    /// requirement.
    #[error("{0}")]
    Validation(String),
    /// The entity changed underneath the caller (already won, already
    /// lost). The client should re-fetch canonical state, not retry blind.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The deal was marked won but the deliverable project could not be
    /// created. Surfaced distinctly from a plain update failure so the
    /// visible "won" state cannot silently diverge from a missing project.
    #[error("Deal marked won but project creation failed: {0}")]
    Conversion(String),
    /// A bulk operation with mixed outcomes, reported as counts.
    #[error("{failed} of {total} operations failed")]
    PartialBatch { total: usize, failed: usize },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for CrmError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Conversion(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PartialBatch { .. } => StatusCode::MULTI_STATUS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            // The won flag stuck even though the project is missing; the
            // client needs to know this is not a plain failed update.
            Self::Conversion(_) => {
                serde_json::json!({ "error": self.to_string(), "deal_won": true })
            }
            Self::PartialBatch { total, failed } => serde_json::json!({
                "error": self.to_string(),
                "total": total,
                "failed": failed,
                "succeeded": total - failed,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl CrmError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }
}
