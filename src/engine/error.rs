use thiserror::Error;
use ulid::Ulid;

use crate::repository::StoreError;

/// Which kind of entity a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Booking,
    Location,
    Organization,
    User,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Booking => "booking",
            Entity::Location => "location",
            Entity::Organization => "organization",
            Entity::User => "user",
        })
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid time range: end must be after start")]
    InvalidTimeRange,
    #[error("start time is in the past")]
    StartTimePast,
    /// Raised by the pre-commit check and by a store-level overlap rejection alike.
    #[error("time conflict on resource {0}")]
    TimeConflict(Ulid),
    #[error("resource not found: {0}")]
    ResourceNotFound(Ulid),
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Ulid },
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),
    #[error("user {user} already holds a conflicting role in organization {organization}")]
    RoleConflict { user: Ulid, organization: Ulid },
    #[error("invalid status: {0}")]
    InvalidStatus(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Stable label for metrics and transport-level status mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::InvalidTimeRange => "invalid_time_range",
            BookingError::StartTimePast => "start_time_past",
            BookingError::TimeConflict(_) => "time_conflict",
            BookingError::ResourceNotFound(_) => "resource_not_found",
            BookingError::NotFound { .. } => "not_found",
            BookingError::PermissionDenied(_) => "permission_denied",
            BookingError::RoleConflict { .. } => "role_conflict",
            BookingError::InvalidStatus(_) => "invalid_status",
            BookingError::LimitExceeded(_) => "limit_exceeded",
            BookingError::Internal(_) => "internal",
        }
    }

    pub(crate) fn not_found(entity: Entity, id: Ulid) -> Self {
        BookingError::NotFound { entity, id }
    }

    /// Translate a collaborator failure. `missing` names the entity the call
    /// was looking up.
    pub(crate) fn from_store(err: StoreError, missing: impl FnOnce() -> BookingError) -> Self {
        match err {
            StoreError::NotFound => missing(),
            StoreError::Overlap { resource_id } => BookingError::TimeConflict(resource_id),
            StoreError::RoleConflict { user, organization } => {
                BookingError::RoleConflict { user, organization }
            }
            StoreError::Unavailable(msg) => BookingError::Internal(msg),
        }
    }
}
