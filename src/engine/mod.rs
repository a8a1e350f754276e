mod authz;
mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use authz::AuthorizationResolver;
pub use availability::{common_availability, compute_availability, retain_min_duration};
pub use conflict::{find_conflict, ConflictDetector};
pub use error::{BookingError, Entity};
pub use store::InMemoryStore;

use std::sync::Arc;
use std::time::Instant;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{OPERATIONS_TOTAL, OPERATION_DURATION_SECONDS, PERMISSION_DENIED_TOTAL};
use crate::repository::Collaborators;

/// Booking lifecycle: gates every request through the authorization
/// resolver, runs the conflict check before any create or reschedule, and
/// leaves persistence to the booking repository.
pub struct Engine {
    collab: Collaborators,
    authz: AuthorizationResolver,
    conflicts: ConflictDetector,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(collab: Collaborators, notify: Arc<NotifyHub>) -> Self {
        Self {
            authz: AuthorizationResolver::new(collab.clone()),
            conflicts: ConflictDetector::new(collab.bookings.clone()),
            collab,
            notify,
        }
    }

    /// Permission predicates for read-path gates and role administration.
    pub fn authz(&self) -> &AuthorizationResolver {
        &self.authz
    }

    pub fn conflicts(&self) -> &ConflictDetector {
        &self.conflicts
    }

    fn publish(&self, event: &Event) {
        self.notify.send(event.resource_id(), event);
    }
}

/// Resource → owning location, with entity-specific not-found errors.
pub(super) async fn location_for_resource(
    collab: &Collaborators,
    resource_id: ResourceId,
) -> Result<Location, BookingError> {
    let resource = collab
        .resources
        .get_resource(resource_id)
        .await
        .map_err(|e| BookingError::from_store(e, || BookingError::ResourceNotFound(resource_id)))?;
    collab
        .locations
        .get_location(resource.location_id)
        .await
        .map_err(|e| {
            BookingError::from_store(e, || BookingError::not_found(Entity::Location, resource.location_id))
        })
}

/// Count and time one public operation.
pub(super) fn observe<T>(operation: &'static str, started: Instant, result: &Result<T, BookingError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    if let Err(BookingError::PermissionDenied(reason)) = result {
        metrics::counter!(PERMISSION_DENIED_TOTAL, "operation" => operation).increment(1);
        tracing::debug!("{operation} denied: {reason}");
    }
}
