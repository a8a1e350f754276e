use std::time::Instant;

use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::repository::StoreError;

use super::conflict::{now, validate_span};
use super::error::Entity;
use super::{location_for_resource, observe, BookingError, Engine};

impl Engine {
    /// Book a resource. The booking starts out `pending` and is owned by the
    /// actor, or by `on_behalf_of` when staff books for someone else.
    pub async fn create_booking(&self, actor: &Actor, req: CreateBooking) -> Result<Booking, BookingError> {
        let started = Instant::now();
        let result = self.create_booking_inner(actor, req).await;
        observe("create_booking", started, &result);
        result
    }

    async fn create_booking_inner(&self, actor: &Actor, req: CreateBooking) -> Result<Booking, BookingError> {
        let now = now();
        validate_span(&req.span, now)?;
        let location = location_for_resource(&self.collab, req.resource_id).await?;

        let owner = match req.on_behalf_of {
            Some(user_id) if user_id != actor.user_id => {
                if self.authz.location_role(actor, &location).await?.is_none() {
                    return Err(BookingError::PermissionDenied(
                        "booking for another user requires location staff",
                    ));
                }
                self.authz.actor(user_id).await?;
                user_id
            }
            _ => actor.user_id,
        };

        self.conflicts
            .check_no_conflict(req.resource_id, &req.span, None)
            .await?;

        let booking = Booking {
            id: Ulid::new(),
            resource_id: req.resource_id,
            user_id: owner,
            span: req.span,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let booking = self
            .collab
            .bookings
            .create(booking)
            .await
            .map_err(|e| commit_error(e, || BookingError::ResourceNotFound(req.resource_id)))?;

        info!(
            "booking {} created on {} for {} at {}",
            booking.id, booking.resource_id, booking.user_id, booking.span
        );
        self.publish(&Event::BookingCreated {
            booking: booking.clone(),
        });
        Ok(booking)
    }

    /// Reschedule and/or change the status of a booking.
    ///
    /// Staff over the booking's location may apply any transition; the
    /// booking's own user may reschedule and cancel only. A new interval is
    /// re-validated and re-checked against every other active booking on the
    /// resource. Reinstating a cancelled booking re-checks its interval too.
    pub async fn update_booking(
        &self,
        actor: &Actor,
        id: BookingId,
        req: UpdateBooking,
    ) -> Result<Booking, BookingError> {
        let started = Instant::now();
        let result = self.update_booking_inner(actor, id, req).await;
        observe("update_booking", started, &result);
        result
    }

    async fn update_booking_inner(
        &self,
        actor: &Actor,
        id: BookingId,
        req: UpdateBooking,
    ) -> Result<Booking, BookingError> {
        let current = self.load_booking(id).await?;
        let decision = self.authz.can_mutate_booking(actor, &current).await?;
        if !decision.allowed {
            return Err(BookingError::PermissionDenied("not allowed to modify this booking"));
        }

        let now = now();
        let mut next = current.clone();
        if let Some(span) = req.span {
            validate_span(&span, now)?;
            next.span = span;
        }
        if let Some(status) = req.status {
            if status != current.status && !decision.permits_transition(status) {
                return Err(BookingError::PermissionDenied("status transition not allowed"));
            }
            next.status = status;
        }

        if next == current {
            return Ok(current);
        }

        let reinstated = !current.is_active() && next.is_active();
        if next.is_active() && (next.span != current.span || reinstated) {
            self.conflicts
                .check_no_conflict(next.resource_id, &next.span, Some(id))
                .await?;
        }

        next.updated_at = now;
        let updated = self
            .collab
            .bookings
            .update(next)
            .await
            .map_err(|e| commit_error(e, || BookingError::not_found(Entity::Booking, id)))?;

        if updated.span != current.span {
            info!("booking {id} rescheduled {} -> {}", current.span, updated.span);
            self.publish(&Event::BookingRescheduled {
                id,
                resource_id: updated.resource_id,
                from: current.span,
                to: updated.span,
            });
        }
        if updated.status != current.status {
            info!("booking {id} {} -> {}", current.status, updated.status);
            self.publish(&Event::BookingStatusChanged {
                id,
                resource_id: updated.resource_id,
                from: current.status,
                to: updated.status,
            });
        }
        Ok(updated)
    }

    /// Hard-delete a booking. Same gate as `update_booking`.
    pub async fn delete_booking(&self, actor: &Actor, id: BookingId) -> Result<(), BookingError> {
        let started = Instant::now();
        let result = self.delete_booking_inner(actor, id).await;
        observe("delete_booking", started, &result);
        result
    }

    async fn delete_booking_inner(&self, actor: &Actor, id: BookingId) -> Result<(), BookingError> {
        let booking = self.load_booking(id).await?;
        let decision = self.authz.can_mutate_booking(actor, &booking).await?;
        if !decision.allowed {
            return Err(BookingError::PermissionDenied("not allowed to delete this booking"));
        }

        self.collab
            .bookings
            .delete(id)
            .await
            .map_err(|e| BookingError::from_store(e, || BookingError::not_found(Entity::Booking, id)))?;

        info!("booking {id} deleted by {}", actor.user_id);
        self.publish(&Event::BookingDeleted {
            id,
            resource_id: booking.resource_id,
        });
        Ok(())
    }

    // ── Role administration ──────────────────────────────────────

    pub async fn assign_organization_manager(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<(), BookingError> {
        let started = Instant::now();
        let result = self
            .authz
            .assign_organization_manager(actor, organization_id, user_id)
            .await;
        observe("assign_organization_manager", started, &result);
        result
    }

    pub async fn remove_organization_manager(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<(), BookingError> {
        let started = Instant::now();
        let result = self
            .authz
            .remove_organization_manager(actor, organization_id, user_id)
            .await;
        observe("remove_organization_manager", started, &result);
        result
    }

    pub async fn assign_location_manager(
        &self,
        actor: &Actor,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<(), BookingError> {
        let started = Instant::now();
        let result = self
            .authz
            .assign_location_manager(actor, location_id, user_id)
            .await;
        observe("assign_location_manager", started, &result);
        result
    }

    pub async fn remove_location_manager(
        &self,
        actor: &Actor,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<(), BookingError> {
        let started = Instant::now();
        let result = self
            .authz
            .remove_location_manager(actor, location_id, user_id)
            .await;
        observe("remove_location_manager", started, &result);
        result
    }

    pub(super) async fn load_booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.collab
            .bookings
            .get_by_id(id)
            .await
            .map_err(|e| BookingError::from_store(e, || BookingError::not_found(Entity::Booking, id)))
    }
}

/// Store failure on the write itself. An overlap here means another request
/// won the race after our pre-check passed.
fn commit_error(err: StoreError, missing: impl FnOnce() -> BookingError) -> BookingError {
    if let StoreError::Overlap { resource_id } = &err {
        warn!("overlap on {resource_id} rejected at commit");
        metrics::counter!(crate::observability::CONFLICTS_TOTAL, "stage" => "commit").increment(1);
    }
    BookingError::from_store(err, missing)
}
