use std::time::Instant;

use chrono::{NaiveDate, TimeDelta};
use futures::future::try_join_all;

use crate::limits::*;
use crate::model::*;

use super::availability::{common_availability, compute_availability, retain_min_duration};
use super::error::Entity;
use super::{location_for_resource, observe, BookingError, Engine};

impl Engine {
    /// Open slots of one resource on `date`, inside its location's opening hours.
    pub async fn get_availability(
        &self,
        resource_id: ResourceId,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, BookingError> {
        self.get_free_slots(resource_id, date, None).await
    }

    /// Like `get_availability`, dropping slots shorter than `min_duration`.
    pub async fn get_free_slots(
        &self,
        resource_id: ResourceId,
        date: NaiveDate,
        min_duration: Option<TimeDelta>,
    ) -> Result<Vec<Slot>, BookingError> {
        let started = Instant::now();
        let result = self.free_slots(resource_id, date, min_duration).await;
        observe("get_availability", started, &result);
        result
    }

    async fn free_slots(
        &self,
        resource_id: ResourceId,
        date: NaiveDate,
        min_duration: Option<TimeDelta>,
    ) -> Result<Vec<Slot>, BookingError> {
        let location = location_for_resource(&self.collab, resource_id).await?;
        let day = location.opening_hours.on(date)?;
        let filter = BookingFilter {
            resource_id: Some(resource_id),
            window: Some(day),
            ..Default::default()
        };
        let bookings = self
            .collab
            .bookings
            .list(&filter)
            .await
            .map_err(|e| BookingError::from_store(e, || BookingError::ResourceNotFound(resource_id)))?;

        let mut slots = compute_availability(date, &location.opening_hours, &bookings)?;
        retain_min_duration(&mut slots, min_duration);
        Ok(slots)
    }

    /// Time ranges on `date` where at least `min_available` of the given
    /// resources are free at once.
    pub async fn get_multi_availability(
        &self,
        resource_ids: &[ResourceId],
        date: NaiveDate,
        min_available: usize,
        min_duration: Option<TimeDelta>,
    ) -> Result<Vec<Slot>, BookingError> {
        let started = Instant::now();
        let result = self
            .multi_free_slots(resource_ids, date, min_available, min_duration)
            .await;
        observe("get_multi_availability", started, &result);
        result
    }

    async fn multi_free_slots(
        &self,
        resource_ids: &[ResourceId],
        date: NaiveDate,
        min_available: usize,
        min_duration: Option<TimeDelta>,
    ) -> Result<Vec<Slot>, BookingError> {
        if resource_ids.len() > MAX_MULTI_RESOURCES {
            return Err(BookingError::LimitExceeded("too many resource ids"));
        }
        // A resource counts once however often it is listed
        let mut ids = resource_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() || min_available == 0 || min_available > ids.len() {
            return Ok(Vec::new());
        }

        let per_resource = try_join_all(
            ids
                .iter()
                .map(|&rid| self.free_slots(rid, date, None)),
        )
        .await?;

        let mut slots = common_availability(&per_resource, min_available);
        retain_min_duration(&mut slots, min_duration);
        Ok(slots)
    }

    /// Fetch one booking, if the actor may see it.
    pub async fn get_booking(&self, actor: &Actor, id: BookingId) -> Result<Booking, BookingError> {
        let booking = self.load_booking(id).await?;
        if !self.authz.can_view_booking(actor, &booking).await? {
            return Err(BookingError::PermissionDenied("not allowed to view this booking"));
        }
        Ok(booking)
    }

    /// A user's bookings, ordered by start. Others' bookings are visible to
    /// system admins in full and to staff for the locations they run.
    pub async fn list_user_bookings(
        &self,
        actor: &Actor,
        user_id: UserId,
        include_cancelled: bool,
    ) -> Result<Vec<Booking>, BookingError> {
        let filter = BookingFilter {
            user_id: Some(user_id),
            include_cancelled,
            ..Default::default()
        };
        let bookings = self
            .collab
            .bookings
            .list(&filter)
            .await
            .map_err(|e| BookingError::from_store(e, || BookingError::not_found(Entity::User, user_id)))?;

        if actor.user_id == user_id || self.authz.is_system_admin(actor) {
            return Ok(bookings);
        }
        let mut visible = Vec::with_capacity(bookings.len());
        for booking in bookings {
            if self.authz.can_view_booking(actor, &booking).await? {
                visible.push(booking);
            }
        }
        Ok(visible)
    }

    /// Every booking on a resource overlapping `window`. Location staff only.
    pub async fn list_resource_bookings(
        &self,
        actor: &Actor,
        resource_id: ResourceId,
        window: Option<Span>,
        include_cancelled: bool,
    ) -> Result<Vec<Booking>, BookingError> {
        let location = location_for_resource(&self.collab, resource_id).await?;
        if self.authz.location_role(actor, &location).await?.is_none() {
            return Err(BookingError::PermissionDenied("listing resource bookings requires location staff"));
        }
        let filter = BookingFilter {
            resource_id: Some(resource_id),
            window,
            include_cancelled,
            ..Default::default()
        };
        self.collab
            .bookings
            .list(&filter)
            .await
            .map_err(|e| BookingError::from_store(e, || BookingError::ResourceNotFound(resource_id)))
    }
}
