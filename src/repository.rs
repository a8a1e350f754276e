//! Collaborator seams. The engine only ever sees these traits; storage,
//! SQL and transaction mechanics live behind them.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    /// A write would overlap an active booking on the same resource.
    #[error("overlapping booking on resource {resource_id}")]
    Overlap { resource_id: ResourceId },
    /// A role write would break the organization/location staff exclusion.
    #[error("role conflict for user {user} in organization {organization}")]
    RoleConflict {
        user: UserId,
        organization: OrganizationId,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ResourceLookup: Send + Sync {
    async fn get_resource(&self, id: ResourceId) -> Result<Resource, StoreError>;
}

#[async_trait]
pub trait LocationLookup: Send + Sync {
    async fn get_location(&self, id: LocationId) -> Result<Location, StoreError>;
}

#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<User, StoreError>;
}

#[async_trait]
pub trait OrganizationRoleLookup: Send + Sync {
    /// Designated owner of the organization.
    async fn is_owner_or_above(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    /// Owner or assigned organization manager.
    async fn is_manager_or_above(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    async fn assign_organization_manager(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<(), StoreError>;

    async fn remove_organization_manager(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LocationRoleLookup: Send + Sync {
    async fn is_location_manager(
        &self,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    /// True if `user_id` manages at least one location owned by the organization.
    async fn manages_any_location_in(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    async fn assign_location_manager(
        &self,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<(), StoreError>;

    async fn remove_location_manager(
        &self,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<(), StoreError>;
}

/// Booking persistence. `create` and `update` must reject a write that would
/// overlap another active booking on the same resource with
/// `StoreError::Overlap`, atomically with the write itself.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn get_by_id(&self, id: BookingId) -> Result<Booking, StoreError>;

    async fn list(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError>;

    async fn update(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn delete(&self, id: BookingId) -> Result<(), StoreError>;

    /// Any active booking on `resource_id` overlapping `span`, other than `exclude`.
    async fn has_overlap(
        &self,
        resource_id: ResourceId,
        span: &Span,
        exclude: Option<BookingId>,
    ) -> Result<bool, StoreError>;
}

/// Handles to every collaborator the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub resources: Arc<dyn ResourceLookup>,
    pub locations: Arc<dyn LocationLookup>,
    pub users: Arc<dyn UserLookup>,
    pub organization_roles: Arc<dyn OrganizationRoleLookup>,
    pub location_roles: Arc<dyn LocationRoleLookup>,
    pub bookings: Arc<dyn BookingRepository>,
}

impl Collaborators {
    /// Wire every seam to one backing store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ResourceLookup
            + LocationLookup
            + UserLookup
            + OrganizationRoleLookup
            + LocationRoleLookup
            + BookingRepository
            + 'static,
    {
        Self {
            resources: store.clone(),
            locations: store.clone(),
            users: store.clone(),
            organization_roles: store.clone(),
            location_roles: store.clone(),
            bookings: store,
        }
    }
}
