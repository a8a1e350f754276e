use tracing::{debug, info};

use crate::model::*;
use crate::repository::Collaborators;

use super::error::Entity;
use super::{location_for_resource, BookingError};

/// Resolves what an actor may do to a booking, location or organization.
///
/// Every predicate is an ordered chain, strongest role first:
/// system admin > organization owner > organization manager >
/// location manager > booking owner. The system-admin flag rides on the
/// actor, so that link never costs a lookup.
#[derive(Clone)]
pub struct AuthorizationResolver {
    collab: Collaborators,
}

impl AuthorizationResolver {
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    /// Build an actor from the user record.
    pub async fn actor(&self, user_id: UserId) -> Result<Actor, BookingError> {
        let user = self
            .collab
            .users
            .get_user(user_id)
            .await
            .map_err(|e| BookingError::from_store(e, || BookingError::not_found(Entity::User, user_id)))?;
        Ok(Actor::from(&user))
    }

    pub fn is_system_admin(&self, actor: &Actor) -> bool {
        actor.is_system_admin
    }

    /// Strongest organization-level role held, if any.
    pub async fn organization_role(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
    ) -> Result<Option<Role>, BookingError> {
        if self.is_system_admin(actor) {
            return Ok(Some(Role::SystemAdmin));
        }
        let roles = &self.collab.organization_roles;
        let missing = || BookingError::not_found(Entity::Organization, organization_id);
        if roles
            .is_owner_or_above(organization_id, actor.user_id)
            .await
            .map_err(|e| BookingError::from_store(e, missing))?
        {
            return Ok(Some(Role::OrganizationOwner));
        }
        if roles
            .is_manager_or_above(organization_id, actor.user_id)
            .await
            .map_err(|e| BookingError::from_store(e, missing))?
        {
            return Ok(Some(Role::OrganizationManager));
        }
        Ok(None)
    }

    pub async fn is_organization_owner_or_above(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
    ) -> Result<bool, BookingError> {
        Ok(self.organization_role(actor, organization_id).await?.is_some())
    }

    /// Strongest role held over a location: anything organization-wide first,
    /// then an explicit assignment to this location.
    pub async fn location_role(
        &self,
        actor: &Actor,
        location: &Location,
    ) -> Result<Option<Role>, BookingError> {
        if let Some(role) = self.organization_role(actor, location.organization_id).await? {
            return Ok(Some(role));
        }
        let manages = self
            .collab
            .location_roles
            .is_location_manager(location.id, actor.user_id)
            .await
            .map_err(|e| {
                BookingError::from_store(e, || BookingError::not_found(Entity::Location, location.id))
            })?;
        Ok(manages.then_some(Role::LocationManager))
    }

    pub async fn is_location_manager_or_above(
        &self,
        actor: &Actor,
        location_id: LocationId,
    ) -> Result<bool, BookingError> {
        if self.is_system_admin(actor) {
            return Ok(true);
        }
        let location = self.get_location(location_id).await?;
        Ok(self.location_role(actor, &location).await?.is_some())
    }

    /// Gate for reschedule, status change and delete.
    ///
    /// Staff over the booking's location get every transition. The booking's
    /// own user may reschedule and cancel, nothing more. Everyone else is
    /// denied.
    pub async fn can_mutate_booking(
        &self,
        actor: &Actor,
        booking: &Booking,
    ) -> Result<Decision, BookingError> {
        if self.is_system_admin(actor) {
            return Ok(Decision::grant(Role::SystemAdmin));
        }
        let location = location_for_resource(&self.collab, booking.resource_id).await?;
        if let Some(role) = self.location_role(actor, &location).await? {
            return Ok(Decision::grant(role));
        }
        if actor.user_id == booking.user_id {
            return Ok(Decision::grant(Role::BookingOwner));
        }
        Ok(Decision::deny())
    }

    /// Read gate: the booking's own user or staff over its location.
    pub async fn can_view_booking(&self, actor: &Actor, booking: &Booking) -> Result<bool, BookingError> {
        if self.is_system_admin(actor) || actor.user_id == booking.user_id {
            return Ok(true);
        }
        let location = location_for_resource(&self.collab, booking.resource_id).await?;
        Ok(self.location_role(actor, &location).await?.is_some())
    }

    // ── Role assignment ──────────────────────────────────────────

    /// Make `user_id` an organization manager. Only system admins and the
    /// organization's owner may do this. Fails with `RoleConflict` while the
    /// user manages any location of the organization.
    pub async fn assign_organization_manager(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<(), BookingError> {
        self.require_organization_owner(actor, organization_id).await?;
        self.require_user(user_id).await?;

        let missing = || BookingError::not_found(Entity::Organization, organization_id);
        if self
            .collab
            .location_roles
            .manages_any_location_in(organization_id, user_id)
            .await
            .map_err(|e| BookingError::from_store(e, missing))?
        {
            debug!("organization manager {user_id} rejected: already manages a location in {organization_id}");
            return Err(BookingError::RoleConflict {
                user: user_id,
                organization: organization_id,
            });
        }

        self.collab
            .organization_roles
            .assign_organization_manager(organization_id, user_id)
            .await
            .map_err(|e| BookingError::from_store(e, missing))?;
        info!("user {user_id} assigned organization manager of {organization_id}");
        Ok(())
    }

    pub async fn remove_organization_manager(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<(), BookingError> {
        self.require_organization_owner(actor, organization_id).await?;
        self.collab
            .organization_roles
            .remove_organization_manager(organization_id, user_id)
            .await
            .map_err(|e| {
                BookingError::from_store(e, || BookingError::not_found(Entity::Organization, organization_id))
            })?;
        info!("user {user_id} removed as organization manager of {organization_id}");
        Ok(())
    }

    /// Make `user_id` manager of one location. Requires organization staff or
    /// system admin on the owning organization. Fails with `RoleConflict`
    /// while the user is owner or manager of that organization.
    pub async fn assign_location_manager(
        &self,
        actor: &Actor,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<(), BookingError> {
        let location = self.get_location(location_id).await?;
        if !self
            .is_organization_owner_or_above(actor, location.organization_id)
            .await?
        {
            return Err(BookingError::PermissionDenied(
                "assigning location managers requires organization staff",
            ));
        }
        self.require_user(user_id).await?;

        let organization_id = location.organization_id;
        if self
            .collab
            .organization_roles
            .is_manager_or_above(organization_id, user_id)
            .await
            .map_err(|e| {
                BookingError::from_store(e, || BookingError::not_found(Entity::Organization, organization_id))
            })?
        {
            debug!("location manager {user_id} rejected: organization staff of {organization_id}");
            return Err(BookingError::RoleConflict {
                user: user_id,
                organization: organization_id,
            });
        }

        self.collab
            .location_roles
            .assign_location_manager(location_id, user_id)
            .await
            .map_err(|e| {
                BookingError::from_store(e, || BookingError::not_found(Entity::Location, location_id))
            })?;
        info!("user {user_id} assigned location manager of {location_id}");
        Ok(())
    }

    pub async fn remove_location_manager(
        &self,
        actor: &Actor,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<(), BookingError> {
        let location = self.get_location(location_id).await?;
        if !self
            .is_organization_owner_or_above(actor, location.organization_id)
            .await?
        {
            return Err(BookingError::PermissionDenied(
                "removing location managers requires organization staff",
            ));
        }
        self.collab
            .location_roles
            .remove_location_manager(location_id, user_id)
            .await
            .map_err(|e| {
                BookingError::from_store(e, || BookingError::not_found(Entity::Location, location_id))
            })?;
        info!("user {user_id} removed as location manager of {location_id}");
        Ok(())
    }

    // ── helpers ──────────────────────────────────────────────────

    async fn require_organization_owner(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
    ) -> Result<(), BookingError> {
        if self.is_system_admin(actor) {
            return Ok(());
        }
        let is_owner = self
            .collab
            .organization_roles
            .is_owner_or_above(organization_id, actor.user_id)
            .await
            .map_err(|e| {
                BookingError::from_store(e, || BookingError::not_found(Entity::Organization, organization_id))
            })?;
        if !is_owner {
            return Err(BookingError::PermissionDenied(
                "managing organization managers requires the organization owner",
            ));
        }
        Ok(())
    }

    async fn require_user(&self, user_id: UserId) -> Result<(), BookingError> {
        self.actor(user_id).await.map(|_| ())
    }

    async fn get_location(&self, location_id: LocationId) -> Result<Location, BookingError> {
        self.collab
            .locations
            .get_location(location_id)
            .await
            .map_err(|e| BookingError::from_store(e, || BookingError::not_found(Entity::Location, location_id)))
    }
}
