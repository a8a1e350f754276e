use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, RwLock};

use crate::model::*;
use crate::repository::*;

use super::conflict::find_conflict;

/// Bookings of one resource, sorted by `span.start`.
#[derive(Debug, Default)]
struct ResourceBookings {
    bookings: Vec<Booking>,
}

impl ResourceBookings {
    fn insert(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.span.start <= booking.span.start);
        self.bookings.insert(pos, booking);
    }

    fn remove(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    fn get(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Only bookings whose span overlaps the query window.
    fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end.
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

type SharedResourceBookings = Arc<RwLock<ResourceBookings>>;

/// In-process implementation of every collaborator seam.
///
/// Each resource's bookings sit behind their own async lock, and `create` /
/// `update` re-check for overlap while holding it, so concurrent writers on
/// one resource serialize and at most one of two overlapping requests lands.
/// Role writes serialize on a single lock for the same reason.
pub struct InMemoryStore {
    users: DashMap<UserId, User>,
    organizations: DashMap<OrganizationId, Organization>,
    locations: DashMap<LocationId, Location>,
    resources: DashMap<ResourceId, Resource>,
    bookings: DashMap<ResourceId, SharedResourceBookings>,
    /// Reverse lookup: booking id → resource id
    booking_to_resource: DashMap<BookingId, ResourceId>,
    organization_managers: DashMap<OrganizationId, HashSet<UserId>>,
    location_managers: DashMap<LocationId, HashSet<UserId>>,
    role_writes: Mutex<()>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            organizations: DashMap::new(),
            locations: DashMap::new(),
            resources: DashMap::new(),
            bookings: DashMap::new(),
            booking_to_resource: DashMap::new(),
            organization_managers: DashMap::new(),
            location_managers: DashMap::new(),
            role_writes: Mutex::new(()),
        }
    }

    // ── Directory ────────────────────────────────────────────────

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn insert_organization(&self, organization: Organization) {
        self.organizations.insert(organization.id, organization);
    }

    pub fn insert_location(&self, location: Location) {
        self.locations.insert(location.id, location);
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.resources.insert(resource.id, resource);
    }

    /// Resources ordered by id.
    pub fn resources(&self) -> Vec<Resource> {
        let mut all: Vec<Resource> = self.resources.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }

    /// Store a booking as-is, bypassing the overlap check. For loading
    /// existing records, including ones already in the past. Ids must be unique.
    pub async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError> {
        let rs = self.resource_bookings(booking.resource_id)?;
        let mut guard = rs.write().await;
        self.claim_booking_id(&booking)?;
        guard.insert(booking);
        Ok(())
    }

    fn claim_booking_id(&self, booking: &Booking) -> Result<(), StoreError> {
        match self.booking_to_resource.entry(booking.id) {
            Entry::Occupied(_) => Err(StoreError::Unavailable(format!(
                "duplicate booking id {}",
                booking.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(booking.resource_id);
                Ok(())
            }
        }
    }

    fn resource_bookings(&self, resource_id: ResourceId) -> Result<SharedResourceBookings, StoreError> {
        if !self.resources.contains_key(&resource_id) {
            return Err(StoreError::NotFound);
        }
        Ok(self
            .bookings
            .entry(resource_id)
            .or_default()
            .value()
            .clone())
    }

    fn booking_resource(&self, id: BookingId) -> Result<SharedResourceBookings, StoreError> {
        let resource_id = self
            .booking_to_resource
            .get(&id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound)?;
        self.resource_bookings(resource_id)
    }

    fn organization_of(&self, location_id: LocationId) -> Result<OrganizationId, StoreError> {
        self.locations
            .get(&location_id)
            .map(|l| l.organization_id)
            .ok_or(StoreError::NotFound)
    }

    fn owner_of(&self, organization_id: OrganizationId) -> Result<UserId, StoreError> {
        self.organizations
            .get(&organization_id)
            .map(|o| o.owner_id)
            .ok_or(StoreError::NotFound)
    }

    fn is_organization_staff(&self, organization_id: OrganizationId, user_id: UserId) -> Result<bool, StoreError> {
        if self.owner_of(organization_id)? == user_id {
            return Ok(true);
        }
        Ok(self
            .organization_managers
            .get(&organization_id)
            .is_some_and(|m| m.contains(&user_id)))
    }

    fn manages_location_in(&self, organization_id: OrganizationId, user_id: UserId) -> bool {
        self.location_managers.iter().any(|entry| {
            entry.value().contains(&user_id)
                && self
                    .locations
                    .get(entry.key())
                    .is_some_and(|l| l.organization_id == organization_id)
        })
    }
}

#[async_trait]
impl ResourceLookup for InMemoryStore {
    async fn get_resource(&self, id: ResourceId) -> Result<Resource, StoreError> {
        self.resources
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl LocationLookup for InMemoryStore {
    async fn get_location(&self, id: LocationId) -> Result<Location, StoreError> {
        self.locations
            .get(&id)
            .map(|l| l.value().clone())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserLookup for InMemoryStore {
    async fn get_user(&self, id: UserId) -> Result<User, StoreError> {
        self.users
            .get(&id)
            .map(|u| u.value().clone())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl OrganizationRoleLookup for InMemoryStore {
    async fn is_owner_or_above(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        Ok(self.owner_of(organization_id)? == user_id)
    }

    async fn is_manager_or_above(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        self.is_organization_staff(organization_id, user_id)
    }

    async fn assign_organization_manager(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        let _guard = self.role_writes.lock().await;
        self.owner_of(organization_id)?;
        if self.manages_location_in(organization_id, user_id) {
            return Err(StoreError::RoleConflict {
                user: user_id,
                organization: organization_id,
            });
        }
        self.organization_managers
            .entry(organization_id)
            .or_default()
            .insert(user_id);
        Ok(())
    }

    async fn remove_organization_manager(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        let _guard = self.role_writes.lock().await;
        self.owner_of(organization_id)?;
        if let Some(mut managers) = self.organization_managers.get_mut(&organization_id) {
            managers.remove(&user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl LocationRoleLookup for InMemoryStore {
    async fn is_location_manager(
        &self,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        self.organization_of(location_id)?;
        Ok(self
            .location_managers
            .get(&location_id)
            .is_some_and(|m| m.contains(&user_id)))
    }

    async fn manages_any_location_in(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        self.owner_of(organization_id)?;
        Ok(self.manages_location_in(organization_id, user_id))
    }

    async fn assign_location_manager(
        &self,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        let _guard = self.role_writes.lock().await;
        let organization_id = self.organization_of(location_id)?;
        if self.is_organization_staff(organization_id, user_id)? {
            return Err(StoreError::RoleConflict {
                user: user_id,
                organization: organization_id,
            });
        }
        self.location_managers
            .entry(location_id)
            .or_default()
            .insert(user_id);
        Ok(())
    }

    async fn remove_location_manager(
        &self,
        location_id: LocationId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        let _guard = self.role_writes.lock().await;
        self.organization_of(location_id)?;
        if let Some(mut managers) = self.location_managers.get_mut(&location_id) {
            managers.remove(&user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn create(&self, booking: Booking) -> Result<Booking, StoreError> {
        let rs = self.resource_bookings(booking.resource_id)?;
        let mut guard = rs.write().await;
        if booking.is_active() && find_conflict(guard.overlapping(&booking.span), &booking.span, None).is_some() {
            return Err(StoreError::Overlap {
                resource_id: booking.resource_id,
            });
        }
        self.claim_booking_id(&booking)?;
        guard.insert(booking.clone());
        Ok(booking)
    }

    async fn get_by_id(&self, id: BookingId) -> Result<Booking, StoreError> {
        let rs = self.booking_resource(id)?;
        let guard = rs.read().await;
        guard.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        let shards: Vec<SharedResourceBookings> = match filter.resource_id {
            Some(rid) => vec![self.resource_bookings(rid)?],
            None => self.bookings.iter().map(|e| e.value().clone()).collect(),
        };

        let mut found = Vec::new();
        for rs in shards {
            let guard = rs.read().await;
            match &filter.window {
                Some(window) => found.extend(guard.overlapping(window).filter(|b| filter.matches(b)).cloned()),
                None => found.extend(guard.bookings.iter().filter(|b| filter.matches(b)).cloned()),
            }
        }
        found.sort_by_key(|b| (b.span.start, b.id));
        Ok(found)
    }

    async fn update(&self, booking: Booking) -> Result<Booking, StoreError> {
        let rs = self.booking_resource(booking.id)?;
        let mut guard = rs.write().await;
        let resource_id = guard.get(booking.id).map(|b| b.resource_id).ok_or(StoreError::NotFound)?;
        if booking.resource_id != resource_id {
            return Err(StoreError::Unavailable("bookings cannot move between resources".into()));
        }
        if booking.is_active()
            && find_conflict(guard.overlapping(&booking.span), &booking.span, Some(booking.id)).is_some()
        {
            return Err(StoreError::Overlap { resource_id });
        }
        guard.remove(booking.id);
        guard.insert(booking.clone());
        Ok(booking)
    }

    async fn delete(&self, id: BookingId) -> Result<(), StoreError> {
        let rs = self.booking_resource(id)?;
        let mut guard = rs.write().await;
        guard.remove(id).ok_or(StoreError::NotFound)?;
        self.booking_to_resource.remove(&id);
        Ok(())
    }

    async fn has_overlap(
        &self,
        resource_id: ResourceId,
        span: &Span,
        exclude: Option<BookingId>,
    ) -> Result<bool, StoreError> {
        let rs = self.resource_bookings(resource_id)?;
        let guard = rs.read().await;
        Ok(find_conflict(guard.overlapping(span), span, exclude).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Utc};
    use ulid::Ulid;

    fn at(h: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2030, 6, 1, h, 0, 0).unwrap()
    }

    fn span(a: u32, b: u32) -> Span {
        Span::new(at(a), at(b)).unwrap()
    }

    struct Fixture {
        store: InMemoryStore,
        organization: OrganizationId,
        owner: UserId,
        location: LocationId,
        resource: ResourceId,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let owner = Ulid::new();
        let organization = Ulid::new();
        let location = Ulid::new();
        let resource = Ulid::new();
        store.insert_user(User { id: owner, is_system_admin: false });
        store.insert_organization(Organization { id: organization, owner_id: owner, name: None });
        store.insert_location(Location {
            id: location,
            organization_id: organization,
            opening_hours: OpeningHours::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            )
            .unwrap(),
            name: None,
        });
        store.insert_resource(Resource { id: resource, location_id: location, name: None });
        Fixture { store, organization, owner, location, resource }
    }

    fn booking(resource: ResourceId, s: Span) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: resource,
            user_id: Ulid::new(),
            span: s,
            status: BookingStatus::Pending,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    #[tokio::test]
    async fn create_rejects_overlap_at_write() {
        let f = fixture();
        f.store.create(booking(f.resource, span(10, 11))).await.unwrap();
        let err = f.store.create(booking(f.resource, span(10, 12))).await.unwrap_err();
        assert_eq!(err, StoreError::Overlap { resource_id: f.resource });
        f.store.create(booking(f.resource, span(11, 12))).await.unwrap();
    }

    #[tokio::test]
    async fn create_on_unknown_resource_is_not_found() {
        let f = fixture();
        let err = f.store.create(booking(Ulid::new(), span(10, 11))).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn update_excludes_self_and_keeps_order() {
        let f = fixture();
        let a = f.store.create(booking(f.resource, span(10, 11))).await.unwrap();
        let b = f.store.create(booking(f.resource, span(8, 9))).await.unwrap();

        let mut moved = a.clone();
        moved.span = span(10, 12);
        f.store.update(moved).await.unwrap();

        let mut clash = b.clone();
        clash.span = span(8, 11);
        assert_eq!(
            f.store.update(clash).await.unwrap_err(),
            StoreError::Overlap { resource_id: f.resource }
        );

        let listed = f.store.list(&BookingFilter::default()).await.unwrap();
        assert_eq!(listed.iter().map(|b| b.id).collect::<Vec<_>>(), vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn list_by_window_and_status() {
        let f = fixture();
        f.store.create(booking(f.resource, span(9, 10))).await.unwrap();
        let mut cancelled = booking(f.resource, span(12, 13));
        cancelled.status = BookingStatus::Cancelled;
        f.store.insert_booking(cancelled).await.unwrap();

        let active = f
            .store
            .list(&BookingFilter {
                resource_id: Some(f.resource),
                window: Some(span(9, 18)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let everything = f
            .store
            .list(&BookingFilter {
                resource_id: Some(f.resource),
                include_cancelled: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(everything.len(), 2);

        let late = f
            .store
            .list(&BookingFilter {
                window: Some(span(10, 12)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(late.is_empty());
    }

    #[tokio::test]
    async fn duplicate_booking_id_is_refused() {
        let f = fixture();
        let first = booking(f.resource, span(10, 11));
        f.store.insert_booking(first.clone()).await.unwrap();

        let mut twin = first.clone();
        twin.span = span(14, 15);
        assert!(matches!(
            f.store.insert_booking(twin.clone()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(f.store.create(twin).await, Err(StoreError::Unavailable(_))));

        // The original stays fully addressable and deletable
        f.store.delete(first.id).await.unwrap();
        assert!(!f.store.has_overlap(f.resource, &span(10, 11), None).await.unwrap());
        assert!(!f.store.has_overlap(f.resource, &span(14, 15), None).await.unwrap());
        assert!(f
            .store
            .list(&BookingFilter { include_cancelled: true, ..Default::default() })
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_removes_booking() {
        let f = fixture();
        let b = f.store.create(booking(f.resource, span(10, 11))).await.unwrap();
        f.store.delete(b.id).await.unwrap();
        assert_eq!(f.store.get_by_id(b.id).await.unwrap_err(), StoreError::NotFound);
        assert_eq!(f.store.delete(b.id).await.unwrap_err(), StoreError::NotFound);
        assert!(!f.store.has_overlap(f.resource, &span(10, 11), None).await.unwrap());
    }

    #[tokio::test]
    async fn role_writes_enforce_exclusion() {
        let f = fixture();
        let user = Ulid::new();
        f.store.assign_location_manager(f.location, user).await.unwrap();
        assert!(f.store.manages_any_location_in(f.organization, user).await.unwrap());
        assert_eq!(
            f.store.assign_organization_manager(f.organization, user).await.unwrap_err(),
            StoreError::RoleConflict { user, organization: f.organization }
        );
        assert!(matches!(
            f.store.assign_location_manager(f.location, f.owner).await,
            Err(StoreError::RoleConflict { .. })
        ));

        f.store.remove_location_manager(f.location, user).await.unwrap();
        f.store.assign_organization_manager(f.organization, user).await.unwrap();
        assert!(f.store.is_manager_or_above(f.organization, user).await.unwrap());
        assert!(!f.store.is_owner_or_above(f.organization, user).await.unwrap());
    }
}
