use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::BookingError;

/// UTC instant. The only timestamp type.
pub type Timestamp = DateTime<Utc>;

pub type BookingId = Ulid;
pub type ResourceId = Ulid;
pub type LocationId = Ulid;
pub type OrganizationId = Ulid;
pub type UserId = Ulid;

/// Half-open interval `[start, end)`. Never empty, never inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SpanParts")]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Deserialize)]
struct SpanParts {
    start: Timestamp,
    end: Timestamp,
}

impl TryFrom<SpanParts> for Span {
    type Error = BookingError;

    fn try_from(parts: SpanParts) -> Result<Self, Self::Error> {
        Span::new(parts.start, parts.end)
    }
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, BookingError> {
        if start >= end {
            return Err(BookingError::InvalidTimeRange);
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Truncate to `bounds`. `None` when nothing of `self` lies inside them.
    pub fn clamp_to(&self, bounds: &Span) -> Option<Span> {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        (start < end).then_some(Span { start, end })
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 3] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(BookingError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub resource_id: ResourceId,
    pub user_id: UserId,
    pub span: Span,
    pub status: BookingStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Booking {
    /// Cancelled bookings stay on record but block nothing.
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

// ── Locations and opening hours ──────────────────────────────────

/// Single contiguous daily window. No overnight wrap-around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OpeningHoursParts")]
pub struct OpeningHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Deserialize)]
struct OpeningHoursParts {
    start: NaiveTime,
    end: NaiveTime,
}

impl TryFrom<OpeningHoursParts> for OpeningHours {
    type Error = BookingError;

    fn try_from(parts: OpeningHoursParts) -> Result<Self, Self::Error> {
        OpeningHours::new(parts.start, parts.end)
    }
}

impl OpeningHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, BookingError> {
        if start >= end {
            return Err(BookingError::InvalidTimeRange);
        }
        Ok(Self { start, end })
    }

    /// Normalize the window onto `date` (UTC).
    pub fn on(&self, date: NaiveDate) -> Result<Span, BookingError> {
        Span::new(
            date.and_time(self.start).and_utc(),
            date.and_time(self.end).and_utc(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub location_id: LocationId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub organization_id: OrganizationId,
    pub opening_hours: OpeningHours,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub owner_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub is_system_admin: bool,
}

// ── Availability ─────────────────────────────────────────────────

/// A free sub-interval of a resource's opening hours. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Slot {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl From<Span> for Slot {
    fn from(span: Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
        }
    }
}

// ── Authorization ────────────────────────────────────────────────

/// The caller of an operation. Organization and location roles are
/// relationships looked up on demand, not attributes carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub is_system_admin: bool,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_system_admin: false,
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            is_system_admin: user.is_system_admin,
        }
    }
}

/// Role precedence, least to most powerful. `Ord` follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    BookingOwner,
    LocationManager,
    OrganizationManager,
    OrganizationOwner,
    SystemAdmin,
}

impl Role {
    /// Status transitions a holder of this role may apply to a booking.
    pub fn allowed_transitions(&self) -> &'static [BookingStatus] {
        match self {
            Role::BookingOwner => &[BookingStatus::Cancelled],
            Role::LocationManager
            | Role::OrganizationManager
            | Role::OrganizationOwner
            | Role::SystemAdmin => &BookingStatus::ALL,
        }
    }}

/// Outcome of a booking mutation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Strongest role that granted access, `None` when denied.
    pub role: Option<Role>,
    pub allowed_transitions: &'static [BookingStatus],
}

impl Decision {
    pub fn deny() -> Self {
        Self {
            allowed: false,
            role: None,
            allowed_transitions: &[],
        }
    }

    pub fn grant(role: Role) -> Self {
        Self {
            allowed: true,
            role: Some(role),
            allowed_transitions: role.allowed_transitions(),
        }
    }

    pub fn permits_transition(&self, status: BookingStatus) -> bool {
        self.allowed && self.allowed_transitions.contains(&status)
    }}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBooking {
    pub resource_id: ResourceId,
    pub span: Span,
    /// Book for someone else. Staff only.
    #[serde(default)]
    pub on_behalf_of: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBooking {
    #[serde(default)]
    pub span: Option<Span>,
    #[serde(default)]
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub resource_id: Option<ResourceId>,
    pub user_id: Option<UserId>,
    /// Only bookings overlapping this window.
    pub window: Option<Span>,
    pub include_cancelled: bool,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        if !self.include_cancelled && !booking.is_active() {
            return false;
        }
        if self.resource_id.is_some_and(|rid| rid != booking.resource_id) {
            return false;
        }
        if self.user_id.is_some_and(|uid| uid != booking.user_id) {
            return false;
        }
        self.window.is_none_or(|w| w.overlaps(&booking.span))
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Committed booking changes, broadcast per resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    BookingRescheduled {
        id: BookingId,
        resource_id: ResourceId,
        from: Span,
        to: Span,
    },
    BookingStatusChanged {
        id: BookingId,
        resource_id: ResourceId,
        from: BookingStatus,
        to: BookingStatus,
    },
    BookingDeleted {
        id: BookingId,
        resource_id: ResourceId,
    },
}

impl Event {
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Event::BookingCreated { booking } => booking.resource_id,
            Event::BookingRescheduled { resource_id, .. }
            | Event::BookingStatusChanged { resource_id, .. }
            | Event::BookingDeleted { resource_id, .. } => *resource_id,
        }
    }
}
