use std::sync::Arc;

use chrono::Utc;

use crate::limits::*;
use crate::model::*;
use crate::repository::BookingRepository;

use super::BookingError;

pub(crate) fn now() -> Timestamp {
    Utc::now()
}

/// Checks every proposed interval goes through before the conflict check.
pub(crate) fn validate_span(span: &Span, now: Timestamp) -> Result<(), BookingError> {
    if span.start < now {
        return Err(BookingError::StartTimePast);
    }
    if span.duration() > MAX_BOOKING_DURATION {
        return Err(BookingError::LimitExceeded("booking too long"));
    }
    if span.start - now > MAX_BOOKING_HORIZON {
        return Err(BookingError::LimitExceeded("booking starts too far ahead"));
    }
    Ok(())
}

/// First active booking overlapping `candidate`, skipping `exclude`.
/// Callers pass bookings of a single resource.
pub fn find_conflict<'a, I>(bookings: I, candidate: &Span, exclude: Option<BookingId>) -> Option<&'a Booking>
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings.into_iter().find(|b| {
        b.is_active() && Some(b.id) != exclude && b.span.overlaps(candidate)
    })
}

/// Decides whether a proposed interval collides with what is already booked
/// on a resource. The data set is live: a `false` here is only a pre-check,
/// the repository re-checks atomically with the write.
#[derive(Clone)]
pub struct ConflictDetector {
    bookings: Arc<dyn BookingRepository>,
}

impl ConflictDetector {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }

    pub async fn has_conflict(
        &self,
        resource_id: ResourceId,
        candidate: &Span,
        exclude: Option<BookingId>,
    ) -> Result<bool, BookingError> {
        self.bookings
            .has_overlap(resource_id, candidate, exclude)
            .await
            .map_err(|e| BookingError::from_store(e, || BookingError::ResourceNotFound(resource_id)))
    }

    pub(crate) async fn check_no_conflict(
        &self,
        resource_id: ResourceId,
        candidate: &Span,
        exclude: Option<BookingId>,
    ) -> Result<(), BookingError> {
        if self.has_conflict(resource_id, candidate, exclude).await? {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL, "stage" => "precheck")
                .increment(1);
            return Err(BookingError::TimeConflict(resource_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use ulid::Ulid;

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2030, 6, 1, h, m, 0).unwrap()
    }

    fn span(a: (u32, u32), b: (u32, u32)) -> Span {
        Span::new(at(a.0, a.1), at(b.0, b.1)).unwrap()
    }

    fn booking(s: Span, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: Ulid::nil(),
            user_id: Ulid::new(),
            span: s,
            status,
            created_at: at(0, 0),
            updated_at: at(0, 0),
        }
    }

    #[test]
    fn touching_endpoints_do_not_conflict() {
        let existing = [booking(span((10, 0), (11, 0)), BookingStatus::Confirmed)];
        assert!(find_conflict(&existing, &span((11, 0), (12, 0)), None).is_none());
        assert!(find_conflict(&existing, &span((9, 0), (10, 0)), None).is_none());
    }

    #[test]
    fn partial_overlap_conflicts() {
        let existing = [booking(span((10, 0), (11, 0)), BookingStatus::Confirmed)];
        let hit = find_conflict(&existing, &span((10, 30), (11, 30)), None);
        assert_eq!(hit.map(|b| b.id), Some(existing[0].id));
    }

    #[test]
    fn pending_blocks_like_confirmed() {
        let existing = [booking(span((10, 0), (11, 0)), BookingStatus::Pending)];
        assert!(find_conflict(&existing, &span((10, 15), (10, 45)), None).is_some());
    }

    #[test]
    fn cancelled_never_conflicts() {
        let existing = [booking(span((10, 0), (11, 0)), BookingStatus::Cancelled)];
        assert!(find_conflict(&existing, &span((10, 0), (11, 0)), None).is_none());
    }

    #[test]
    fn excluded_booking_does_not_conflict_with_itself() {
        let existing = [booking(span((10, 0), (11, 0)), BookingStatus::Confirmed)];
        let moved = span((10, 30), (11, 30));
        assert!(find_conflict(&existing, &moved, Some(existing[0].id)).is_none());
        assert!(find_conflict(&existing, &moved, Some(Ulid::new())).is_some());
    }

    #[test]
    fn empty_set_has_no_conflict() {
        let none: [Booking; 0] = [];
        assert!(find_conflict(&none, &span((10, 0), (11, 0)), None).is_none());
    }

    #[test]
    fn validate_rejects_past_start() {
        let now = at(12, 0);
        assert!(matches!(
            validate_span(&span((11, 0), (13, 0)), now),
            Err(BookingError::StartTimePast)
        ));
        assert!(validate_span(&span((12, 0), (13, 0)), now).is_ok());
    }

    #[test]
    fn validate_enforces_limits() {
        let now = at(0, 0);
        let long = Span::new(at(1, 0), at(1, 0) + TimeDelta::hours(25)).unwrap();
        assert!(matches!(
            validate_span(&long, now),
            Err(BookingError::LimitExceeded(_))
        ));
        let far = Span::new(
            now + TimeDelta::days(400),
            now + TimeDelta::days(400) + TimeDelta::hours(1),
        )
        .unwrap();
        assert!(matches!(
            validate_span(&far, now),
            Err(BookingError::LimitExceeded(_))
        ));
    }
}
