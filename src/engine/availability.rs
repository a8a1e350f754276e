use chrono::{NaiveDate, TimeDelta};

use crate::model::*;

use super::BookingError;

// ── Availability Algorithm ────────────────────────────────────────

/// Free slots of one resource-day: the opening window minus every active
/// booking.
///
/// Bookings may arrive in any order and may overlap each other or spill
/// past the opening window. Output is ascending, non-overlapping and inside
/// the window; a fully booked day yields an empty list.
pub fn compute_availability(
    date: NaiveDate,
    opening_hours: &OpeningHours,
    bookings: &[Booking],
) -> Result<Vec<Slot>, BookingError> {
    let day = opening_hours.on(date)?;

    let mut active: Vec<&Span> = bookings
        .iter()
        .filter(|b| b.is_active())
        .map(|b| &b.span)
        .collect();
    active.sort_by_key(|s| s.start);

    let mut slots = Vec::new();
    let mut cur = day.start;

    for span in active {
        if span.end <= cur {
            // Swallowed by an earlier, wider booking.
            continue;
        }
        if span.start >= day.end {
            // Sorted by start: nothing later can reach back into the day.
            break;
        }
        let effective_start = span.start.max(cur);
        let effective_end = span.end.min(day.end);
        if effective_start > cur {
            slots.push(Slot {
                start: cur,
                end: effective_start,
            });
        }
        cur = cur.max(effective_end);
    }

    if cur < day.end {
        slots.push(Slot {
            start: cur,
            end: day.end,
        });
    }

    Ok(slots)
}

/// Drop slots shorter than `min_duration`.
pub fn retain_min_duration(slots: &mut Vec<Slot>, min_duration: Option<TimeDelta>) {
    if let Some(min) = min_duration {
        slots.retain(|s| s.duration() >= min);
    }
}

/// Sweep-line: ranges where at least `min_available` of the given per-resource
/// slot lists are free at the same time.
pub fn common_availability(per_resource: &[Vec<Slot>], min_available: usize) -> Vec<Slot> {
    if per_resource.is_empty() || min_available == 0 {
        return Vec::new();
    }

    // +1 at start, -1 at end; ends sort before starts at the same instant
    let mut events: Vec<(Timestamp, i32)> = Vec::new();
    for slots in per_resource {
        for s in slots {
            events.push((s.start, 1));
            events.push((s.end, -1));
        }
    }
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let threshold = min_available as i32;
    let mut result: Vec<Slot> = Vec::new();
    let mut count: i32 = 0;
    let mut seg_start: Option<Timestamp> = None;

    for (time, delta) in &events {
        let prev = count;
        count += delta;

        if prev < threshold && count >= threshold {
            seg_start = Some(*time);
        } else if prev >= threshold
            && count < threshold
            && let Some(start) = seg_start.take()
            && *time > start
        {
            // One resource's slot ending exactly where another's begins
            // leaves no gap: stitch it back on.
            match result.last_mut() {
                Some(last) if last.end == start => last.end = *time,
                _ => result.push(Slot { start, end: *time }),
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Utc};
    use ulid::Ulid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()
    }

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2030, 6, 1, h, m, 0).unwrap()
    }

    fn hours(start: u32, end: u32) -> OpeningHours {
        OpeningHours::new(
            NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn slot(a: (u32, u32), b: (u32, u32)) -> Slot {
        Slot {
            start: at(a.0, a.1),
            end: at(b.0, b.1),
        }
    }

    fn booking_at(start: Timestamp, end: Timestamp, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: Ulid::nil(),
            user_id: Ulid::new(),
            span: Span::new(start, end).unwrap(),
            status,
            created_at: start,
            updated_at: start,
        }
    }

    fn booking(a: (u32, u32), b: (u32, u32)) -> Booking {
        booking_at(at(a.0, a.1), at(b.0, b.1), BookingStatus::Confirmed)
    }

    #[test]
    fn empty_day_is_one_slot() {
        let slots = compute_availability(date(), &hours(9, 18), &[]).unwrap();
        assert_eq!(slots, vec![slot((9, 0), (18, 0))]);
    }

    #[test]
    fn one_booking_splits_the_day() {
        let slots =
            compute_availability(date(), &hours(9, 18), &[booking((12, 0), (13, 0))]).unwrap();
        assert_eq!(slots, vec![slot((9, 0), (12, 0)), slot((13, 0), (18, 0))]);
    }

    #[test]
    fn unsorted_input_matches_sorted() {
        let unsorted = [booking((14, 0), (16, 0)), booking((10, 0), (12, 0))];
        let sorted = [booking((10, 0), (12, 0)), booking((14, 0), (16, 0))];
        let expected = vec![
            slot((9, 0), (10, 0)),
            slot((12, 0), (14, 0)),
            slot((16, 0), (18, 0)),
        ];
        assert_eq!(compute_availability(date(), &hours(9, 18), &unsorted).unwrap(), expected);
        assert_eq!(compute_availability(date(), &hours(9, 18), &sorted).unwrap(), expected);
    }

    #[test]
    fn overlapping_bookings_are_swallowed() {
        let bookings = [
            booking((10, 0), (14, 0)),
            booking((11, 0), (12, 0)),
            booking((13, 0), (15, 0)),
        ];
        let slots = compute_availability(date(), &hours(9, 18), &bookings).unwrap();
        assert_eq!(slots, vec![slot((9, 0), (10, 0)), slot((15, 0), (18, 0))]);
    }

    #[test]
    fn full_day_booking_yields_nothing() {
        let slots =
            compute_availability(date(), &hours(9, 18), &[booking((9, 0), (18, 0))]).unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn inverted_or_empty_window_is_rejected() {
        let inverted = OpeningHours {
            start: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        assert!(matches!(
            compute_availability(date(), &inverted, &[booking((10, 0), (11, 0))]),
            Err(BookingError::InvalidTimeRange)
        ));

        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let empty = OpeningHours { start: nine, end: nine };
        assert!(matches!(
            compute_availability(date(), &empty, &[]),
            Err(BookingError::InvalidTimeRange)
        ));
    }

    #[test]
    fn cancelled_bookings_are_ignored() {
        let cancelled = booking_at(at(12, 0), at(13, 0), BookingStatus::Cancelled);
        let slots = compute_availability(date(), &hours(9, 18), &[cancelled]).unwrap();
        assert_eq!(slots, vec![slot((9, 0), (18, 0))]);
    }

    #[test]
    fn bookings_spilling_past_the_window_are_clamped() {
        let bookings = [
            booking((7, 0), (10, 0)),
            booking((17, 0), (20, 0)),
            booking((19, 0), (21, 0)),
        ];
        let slots = compute_availability(date(), &hours(9, 18), &bookings).unwrap();
        assert_eq!(slots, vec![slot((10, 0), (17, 0))]);
    }

    #[test]
    fn bookings_on_other_days_do_not_matter() {
        let yesterday = at(12, 0) - TimeDelta::days(1);
        let tomorrow = at(12, 0) + TimeDelta::days(1);
        let bookings = [
            booking_at(yesterday, yesterday + TimeDelta::hours(1), BookingStatus::Confirmed),
            booking_at(tomorrow, tomorrow + TimeDelta::hours(1), BookingStatus::Pending),
        ];
        let slots = compute_availability(date(), &hours(9, 18), &bookings).unwrap();
        assert_eq!(slots, vec![slot((9, 0), (18, 0))]);
    }

    #[test]
    fn back_to_back_bookings_leave_no_sliver() {
        let bookings = [booking((10, 0), (11, 0)), booking((11, 0), (12, 0))];
        let slots = compute_availability(date(), &hours(9, 18), &bookings).unwrap();
        assert_eq!(slots, vec![slot((9, 0), (10, 0)), slot((12, 0), (18, 0))]);
    }

    #[test]
    fn min_duration_filter() {
        let mut slots = vec![slot((9, 0), (9, 30)), slot((10, 0), (12, 0))];
        retain_min_duration(&mut slots, Some(TimeDelta::hours(1)));
        assert_eq!(slots, vec![slot((10, 0), (12, 0))]);
        retain_min_duration(&mut slots, None);
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn common_availability_any_one() {
        let a = vec![slot((9, 0), (10, 0))];
        let b = vec![slot((10, 0), (11, 0)), slot((14, 0), (15, 0))];
        let free = common_availability(&[a, b], 1);
        assert_eq!(free, vec![slot((9, 0), (11, 0)), slot((14, 0), (15, 0))]);
    }

    #[test]
    fn common_availability_needs_two() {
        let a = vec![slot((9, 0), (12, 0))];
        let b = vec![slot((11, 0), (13, 0))];
        let c = vec![slot((16, 0), (17, 0))];
        let free = common_availability(&[a, b, c], 2);
        assert_eq!(free, vec![slot((11, 0), (12, 0))]);
    }

    #[test]
    fn common_availability_degenerate_inputs() {
        assert!(common_availability(&[], 1).is_empty());
        assert!(common_availability(&[vec![slot((9, 0), (10, 0))]], 0).is_empty());
        assert!(common_availability(&[vec![slot((9, 0), (10, 0))]], 2).is_empty());
    }
}
