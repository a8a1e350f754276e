use chrono::TimeDelta;

/// Longest single booking. Bookings live inside one day's opening hours.
pub const MAX_BOOKING_DURATION: TimeDelta = TimeDelta::hours(24);

/// How far ahead a booking may start.
pub const MAX_BOOKING_HORIZON: TimeDelta = TimeDelta::days(366);

/// Resource ids accepted by one multi-resource availability query.
pub const MAX_MULTI_RESOURCES: usize = 64;
