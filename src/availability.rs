use crate::domain::{Booking, BookingId, CarId, DateRange};

/// First booking that holds `car_id` during `period`, ignoring `exclude`.
///
/// Only confirmed and active bookings hold a car; pending, completed and
/// cancelled ones never block.
pub fn find_conflict<'a, I>(
    bookings: I,
    car_id: CarId,
    period: &DateRange,
    exclude: Option<BookingId>,
) -> Option<&'a Booking>
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings.into_iter().find(|booking| {
        booking.car_id == car_id
            && booking.status.is_blocking()
            && Some(booking.id) != exclude
            && booking.period.overlaps(period)
    })
}

pub fn is_available<'a, I>(
    bookings: I,
    car_id: CarId,
    period: &DateRange,
    exclude: Option<BookingId>,
) -> bool
where
    I: IntoIterator<Item = &'a Booking>,
{
    find_conflict(bookings, car_id, period, exclude).is_none()
}
