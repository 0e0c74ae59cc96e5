use crate::domain::{Actor, Booking, BookingStatus, Error, UserId};

/// How an actor relates to a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Admin,
    Owner,
    Renter,
}

/// `None` means the actor has no say over the booking at all.
pub fn party(actor: &Actor, booking: &Booking, car_owner: UserId) -> Option<Party> {
    if actor.is_admin() {
        Some(Party::Admin)
    } else if actor.id == car_owner {
        Some(Party::Owner)
    } else if actor.id == booking.renter_id {
        Some(Party::Renter)
    } else {
        None
    }
}

use BookingStatus::*;

const OWNER_OR_ADMIN: &[Party] = &[Party::Owner, Party::Admin];
const RENTER_OR_ADMIN: &[Party] = &[Party::Renter, Party::Admin];

const TRANSITIONS: [(BookingStatus, BookingStatus, &[Party]); 6] = [
    (Pending, Confirmed, OWNER_OR_ADMIN),
    (Pending, Cancelled, RENTER_OR_ADMIN),
    (Confirmed, Active, OWNER_OR_ADMIN),
    (Confirmed, Cancelled, OWNER_OR_ADMIN),
    (Active, Completed, OWNER_OR_ADMIN),
    (Active, Cancelled, OWNER_OR_ADMIN),
];

fn allowed_parties(from: BookingStatus, to: BookingStatus) -> Option<&'static [Party]> {
    TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, parties)| *parties)
}

/// Legality is decided before permission, so a renter asking for an
/// impossible move hears about the state, not about their role.
pub fn authorize(from: BookingStatus, to: BookingStatus, party: Party) -> Result<(), Error> {
    let parties = allowed_parties(from, to).ok_or(Error::InvalidStatusTransition { from, to })?;
    if parties.contains(&party) {
        return Ok(());
    }
    Err(Error::Forbidden(match (from, to) {
        (_, Confirmed) => "only the car owner or an admin may confirm a booking",
        (Pending, Cancelled) => "only the renter or an admin may cancel a pending booking",
        _ => "only the car owner or an admin may move this booking forward",
    }))
}
