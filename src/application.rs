use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::availability;
use crate::clock::Clock;
use crate::domain::{
    self, Actor, Booking, BookingId, BookingStatus, BookingView, Car, CarId, DateRange,
    Role,
};
use crate::money::Money;
use crate::pricing;
use crate::store::{BookingFilter, BookingStore, IdentityProvider, OverlapGuard, StoreError};
use crate::transitions;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Domain(#[from] domain::Error),
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("the car is already booked for the requested dates")]
    DatesNotAvailable,
    #[error("`{0}` is already taken")]
    DuplicateKey(String),
    #[error("the booking was changed by someone else, reload it and try again")]
    Conflict,
    #[error("internal error")]
    Internal(#[source] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidStatusTransition,
    DatesNotAvailable,
    DuplicateKey,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidStatusTransition => "InvalidStatusTransition",
            ErrorKind::DatesNotAvailable => "DatesNotAvailable",
            ErrorKind::DuplicateKey => "DuplicateKey",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Domain(domain::Error::OwnCar | domain::Error::Forbidden(_)) => ErrorKind::Forbidden,
            Error::Domain(domain::Error::InvalidStatusTransition { .. }) => {
                ErrorKind::InvalidStatusTransition
            }
            Error::Domain(_) => ErrorKind::Validation,
            Error::Unauthenticated => ErrorKind::Unauthenticated,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::DatesNotAvailable => ErrorKind::DatesNotAvailable,
            Error::DuplicateKey(_) => ErrorKind::DuplicateKey,
            Error::Conflict => ErrorKind::Conflict,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Overlap(_) => Error::DatesNotAvailable,
            StoreError::DuplicateKey(key) => Error::DuplicateKey(key),
            StoreError::MissingCar(_) => Error::NotFound("car"),
            StoreError::Stale(_) => Error::Conflict,
            other => {
                error!(error = %other, "storage failure");
                Error::Internal(other)
            }
        }
    }
}

fn forbidden(reason: &'static str) -> Error {
    Error::Domain(domain::Error::Forbidden(reason))
}

fn require_text(value: &str, field: &'static str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(domain::Error::MissingField(field).into());
    }
    Ok(())
}

/// The booking lifecycle service.
#[derive(Clone)]
pub struct Application {
    store: Arc<dyn BookingStore>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
}

impl Application {
    pub fn new(
        store: Arc<dyn BookingStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            identity,
            clock,
        }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Actor, Error> {
        let token = token.ok_or(Error::Unauthenticated)?;
        self.identity
            .identify(token)
            .await?
            .ok_or(Error::Unauthenticated)
    }

    #[instrument(skip_all, fields(actor = %actor.id, car = %command.car_id))]
    pub async fn create_booking(
        &self,
        actor: &Actor,
        command: CreateBooking,
    ) -> Result<BookingView, Error> {
        let now = self.clock.now();
        if command.start_date < now {
            return Err(domain::Error::StartDateInPast.into());
        }
        let period = DateRange::new(command.start_date, command.end_date)?;
        require_text(&command.pickup_location, "pickupLocation")?;

        let car = self.load_car(command.car_id).await?;
        if !car.is_available {
            return Err(domain::Error::CarNotAvailable.into());
        }
        if !car.is_verified {
            return Err(domain::Error::CarNotVerified.into());
        }
        if car.owner_id == actor.id {
            return Err(domain::Error::OwnCar.into());
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            car_id: car.id,
            renter_id: actor.id,
            period,
            total_amount: pricing::amount(&period, car.daily_rate)?,
            status: BookingStatus::Pending,
            pickup_location: command.pickup_location,
            dropoff_location: command.dropoff_location,
            special_requests: command.special_requests,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let renter = self.store.user(actor.id).await?;
        self.store.insert_booking(&booking).await?;

        info!(booking = %booking.id, total = %booking.total_amount, "booking created");
        Ok(BookingView::new(booking, &car, renter))
    }

    #[instrument(skip_all, fields(actor = %actor.id, booking = %id))]
    pub async fn update_booking(
        &self,
        actor: &Actor,
        id: BookingId,
        changes: UpdateBooking,
    ) -> Result<BookingView, Error> {
        let booking = self.load_booking(id).await?;
        let car = self.load_car(booking.car_id).await?;
        let party = transitions::party(actor, &booking, car.owner_id).ok_or_else(|| {
            forbidden("only the renter, the car owner or an admin may change this booking")
        })?;

        let now = self.clock.now();
        let mut next = booking.clone();

        if let Some(to) = changes.status {
            transitions::authorize(booking.status, to, party)?;
            next.status = to;
        }

        let dates_changed = changes.start_date.is_some() || changes.end_date.is_some();
        if dates_changed {
            if booking.status != BookingStatus::Pending {
                return Err(domain::Error::DatesLocked.into());
            }
            let start = changes.start_date.unwrap_or(booking.period.start());
            let end = changes.end_date.unwrap_or(booking.period.end());
            if changes.start_date.is_some() && start < now {
                return Err(domain::Error::StartDateInPast.into());
            }
            next.period = DateRange::new(start, end)?;
            next.total_amount = pricing::amount(&next.period, car.daily_rate)?;
        }

        if let Some(pickup) = changes.pickup_location {
            require_text(&pickup, "pickupLocation")?;
            next.pickup_location = pickup;
        }
        if let Some(dropoff) = changes.dropoff_location {
            next.dropoff_location = Some(dropoff).filter(|d| !d.trim().is_empty());
        }
        if let Some(requests) = changes.special_requests {
            next.special_requests = Some(requests).filter(|r| !r.trim().is_empty());
        }

        // A booking on its way out (cancelled) never needs the car to be free.
        let holds_dates = next.status == BookingStatus::Pending || next.status.is_blocking();
        let enters_blocking = !booking.status.is_blocking() && next.status.is_blocking();
        let guard = if holds_dates && (enters_blocking || dates_changed) {
            OverlapGuard::Enforce
        } else {
            OverlapGuard::Skip
        };

        next.updated_at = now;
        next.version = booking.version + 1;
        let renter = self.store.user(booking.renter_id).await?;
        self.store.update_booking(&next, booking.version, guard).await?;

        info!(booking = %next.id, from = %booking.status, to = %next.status, "booking updated");
        Ok(BookingView::new(next, &car, renter))
    }

    #[instrument(skip_all, fields(actor = %actor.id, booking = %id))]
    pub async fn delete_booking(&self, actor: &Actor, id: BookingId) -> Result<(), Error> {
        let booking = self.load_booking(id).await?;
        if !actor.is_admin() && actor.id != booking.renter_id {
            return Err(forbidden("only the renter or an admin may delete a booking"));
        }
        if !booking.status.is_deletable() {
            return Err(domain::Error::NotDeletable(booking.status).into());
        }

        let deletable = [BookingStatus::Pending, BookingStatus::Cancelled];
        if !self.store.delete_booking(id, &deletable).await? {
            // The status moved on between the read and the delete.
            let current = self.load_booking(id).await?;
            return Err(domain::Error::NotDeletable(current.status).into());
        }

        info!(booking = %id, "booking deleted");
        Ok(())
    }

    pub async fn booking(&self, actor: &Actor, id: BookingId) -> Result<BookingView, Error> {
        let booking = self.load_booking(id).await?;
        let car = self.load_car(booking.car_id).await?;
        if transitions::party(actor, &booking, car.owner_id).is_none() {
            return Err(forbidden("only the renter, the car owner or an admin may view this booking"));
        }
        let renter = self.store.user(booking.renter_id).await?;
        Ok(BookingView::new(booking, &car, renter))
    }

    /// Admins see every booking; everybody else sees the bookings they rent
    /// and the bookings on cars they own.
    pub async fn bookings(&self, actor: &Actor, query: BookingQuery) -> Result<Vec<Booking>, Error> {
        let filter = BookingFilter {
            car_id: query.car_id,
            participant: (!actor.is_admin()).then_some(actor.id),
            statuses: query.status.into_iter().collect(),
            overlapping: None,
        };
        Ok(self.store.bookings(&filter).await?)
    }

    /// Whether `car_id` is free for `period`, ignoring `exclude`.
    pub async fn is_available(
        &self,
        car_id: CarId,
        period: DateRange,
        exclude: Option<BookingId>,
    ) -> Result<bool, Error> {
        self.load_car(car_id).await?;
        let candidates = self
            .store
            .bookings(&BookingFilter::blocking(car_id, period))
            .await?;
        Ok(availability::is_available(&candidates, car_id, &period, exclude))
    }

    #[instrument(skip_all, fields(actor = %actor.id))]
    pub async fn register_car(&self, actor: &Actor, command: RegisterCar) -> Result<Car, Error> {
        if actor.role == Role::Buyer {
            return Err(forbidden("only sellers and admins may list cars"));
        }
        require_text(&command.plate_number, "plateNumber")?;
        require_text(&command.location, "location")?;
        if !command.daily_rate.is_positive() {
            return Err(domain::Error::InvalidDailyRate.into());
        }

        let now = self.clock.now();
        let car = Car {
            id: Uuid::new_v4(),
            owner_id: actor.id,
            plate_number: command.plate_number.trim().to_uppercase(),
            make: command.make,
            model: command.model,
            location: command.location,
            daily_rate: command.daily_rate,
            is_available: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_car(&car).await?;

        info!(car = %car.id, plate = %car.plate_number, "car listed");
        Ok(car)
    }

    /// Owner edits to the listing details send the car back for verification;
    /// toggling availability does not.
    #[instrument(skip_all, fields(actor = %actor.id, car = %id))]
    pub async fn update_car(
        &self,
        actor: &Actor,
        id: CarId,
        changes: UpdateCar,
    ) -> Result<Car, Error> {
        let mut car = self.load_car(id).await?;
        if !actor.is_admin() && actor.id != car.owner_id {
            return Err(forbidden("only the owner or an admin may edit this car"));
        }

        let mut listing_changed = false;
        if let Some(rate) = changes.daily_rate {
            if !rate.is_positive() {
                return Err(domain::Error::InvalidDailyRate.into());
            }
            listing_changed |= rate != car.daily_rate;
            car.daily_rate = rate;
        }
        if let Some(location) = changes.location {
            require_text(&location, "location")?;
            listing_changed |= location != car.location;
            car.location = location;
        }
        if let Some(make) = changes.make {
            listing_changed |= make != car.make;
            car.make = make;
        }
        if let Some(model) = changes.model {
            listing_changed |= model != car.model;
            car.model = model;
        }
        if let Some(available) = changes.is_available {
            car.is_available = available;
        }
        if listing_changed && !actor.is_admin() {
            car.is_verified = false;
        }

        car.updated_at = self.clock.now();
        self.store.update_car(&car).await?;

        info!(car = %car.id, verified = car.is_verified, "car updated");
        Ok(car)
    }

    #[instrument(skip_all, fields(actor = %actor.id, car = %id))]
    pub async fn verify_car(&self, actor: &Actor, id: CarId, verified: bool) -> Result<Car, Error> {
        if !actor.is_admin() {
            return Err(forbidden("only admins may verify cars"));
        }
        let mut car = self.load_car(id).await?;
        car.is_verified = verified;
        car.updated_at = self.clock.now();
        self.store.update_car(&car).await?;

        info!(car = %car.id, verified, "car verification changed");
        Ok(car)
    }

    async fn load_car(&self, id: CarId) -> Result<Car, Error> {
        self.store.car(id).await?.ok_or(Error::NotFound("car"))
    }

    async fn load_booking(&self, id: BookingId) -> Result<Booking, Error> {
        self.store.booking(id).await?.ok_or(Error::NotFound("booking"))
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub car_id: CarId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub pickup_location: String,
    pub dropoff_location: Option<String>,
    pub special_requests: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBooking {
    pub status: Option<BookingStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub special_requests: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuery {
    pub car_id: Option<CarId>,
    pub status: Option<BookingStatus>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCar {
    pub plate_number: String,
    pub make: String,
    pub model: String,
    pub location: String,
    pub daily_rate: Money,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCar {
    pub daily_rate: Option<Money>,
    pub location: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCar {
    pub verified: bool,
}
