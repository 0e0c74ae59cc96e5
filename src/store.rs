use async_trait::async_trait;

use crate::domain::{Actor, Booking, BookingId, BookingStatus, Car, CarId, DateRange, UserId, UserSummary};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("booking {0} already holds the car for an overlapping period")]
    Overlap(BookingId),
    #[error("duplicate key `{0}`")]
    DuplicateKey(String),
    #[error("car {0} does not exist")]
    MissingCar(CarId),
    #[error("booking {0} changed since it was read")]
    Stale(BookingId),
    #[error("stored row is invalid: {0}")]
    Corrupt(String),
    #[cfg(test)]
    #[error("store lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Database(sqlx::Error),
}

/// Whether a booking write must first prove the car is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapGuard {
    Skip,
    Enforce,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub car_id: Option<CarId>,
    /// Renter of the booking or owner of its car.
    pub participant: Option<UserId>,
    pub statuses: Vec<BookingStatus>,
    pub overlapping: Option<DateRange>,
}

impl BookingFilter {
    pub fn blocking(car_id: CarId, period: DateRange) -> Self {
        Self {
            car_id: Some(car_id),
            participant: None,
            statuses: BookingStatus::BLOCKING.to_vec(),
            overlapping: Some(period),
        }
    }
}

/// Persistence for cars and bookings.
///
/// Guarded writes run the overlap check and the write as one unit, so two
/// requests for the same car can never both pass the check.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn car(&self, id: CarId) -> Result<Option<Car>, StoreError>;

    async fn insert_car(&self, car: &Car) -> Result<(), StoreError>;

    async fn update_car(&self, car: &Car) -> Result<(), StoreError>;

    async fn user(&self, id: UserId) -> Result<Option<UserSummary>, StoreError>;

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError>;

    /// Inserts `booking` unless a blocking booking overlaps it.
    async fn insert_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Replaces the stored booking if its version is still `expected`.
    /// `booking.version` is the version written.
    async fn update_booking(
        &self,
        booking: &Booking,
        expected: i64,
        guard: OverlapGuard,
    ) -> Result<(), StoreError>;

    /// Deletes the booking if its stored status is one of `statuses`.
    /// Returns whether a row was removed.
    async fn delete_booking(
        &self,
        id: BookingId,
        statuses: &[BookingStatus],
    ) -> Result<bool, StoreError>;
}

/// Resolves a bearer token to the caller behind it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identify(&self, token: &str) -> Result<Option<Actor>, StoreError>;
}
