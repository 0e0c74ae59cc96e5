use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::money::Money;

pub type UserId = Uuid;
pub type CarId = Uuid;
pub type BookingId = Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("start date must not be in the past")]
    StartDateInPast,
    #[error("end date must be after the start date")]
    EndNotAfterStart,
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("car is not open for bookings")]
    CarNotAvailable,
    #[error("car has not been verified yet")]
    CarNotVerified,
    #[error("daily rate must be a positive amount")]
    InvalidDailyRate,
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
    #[error("booking amount is out of range")]
    AmountOverflow,
    #[error("booking dates can only change while the booking is pending")]
    DatesLocked,
    #[error("a {0} booking cannot be deleted")]
    NotDeletable(BookingStatus),
    #[error("unknown role `{0}`")]
    UnknownRole(String),
    #[error("unknown booking status `{0}`")]
    UnknownStatus(String),
    #[error("cannot move a booking from {from} to {to}")]
    InvalidStatusTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("owners cannot book their own car")]
    OwnCar,
    #[error("{0}")]
    Forbidden(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Seller,
    Buyer,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Seller => "seller",
            Role::Buyer => "buyer",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "seller" | "owner" => Ok(Role::Seller),
            "buyer" | "renter" => Ok(Role::Buyer),
            _ => Err(Error::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller, as vouched for by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A rental window with `end` strictly after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(rename = "startDate")]
    start: DateTime<Utc>,
    #[serde(rename = "endDate")]
    end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, Error> {
        if end <= start {
            return Err(Error::EndNotAfterStart);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Inclusive on both ends: a range ending at `t` collides with one
    /// starting at `t`.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Active,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    /// Statuses that hold the car and therefore block other bookings.
    pub const BLOCKING: [BookingStatus; 2] = [BookingStatus::Confirmed, BookingStatus::Active];

    pub const fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_blocking(self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Active)
    }

    pub const fn is_deletable(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Cancelled)
    }
}

impl FromStr for BookingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: CarId,
    pub owner_id: UserId,
    pub plate_number: String,
    pub make: String,
    pub model: String,
    pub location: String,
    pub daily_rate: Money,
    pub is_available: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub car_id: CarId,
    pub renter_id: UserId,
    #[serde(flatten)]
    pub period: DateRange,
    pub total_amount: Money,
    pub status: BookingStatus,
    pub pickup_location: String,
    pub dropoff_location: Option<String>,
    pub special_requests: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every stored write; updates compare against it.
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarSummary {
    pub id: CarId,
    pub plate_number: String,
    pub make: String,
    pub model: String,
    pub location: String,
    pub daily_rate: Money,
}

impl From<&Car> for CarSummary {
    fn from(car: &Car) -> Self {
        Self {
            id: car.id,
            plate_number: car.plate_number.clone(),
            make: car.make.clone(),
            model: car.model.clone(),
            location: car.location.clone(),
            daily_rate: car.daily_rate,
        }
    }
}

/// A booking joined with the summaries callers need to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub car: CarSummary,
    pub renter: Option<UserSummary>,
}

impl BookingView {
    pub fn new(booking: Booking, car: &Car, renter: Option<UserSummary>) -> Self {
        Self {
            booking,
            car: CarSummary::from(car),
            renter,
        }
    }
}
