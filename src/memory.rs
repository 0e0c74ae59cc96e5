//! In-process store used by the test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::availability;
use crate::domain::{
    Actor, Booking, BookingId, BookingStatus, Car, CarId, Role, UserId, UserSummary,
};
use crate::money::Money;
use crate::store::{BookingFilter, BookingStore, IdentityProvider, OverlapGuard, StoreError};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, (UserSummary, Role)>,
    tokens: HashMap<String, UserId>,
    cars: HashMap<CarId, Car>,
    bookings: HashMap<BookingId, Booking>,
}

/// All tables sit behind one mutex, which makes every guarded write atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    broken_users: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Registers a user and returns the actor the given token resolves to.
    pub fn add_user(&self, name: &str, role: Role, token: &str) -> Actor {
        let id = Uuid::new_v4();
        let summary = UserSummary {
            id,
            display_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
        };
        let mut tables = self.tables.lock().unwrap();
        tables.users.insert(id, (summary, role));
        tables.tokens.insert(token.to_string(), id);
        Actor { id, role }
    }

    pub fn put_car(&self, car: Car) {
        self.tables.lock().unwrap().cars.insert(car.id, car);
    }

    /// Stores a booking as-is, skipping every check.
    pub fn put_booking(&self, booking: Booking) {
        self.tables.lock().unwrap().bookings.insert(booking.id, booking);
    }

    /// Makes every later `user` lookup fail.
    pub fn fail_user_lookups(&self) {
        self.broken_users.store(true, Ordering::SeqCst);
    }

    pub fn all_bookings(&self) -> Vec<Booking> {
        self.tables.lock().unwrap().bookings.values().cloned().collect()
    }

    fn ensure_free(tables: &Tables, booking: &Booking) -> Result<(), StoreError> {
        if !tables.cars.contains_key(&booking.car_id) {
            return Err(StoreError::MissingCar(booking.car_id));
        }
        match availability::find_conflict(
            tables.bookings.values(),
            booking.car_id,
            &booking.period,
            Some(booking.id),
        ) {
            Some(existing) => Err(StoreError::Overlap(existing.id)),
            None => Ok(()),
        }
    }
}

fn selects(filter: &BookingFilter, tables: &Tables, booking: &Booking) -> bool {
    let owner = tables.cars.get(&booking.car_id).map(|car| car.owner_id);
    filter.car_id.map_or(true, |id| booking.car_id == id)
        && filter
            .participant
            .map_or(true, |user| booking.renter_id == user || owner == Some(user))
        && (filter.statuses.is_empty() || filter.statuses.contains(&booking.status))
        && filter
            .overlapping
            .map_or(true, |period| booking.period.overlaps(&period))
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn car(&self, id: CarId) -> Result<Option<Car>, StoreError> {
        Ok(self.tables()?.cars.get(&id).cloned())
    }

    async fn insert_car(&self, car: &Car) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables.cars.values().any(|c| c.plate_number == car.plate_number) {
            return Err(StoreError::DuplicateKey("car_plate_number_key".into()));
        }
        tables.cars.insert(car.id, car.clone());
        Ok(())
    }

    async fn update_car(&self, car: &Car) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables
            .cars
            .values()
            .any(|c| c.id != car.id && c.plate_number == car.plate_number)
        {
            return Err(StoreError::DuplicateKey("car_plate_number_key".into()));
        }
        match tables.cars.get_mut(&car.id) {
            Some(stored) => {
                *stored = car.clone();
                Ok(())
            }
            None => Err(StoreError::MissingCar(car.id)),
        }
    }

    async fn user(&self, id: UserId) -> Result<Option<UserSummary>, StoreError> {
        if self.broken_users.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt(format!("user {id} is unreadable")));
        }
        Ok(self.tables()?.users.get(&id).map(|(summary, _)| summary.clone()))
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.tables()?.bookings.get(&id).cloned())
    }

    async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        let tables = self.tables()?;
        let mut found: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|booking| selects(filter, &tables, booking))
            .cloned()
            .collect();
        found.sort_by_key(|booking| (booking.period.start(), booking.created_at));
        Ok(found)
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        Self::ensure_free(&tables, booking)?;
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(
        &self,
        booking: &Booking,
        expected: i64,
        guard: OverlapGuard,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if guard == OverlapGuard::Enforce {
            Self::ensure_free(&tables, booking)?;
        }
        match tables.bookings.get_mut(&booking.id) {
            Some(stored) if stored.version == expected => {
                *stored = booking.clone();
                Ok(())
            }
            _ => Err(StoreError::Stale(booking.id)),
        }
    }

    async fn delete_booking(
        &self,
        id: BookingId,
        statuses: &[BookingStatus],
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let deletable = tables
            .bookings
            .get(&id)
            .map_or(false, |booking| statuses.contains(&booking.status));
        if deletable {
            tables.bookings.remove(&id);
        }
        Ok(deletable)
    }
}

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn identify(&self, token: &str) -> Result<Option<Actor>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .tokens
            .get(token)
            .and_then(|id| tables.users.get(id))
            .map(|(summary, role)| Actor {
                id: summary.id,
                role: *role,
            }))
    }
}

/// Midnight UTC on the given day.
pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// A listed, verified and available car.
pub fn car(owner: UserId, daily_rate_major: i64) -> Car {
    let listed = day(2024, 1, 1);
    Car {
        id: Uuid::new_v4(),
        owner_id: owner,
        plate_number: format!("LAG-{}", &Uuid::new_v4().simple().to_string()[..6]),
        make: "Toyota".into(),
        model: "Corolla".into(),
        location: "Lagos".into(),
        daily_rate: Money::from_major(daily_rate_major).unwrap(),
        is_available: true,
        is_verified: true,
        created_at: listed,
        updated_at: listed,
    }
}
