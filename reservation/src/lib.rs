mod manager;
mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

pub use memory::MemoryReservationStore;

pub type ReservationId = String;
pub type UserId = String;

/// Postgres-backed system of record for reservations.
#[derive(Debug)]
pub struct PgReservationStore {
    pool: PgPool,
}

/// The remote reservation collection. Implementations must enforce the
/// composite-key uniqueness of (date, time slot, room): `create` is a
/// conditional write that fails with [`abi::Error::SlotTaken`] when the key
/// is already held, so two racing clients cannot both succeed.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// create a reservation if its slot is still free; assigns the id
    async fn create(&self, rsvp: abi::Reservation) -> Result<abi::Reservation, abi::Error>;
    /// delete a reservation by id
    async fn delete(&self, id: ReservationId) -> Result<(), abi::Error>;
    /// update the display name only; owner and type never change
    async fn update_user_name(
        &self,
        id: ReservationId,
        user_name: String,
    ) -> Result<abi::Reservation, abi::Error>;
    /// get a reservation by id
    async fn get(&self, id: ReservationId) -> Result<abi::Reservation, abi::Error>;
    /// all reservations on one civil date
    async fn query_by_date(&self, date: NaiveDate) -> Result<Vec<abi::Reservation>, abi::Error>;
    /// all reservations in an inclusive civil date range
    async fn query_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<abi::Reservation>, abi::Error>;
    /// the role recorded for a user, if any
    async fn user_role(&self, user_id: &str) -> Result<Option<abi::Role>, abi::Error>;
}

/// The signed-in user of one session, as seen by the identity platform.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRef {
    pub id: UserId,
    pub display_name: String,
}

/// Session identity, resolved outside the scheduler and injected into it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// the currently signed-in user, if any
    async fn current_user(&self) -> Option<UserRef>;
    /// the signed-in user's role; `None` when no role is recorded
    async fn current_role(&self) -> Result<Option<abi::Role>, abi::Error>;
}
