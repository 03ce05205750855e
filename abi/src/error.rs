use thiserror::Error;

use crate::types::{ReservationType, Room};

/// All failures a booking operation can report.
///
/// The first group are policy rejections: they are decided from in-memory
/// state, never reach the store and are never retried. The last group are
/// store I/O failures; the caller's cache is left untouched when they occur.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("the selected slot has already started")]
    PastSlot,

    #[error("sign in to make a reservation")]
    AuthRequired,

    #[error("guests book through the external booking channel")]
    GuestNotAllowed,

    #[error("this slot is already reserved")]
    SlotTaken,

    #[error("{room} only accepts lesson reservations")]
    RoomRestricted { room: Room },

    #[error("only one {rtype} reservation per day is allowed")]
    DailyQuotaExceeded { rtype: ReservationType },

    #[error("lessons cannot be cancelled within {0} hours of the start; contact an admin")]
    CancelWindowClosed(i64),

    #[error("only the owner or an admin may change a reservation")]
    NotPermitted,

    #[error("a reservation name is required")]
    NameRequired,

    #[error("invalid reservation: {0}")]
    InvalidReservation(String),

    #[error("invalid reservation id: {0}")]
    InvalidReservationId(String),

    #[error("reservation not found")]
    NotFound,

    #[error("invalid config: {0}")]
    Config(String),

    #[error("store read failed: {0}")]
    StoreRead(String),

    #[error("store write failed: {0}")]
    StoreWrite(String),
}

impl Error {
    pub fn store_read(cause: impl ToString) -> Self {
        Self::StoreRead(cause.to_string())
    }

    pub fn store_write(cause: impl ToString) -> Self {
        Self::StoreWrite(cause.to_string())
    }

    /// True for rejections decided locally, without touching the store.
    pub fn is_policy(&self) -> bool {
        !matches!(
            self,
            Self::StoreRead(_) | Self::StoreWrite(_) | Self::Config(_)
        )
    }
}
