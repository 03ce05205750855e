mod config;
mod error;
mod types;
mod utils;

pub use config::{Config, DbConfig, StudioConfig};
pub use error::Error;
pub use types::{Reservation, ReservationType, Role, Room, SlotKey, TimeSlot};
pub use utils::*;
