mod overview;
mod rules;
mod scheduler;

pub use overview::{month_bounds, ReservationOverview, Tally};
pub use rules::{
    Caller, Occupied, Phase, SelectOutcome, TypeCounts, SWIPE_THRESHOLD_PX,
};
pub use scheduler::{
    DayGrid, GridSnapshot, ReservationScheduler, ANONYMOUS_NAME, OPEN_LABEL, TAKEN_LABEL,
};

use abi::{Config, Error};

/// Load the service configuration, expanding `~` in the path.
pub fn load_config(path: &str) -> Result<Config, Error> {
    let path = shellexpand::tilde(path);
    Config::load(path.as_ref())
}
