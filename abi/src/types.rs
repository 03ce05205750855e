use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, LocalResult, NaiveDate, TimeZone, Utc, Weekday};

use crate::Error;

/// The two reservation kinds a member can hold, each at most once per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationType {
    Lesson,
    Practice,
}

impl ReservationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lesson => "lesson",
            Self::Practice => "practice",
        }
    }
}

impl fmt::Display for ReservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lesson" => Ok(Self::Lesson),
            "practice" => Ok(Self::Practice),
            other => Err(Error::InvalidReservation(format!(
                "unknown reservation type: {other}"
            ))),
        }
    }
}

/// Membership role, resolved by the identity layer outside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Guest,
    Regular,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Regular => "regular",
            Self::Admin => "admin",
        }
    }

    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Self::Guest),
            "regular" => Ok(Self::Regular),
            "admin" => Ok(Self::Admin),
            other => Err(Error::InvalidReservation(format!("unknown role: {other}"))),
        }
    }
}

/// The studio's practice rooms. Room A is lesson-only; there is no Room D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    A,
    B,
    C,
    E,
}

impl Room {
    pub const ALL: [Room; 4] = [Room::A, Room::B, Room::C, Room::E];

    pub fn lesson_only(self) -> bool {
        self == Self::A
    }

    pub fn accepts(self, rtype: ReservationType) -> bool {
        !(self.lesson_only() && rtype == ReservationType::Practice)
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::E => "E",
        };
        write!(f, "Room {letter}")
    }
}

impl FromStr for Room {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Room A" => Ok(Self::A),
            "Room B" => Ok(Self::B),
            "Room C" => Ok(Self::C),
            "Room E" => Ok(Self::E),
            other => Err(Error::InvalidReservation(format!("unknown room: {other}"))),
        }
    }
}

/// An hour-aligned booking slot, displayed as "HH:00".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSlot {
    hour: u32,
}

impl TimeSlot {
    pub fn new(hour: u32) -> Result<Self, Error> {
        if hour > 23 {
            return Err(Error::InvalidReservation(format!(
                "slot hour out of range: {hour}"
            )));
        }
        Ok(Self { hour })
    }

    pub fn hour(self) -> u32 {
        self.hour
    }

    /// Bookable slots for a date: 10:00-17:00 on Sat/Sun, 10:00-20:00 otherwise.
    pub fn slots_for(date: NaiveDate) -> Vec<TimeSlot> {
        let last = match date.weekday() {
            Weekday::Sat | Weekday::Sun => 17,
            _ => 20,
        };
        (10..=last).map(|hour| TimeSlot { hour }).collect()
    }

    /// The instant this slot begins on `date`, interpreted in the studio's
    /// fixed timezone. Never uses the runtime's ambient timezone.
    pub fn start_at(self, date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
        // the constructor keeps hour <= 23, so this is always Some
        let naive = date
            .and_hms_opt(self.hour, 0, 0)
            .unwrap_or(chrono::NaiveDateTime::MIN);
        match offset.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            // fixed offsets have no gaps or folds
            _ => Utc.from_utc_datetime(&naive),
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00", self.hour)
    }
}

impl FromStr for TimeSlot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidReservation(format!("bad time slot: {s}")))?;
        if minute != "00" {
            return Err(Error::InvalidReservation(format!(
                "slots are hour-aligned, got: {s}"
            )));
        }
        let hour: u32 = hour
            .parse()
            .map_err(|_| Error::InvalidReservation(format!("bad time slot: {s}")))?;
        Self::new(hour)
    }
}

/// The composite booking key: one addressable cell of the daily grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub room: Room,
}

impl SlotKey {
    pub fn new(date: NaiveDate, slot: TimeSlot, room: Room) -> Self {
        Self { date, slot, room }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.date.format("%Y-%m-%d"), self.slot, self.room)
    }
}

/// A booked slot. `id` is assigned by the store on creation and is empty
/// before that.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub room: Room,
    pub rtype: ReservationType,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        date: NaiveDate,
        slot: TimeSlot,
        room: Room,
        rtype: ReservationType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            date,
            slot,
            room,
            rtype,
            created_at,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.slot, self.room)
    }

    /// Grid label, e.g. "lesson(Jinwoo)".
    pub fn display(&self) -> String {
        format!("{}({})", self.rtype, self.user_name)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.user_id.is_empty() {
            return Err(Error::InvalidReservation("user id is required".into()));
        }
        if self.user_name.trim().is_empty() {
            return Err(Error::InvalidReservation("user name is required".into()));
        }
        if !TimeSlot::slots_for(self.date).contains(&self.slot) {
            return Err(Error::InvalidReservation(format!(
                "{} is outside opening hours on {}",
                self.slot, self.date
            )));
        }
        if !self.room.accepts(self.rtype) {
            return Err(Error::RoomRestricted { room: self.room });
        }
        Ok(())
    }
}
