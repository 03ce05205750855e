//! Pure booking rules: every policy decision of the scheduler lives here,
//! free of I/O, so the transition table can be tested directly.

use chrono::{DateTime, Duration, Utc};

use abi::{Error, ReservationType, Role, Room, SlotKey};

/// Horizontal swipes shorter than this do not navigate.
pub const SWIPE_THRESHOLD_PX: f32 = 50.0;

/// Identity snapshot of the caller for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Sub-state of the booking flow. At most one selection or modal is open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// A free cell is armed and waiting for a lesson/practice choice.
    TypeSelection { key: SlotKey },
    /// Admin tapped their own booking: cancel or rename.
    ChooseAction { key: SlotKey },
    /// Cancellation is pending confirmation.
    ConfirmCancel { key: SlotKey },
}

impl Phase {
    pub fn pending_key(&self) -> Option<&SlotKey> {
        match self {
            Self::Idle => None,
            Self::TypeSelection { key } | Self::ChooseAction { key } | Self::ConfirmCancel { key } => {
                Some(key)
            }
        }
    }
}

/// What a slot selection decided; the scheduler surfaces this to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Type selection opened for the tapped cell.
    Armed,
    /// Second tap on the armed cell withdrew the intent.
    Disarmed,
    /// Cancel-or-rename choice opened (admin on own booking).
    ActionRequested,
    /// Cancel confirmation opened.
    CancelRequested,
}

/// What the rules need to know about a taken cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Occupied {
    pub user_id: String,
    pub is_lesson: bool,
}

/// Caller's bookings per type on the selected date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeCounts {
    pub lessons: u32,
    pub practices: u32,
}

impl TypeCounts {
    pub fn of(&self, rtype: ReservationType) -> u32 {
        match rtype {
            ReservationType::Lesson => self.lessons,
            ReservationType::Practice => self.practices,
        }
    }

    pub fn bump(&mut self, rtype: ReservationType) {
        match rtype {
            ReservationType::Lesson => self.lessons += 1,
            ReservationType::Practice => self.practices += 1,
        }
    }

    pub fn drop_one(&mut self, rtype: ReservationType) {
        match rtype {
            ReservationType::Lesson => self.lessons = self.lessons.saturating_sub(1),
            ReservationType::Practice => self.practices = self.practices.saturating_sub(1),
        }
    }
}

/// The ordered branch ladder of a grid tap. Returns the next phase plus the
/// outcome, or the policy rejection.
pub fn decide_select(
    caller: Option<&Caller>,
    occupied: Option<&Occupied>,
    phase: &Phase,
    key: &SlotKey,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    cancel_window: Duration,
) -> Result<(Phase, SelectOutcome), Error> {
    if start <= now {
        return Err(Error::PastSlot);
    }
    let caller = caller.ok_or(Error::AuthRequired)?;
    if caller.role == Role::Guest {
        return Err(Error::GuestNotAllowed);
    }

    if let Some(occupied) = occupied {
        let own = occupied.user_id == caller.user_id;
        if caller.is_admin() && own {
            return Ok((
                Phase::ChooseAction { key: key.clone() },
                SelectOutcome::ActionRequested,
            ));
        }
        if caller.is_admin() || own {
            check_cancel_window(caller, occupied.is_lesson, start, now, cancel_window)?;
            return Ok((
                Phase::ConfirmCancel { key: key.clone() },
                SelectOutcome::CancelRequested,
            ));
        }
        return Err(Error::SlotTaken);
    }

    match phase {
        Phase::TypeSelection { key: armed } if armed == key => {
            Ok((Phase::Idle, SelectOutcome::Disarmed))
        }
        _ => Ok((
            Phase::TypeSelection { key: key.clone() },
            SelectOutcome::Armed,
        )),
    }
}

/// Non-admin owners cannot cancel a lesson once its start is inside the
/// window. Practice bookings and admins are unrestricted.
pub fn check_cancel_window(
    caller: &Caller,
    is_lesson: bool,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<(), Error> {
    if caller.is_admin() || !is_lesson {
        return Ok(());
    }
    let lead = start - now;
    if lead > Duration::zero() && lead <= window {
        return Err(Error::CancelWindowClosed(window.num_hours()));
    }
    Ok(())
}

/// Room restriction and the one-lesson-one-practice daily quota. Counts are
/// the caller's own bookings recomputed from the in-memory grid.
pub fn check_booking(
    caller: &Caller,
    room: Room,
    rtype: ReservationType,
    counts: TypeCounts,
) -> Result<(), Error> {
    if !room.accepts(rtype) {
        return Err(Error::RoomRestricted { room });
    }
    if !caller.is_admin() && counts.of(rtype) >= 1 {
        return Err(Error::DailyQuotaExceeded { rtype });
    }
    Ok(())
}

/// Map a horizontal swipe to a day step: left (toward smaller x) advances a
/// day, right goes back one.
pub fn swipe_step(start_x: f32, end_x: f32) -> Option<i64> {
    let distance = start_x - end_x;
    if distance > SWIPE_THRESHOLD_PX {
        Some(1)
    } else if distance < -SWIPE_THRESHOLD_PX {
        Some(-1)
    } else {
        None
    }
}
