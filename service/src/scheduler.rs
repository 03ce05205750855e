//! The per-session booking component: owns one calendar day of the grid,
//! applies the booking rules and keeps the view synchronized with the store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, FixedOffset, NaiveDate};
use futures::future::try_join_all;
use mockable::Clock;
use tracing::{info, warn};

use abi::{civil_date, Error, Reservation, ReservationType, Role, Room, SlotKey, TimeSlot};
use reservation::{IdentityProvider, ReservationStore};

use crate::rules::{self, Caller, Occupied, Phase, SelectOutcome, TypeCounts};

/// Label shown to users for cells someone else holds.
pub const TAKEN_LABEL: &str = "reserved";
/// Label shown for cells nobody holds.
pub const OPEN_LABEL: &str = "open";
/// Display name used when the identity platform has none on file.
pub const ANONYMOUS_NAME: &str = "anonymous";

/// The read-model of one calendar day, rebuilt from the store on every load
/// and patched optimistically after each successful write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayGrid {
    occupants: HashMap<SlotKey, String>,
    details: HashMap<SlotKey, String>,
    ids: HashMap<SlotKey, String>,
    guest_flags: HashMap<SlotKey, bool>,
    own_counts: TypeCounts,
}

impl DayGrid {
    pub fn occupant(&self, key: &SlotKey) -> Option<&str> {
        self.occupants.get(key).map(String::as_str)
    }

    pub fn detail(&self, key: &SlotKey) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    pub fn reservation_id(&self, key: &SlotKey) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    pub fn is_guest_booking(&self, key: &SlotKey) -> bool {
        self.guest_flags.get(key).copied().unwrap_or(false)
    }

    /// Caller's own per-type counters for the loaded date.
    pub fn own_counts(&self) -> TypeCounts {
        self.own_counts
    }

    pub fn occupied_len(&self) -> usize {
        self.occupants.len()
    }

    /// What `viewer` may see in a cell: owners and admins get the detail
    /// string, everyone else only learns that the slot is taken.
    pub fn label_for(&self, key: &SlotKey, viewer_id: Option<&str>, viewer_is_admin: bool) -> String {
        match self.details.get(key) {
            Some(detail)
                if viewer_is_admin || self.occupants.get(key).map(String::as_str) == viewer_id =>
            {
                detail.clone()
            }
            Some(_) => TAKEN_LABEL.to_string(),
            None => OPEN_LABEL.to_string(),
        }
    }

    /// The booking type recorded in a cell, read back from the display
    /// string the same way the grid renders it.
    pub fn occupied_type(&self, key: &SlotKey) -> Option<ReservationType> {
        self.details
            .get(key)
            .and_then(|detail| detail.split('(').next())
            .and_then(|prefix| prefix.parse().ok())
    }

    /// Recount `user_id`'s bookings per type across the loaded day.
    pub fn counts_for(&self, user_id: &str) -> TypeCounts {
        let mut counts = TypeCounts::default();
        for (key, occupant) in &self.occupants {
            if occupant == user_id {
                if let Some(rtype) = self.occupied_type(key) {
                    counts.bump(rtype);
                }
            }
        }
        counts
    }

    fn insert(&mut self, rsvp: &Reservation, guest: bool, own: bool) {
        let key = rsvp.key();
        self.occupants.insert(key.clone(), rsvp.user_id.clone());
        self.details.insert(key.clone(), rsvp.display());
        self.ids.insert(key.clone(), rsvp.id.clone());
        self.guest_flags.insert(key, guest);
        if own {
            self.own_counts.bump(rsvp.rtype);
        }
    }

    fn remove(&mut self, key: &SlotKey, own: bool) {
        if own {
            if let Some(rtype) = self.occupied_type(key) {
                self.own_counts.drop_one(rtype);
            }
        }
        self.occupants.remove(key);
        self.details.remove(key);
        self.ids.remove(key);
        self.guest_flags.remove(key);
    }
}

/// Read-only view handed to the UI after each operation.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
    pub rooms: [Room; 4],
    pub phase: Phase,
    pub grid: DayGrid,
}

/// One user session's view of the booking calendar. Collaborators are
/// injected so the scheduler can be driven entirely by fakes in tests.
///
/// Operations run to completion one at a time (`&mut self`); the store is
/// the system of record and every mutation ends with a reconciling re-read.
pub struct ReservationScheduler<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    cancel_window: Duration,
    selected_date: NaiveDate,
    grid: DayGrid,
    phase: Phase,
}

impl<S, I> ReservationScheduler<S, I>
where
    S: ReservationStore,
    I: IdentityProvider,
{
    /// Start a session on today's date in the studio timezone. The grid is
    /// empty until the first [`load_day`](Self::load_day).
    pub fn new(
        store: Arc<S>,
        identity: Arc<I>,
        clock: Arc<dyn Clock>,
        studio: &abi::StudioConfig,
    ) -> Result<Self, Error> {
        let offset = studio.offset()?;
        let selected_date = civil_date(clock.utc(), offset);
        Ok(Self {
            store,
            identity,
            clock,
            offset,
            cancel_window: Duration::hours(studio.cancel_window_hours),
            selected_date,
            grid: DayGrid::default(),
            phase: Phase::Idle,
        })
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn grid(&self) -> &DayGrid {
        &self.grid
    }

    /// Bookable slots for the selected date's weekday class.
    pub fn time_slots(&self) -> Vec<TimeSlot> {
        TimeSlot::slots_for(self.selected_date)
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            date: self.selected_date,
            slots: self.time_slots(),
            rooms: Room::ALL,
            phase: self.phase.clone(),
            grid: self.grid.clone(),
        }
    }

    async fn caller(&self) -> Result<Option<Caller>, Error> {
        let Some(user) = self.identity.current_user().await else {
            return Ok(None);
        };
        // no recorded role means an ordinary member
        let role = self.identity.current_role().await?.unwrap_or(Role::Regular);
        let user_name = if user.display_name.trim().is_empty() {
            ANONYMOUS_NAME.to_string()
        } else {
            user.display_name
        };
        Ok(Some(Caller {
            user_id: user.id,
            user_name,
            role,
        }))
    }

    /// Rebuild the whole grid from the store for `date`. Any failure leaves
    /// the previous grid and selected date untouched (stale but consistent).
    pub async fn load_day(&mut self, date: NaiveDate) -> Result<(), Error> {
        let records = self.store.query_by_date(date).await?;

        // resolve every booker's role in one batch to flag guest bookings
        let mut user_ids: Vec<String> = records.iter().map(|r| r.user_id.clone()).collect();
        user_ids.sort();
        user_ids.dedup();
        let roles = try_join_all(user_ids.iter().map(|uid| self.store.user_role(uid))).await?;
        let role_of: HashMap<&String, Option<Role>> = user_ids.iter().zip(roles).collect();

        let me = self.identity.current_user().await;
        let my_id = me.map(|u| u.id);

        let mut grid = DayGrid::default();
        for rsvp in &records {
            let guest = role_of
                .get(&rsvp.user_id)
                .copied()
                .flatten()
                .map(|role| role == Role::Guest)
                .unwrap_or(false);
            let own = my_id.as_deref() == Some(rsvp.user_id.as_str());
            grid.insert(rsvp, guest, own);
        }

        self.grid = grid;
        self.selected_date = date;
        Ok(())
    }

    /// A tap on the grid cell (slot, room) for the selected date. Applies
    /// the ordered policy ladder and moves the sub-state machine; on any
    /// rejection the sub-state returns to idle.
    pub async fn select_slot(&mut self, slot: TimeSlot, room: Room) -> Result<SelectOutcome, Error> {
        let key = SlotKey::new(self.selected_date, slot, room);
        let now = self.clock.utc();
        let start = slot.start_at(self.selected_date, self.offset);
        let caller = match self.caller().await {
            Ok(caller) => caller,
            Err(err) => {
                self.phase = Phase::Idle;
                return Err(err);
            }
        };
        let occupied = self.grid.occupant(&key).map(|user_id| Occupied {
            user_id: user_id.to_string(),
            is_lesson: self.grid.occupied_type(&key) == Some(ReservationType::Lesson),
        });

        match rules::decide_select(
            caller.as_ref(),
            occupied.as_ref(),
            &self.phase,
            &key,
            start,
            now,
            self.cancel_window,
        ) {
            Ok((phase, outcome)) => {
                self.phase = phase;
                Ok(outcome)
            }
            Err(err) => {
                self.phase = Phase::Idle;
                Err(err)
            }
        }
    }

    /// Confirm the booking type for the armed cell. Does nothing unless a
    /// type selection is armed. On success the reservation is merged into
    /// the grid and the day is re-read to reconcile with the store.
    pub async fn confirm_type(
        &mut self,
        rtype: ReservationType,
    ) -> Result<Option<Reservation>, Error> {
        let Phase::TypeSelection { key } = self.phase.clone() else {
            return Ok(None);
        };
        let caller = match self.caller().await {
            Ok(Some(caller)) => caller,
            Ok(None) => {
                self.phase = Phase::Idle;
                return Err(Error::AuthRequired);
            }
            Err(err) => {
                self.phase = Phase::Idle;
                return Err(err);
            }
        };

        // quota is recomputed from the in-memory grid at confirmation time
        let counts = self.grid.counts_for(&caller.user_id);
        if let Err(err) = rules::check_booking(&caller, key.room, rtype, counts) {
            self.phase = Phase::Idle;
            return Err(err);
        }

        let rsvp = Reservation::new(
            caller.user_id.clone(),
            caller.user_name.clone(),
            key.date,
            key.slot,
            key.room,
            rtype,
            self.clock.utc(),
        );
        match self.store.create(rsvp).await {
            Ok(created) => {
                self.grid.insert(&created, false, true);
                self.phase = Phase::Idle;
                info!(key = %created.key(), %rtype, user = %created.user_id, "reservation created");
                self.reconcile().await;
                Ok(Some(created))
            }
            Err(err) => {
                if err == Error::SlotTaken {
                    warn!(key = %key, "slot was claimed by another session");
                }
                self.phase = Phase::Idle;
                Err(err)
            }
        }
    }

    /// Confirm the pending cancellation. The lesson window is re-validated
    /// here because time may have passed while the modal was open.
    pub async fn request_cancel(&mut self) -> Result<(), Error> {
        let key = match &self.phase {
            Phase::ConfirmCancel { key } | Phase::ChooseAction { key } => key.clone(),
            _ => return Ok(()),
        };
        let caller = match self.caller().await {
            Ok(Some(caller)) => caller,
            Ok(None) => {
                self.phase = Phase::Idle;
                return Err(Error::AuthRequired);
            }
            Err(err) => {
                self.phase = Phase::Idle;
                return Err(err);
            }
        };

        let own = self.grid.occupant(&key) == Some(caller.user_id.as_str());
        if !own && !caller.is_admin() {
            self.phase = Phase::Idle;
            return Err(Error::NotPermitted);
        }

        let is_lesson = self.grid.occupied_type(&key) == Some(ReservationType::Lesson);
        let start = key.slot.start_at(key.date, self.offset);
        if let Err(err) = rules::check_cancel_window(
            &caller,
            is_lesson,
            start,
            self.clock.utc(),
            self.cancel_window,
        ) {
            self.phase = Phase::Idle;
            return Err(err);
        }

        let Some(id) = self.grid.reservation_id(&key).map(str::to_string) else {
            self.phase = Phase::Idle;
            return Err(Error::NotFound);
        };
        match self.store.delete(id).await {
            Ok(()) => {
                self.grid.remove(&key, own);
                self.phase = Phase::Idle;
                info!(key = %key, user = %caller.user_id, "reservation cancelled");
                self.reconcile().await;
                Ok(())
            }
            Err(err) => {
                self.phase = Phase::Idle;
                Err(err)
            }
        }
    }

    /// Admin-only: change the display name on the pending booking. The
    /// owner and type never change. An empty name keeps the modal open.
    pub async fn rename_occupant(&mut self, new_name: &str) -> Result<(), Error> {
        let Phase::ChooseAction { key } = self.phase.clone() else {
            return Ok(());
        };
        let caller = match self.caller().await {
            Ok(Some(caller)) => caller,
            Ok(None) => {
                self.phase = Phase::Idle;
                return Err(Error::AuthRequired);
            }
            Err(err) => {
                self.phase = Phase::Idle;
                return Err(err);
            }
        };
        if !caller.is_admin() {
            self.phase = Phase::Idle;
            return Err(Error::NotPermitted);
        }
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Err(Error::NameRequired);
        }

        let Some(id) = self.grid.reservation_id(&key).map(str::to_string) else {
            self.phase = Phase::Idle;
            return Err(Error::NotFound);
        };
        // read the record back for its type, then write the name only
        let result = async {
            let current = self.store.get(id.clone()).await?;
            self.store.update_user_name(id, trimmed.to_string()).await?;
            Ok::<_, Error>(current.rtype)
        }
        .await;
        match result {
            Ok(rtype) => {
                self.grid
                    .details
                    .insert(key.clone(), format!("{rtype}({trimmed})"));
                self.phase = Phase::Idle;
                info!(key = %key, "reservation renamed");
                self.reconcile().await;
                Ok(())
            }
            Err(err) => {
                self.phase = Phase::Idle;
                Err(err)
            }
        }
    }

    /// Close whatever modal or selection is open.
    pub fn close_modal(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Move the selected date by `step` days and reload. Any open selection
    /// is dropped first; a failed reload keeps the previous day visible.
    pub async fn navigate_date(&mut self, step: i64) -> Result<(), Error> {
        self.phase = Phase::Idle;
        let date = self.selected_date + Duration::days(step);
        self.load_day(date).await
    }

    /// Gesture equivalent of [`navigate_date`](Self::navigate_date): a
    /// horizontal swipe of at least the threshold distance. Returns whether
    /// the gesture navigated.
    pub async fn swipe(&mut self, start_x: f32, end_x: f32) -> Result<bool, Error> {
        match rules::swipe_step(start_x, end_x) {
            Some(step) => self.navigate_date(step).await.map(|()| true),
            None => Ok(false),
        }
    }

    /// Mandatory post-mutation re-read. A failure here is not fatal: the
    /// optimistic grid stays in place and the next successful load heals it.
    async fn reconcile(&mut self) {
        if let Err(err) = self.load_day(self.selected_date).await {
            warn!(error = %err, date = %self.selected_date, "post-mutation reload failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn grid_labels_respect_visibility() {
        let mut grid = DayGrid::default();
        let rsvp = Reservation {
            id: "rsvp-1".into(),
            user_id: "owner".into(),
            user_name: "Jinwoo".into(),
            date: "2025-03-03".parse().unwrap(),
            slot: TimeSlot::new(10).unwrap(),
            room: Room::B,
            rtype: ReservationType::Lesson,
            created_at: Utc::now(),
        };
        grid.insert(&rsvp, false, false);
        let key = rsvp.key();
        let free = SlotKey::new(rsvp.date, TimeSlot::new(11).unwrap(), Room::B);

        assert_eq!(grid.label_for(&key, Some("owner"), false), "lesson(Jinwoo)");
        assert_eq!(grid.label_for(&key, Some("admin"), true), "lesson(Jinwoo)");
        assert_eq!(grid.label_for(&key, Some("other"), false), TAKEN_LABEL);
        assert_eq!(grid.label_for(&key, None, false), TAKEN_LABEL);
        assert_eq!(grid.label_for(&free, Some("owner"), false), OPEN_LABEL);
    }

    #[test]
    fn counts_recompute_from_display_strings() {
        let mut grid = DayGrid::default();
        let date = "2025-03-03".parse().unwrap();
        for (hour, rtype, user) in [
            (10, ReservationType::Lesson, "me"),
            (11, ReservationType::Practice, "me"),
            (12, ReservationType::Practice, "someone"),
        ] {
            let rsvp = Reservation {
                id: format!("rsvp-{hour}"),
                user_id: user.into(),
                user_name: user.into(),
                date,
                slot: TimeSlot::new(hour).unwrap(),
                room: Room::B,
                rtype,
                created_at: Utc::now(),
            };
            grid.insert(&rsvp, false, user == "me");
        }

        let mine = grid.counts_for("me");
        assert_eq!(mine.lessons, 1);
        assert_eq!(mine.practices, 1);
        assert_eq!(grid.own_counts(), mine);
        assert_eq!(grid.counts_for("someone").practices, 1);
        assert_eq!(grid.counts_for("nobody"), TypeCounts::default());
    }

    #[test]
    fn remove_updates_own_counters() {
        let mut grid = DayGrid::default();
        let rsvp = Reservation {
            id: "rsvp-1".into(),
            user_id: "me".into(),
            user_name: "Me".into(),
            date: "2025-03-03".parse().unwrap(),
            slot: TimeSlot::new(10).unwrap(),
            room: Room::B,
            rtype: ReservationType::Practice,
            created_at: Utc::now(),
        };
        grid.insert(&rsvp, false, true);
        assert_eq!(grid.own_counts().practices, 1);

        grid.remove(&rsvp.key(), true);
        assert_eq!(grid.own_counts(), TypeCounts::default());
        assert!(grid.occupant(&rsvp.key()).is_none());
        assert!(grid.reservation_id(&rsvp.key()).is_none());
        assert!(!grid.is_guest_booking(&rsvp.key()));
    }
}
