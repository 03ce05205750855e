//! Month-level views over the store: the caller's reservation listing and
//! the admin usage tallies.

use std::sync::Arc;

use chrono::{Datelike, Days, Months, NaiveDate};

use abi::{Error, Reservation, ReservationType, Role};
use reservation::{IdentityProvider, ReservationStore};

/// Lesson/practice counters for one bucket (a day or a month).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub lessons: u32,
    pub practices: u32,
}

impl Tally {
    fn bump(&mut self, rtype: ReservationType) {
        match rtype {
            ReservationType::Lesson => self.lessons += 1,
            ReservationType::Practice => self.practices += 1,
        }
    }
}

/// First and last civil date of a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), Error> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::InvalidReservation(format!("invalid month {year}-{month:02}")))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.checked_sub_days(Days::new(1)))
        .ok_or_else(|| Error::InvalidReservation(format!("invalid month {year}-{month:02}")))?;
    Ok((first, last))
}

/// Read-only month views. Regular members see their own bookings; admins see
/// everything and may pull usage statistics.
pub struct ReservationOverview<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
}

impl<S, I> ReservationOverview<S, I>
where
    S: ReservationStore,
    I: IdentityProvider,
{
    pub fn new(store: Arc<S>, identity: Arc<I>) -> Self {
        Self { store, identity }
    }

    async fn current_role(&self) -> Result<(String, Role), Error> {
        let user = self.identity.current_user().await.ok_or(Error::AuthRequired)?;
        let role = self.identity.current_role().await?.unwrap_or(Role::Regular);
        Ok((user.id, role))
    }

    /// The caller's reservations inside one civil month, sorted by date and
    /// slot. Admins get every reservation in the month.
    pub async fn month(&self, year: i32, month: u32) -> Result<Vec<Reservation>, Error> {
        let (user_id, role) = self.current_role().await?;
        let (first, last) = month_bounds(year, month)?;
        let mut found = self.store.query_range(first, last).await?;
        if !role.is_admin() {
            found.retain(|r| r.user_id == user_id);
        }
        Ok(found)
    }

    /// Per-day tallies for one month, zero-filled: entry `i` covers day
    /// `i + 1`. Admin only.
    pub async fn daily_tallies(&self, year: i32, month: u32) -> Result<Vec<Tally>, Error> {
        let (_, role) = self.current_role().await?;
        if !role.is_admin() {
            return Err(Error::NotPermitted);
        }
        let (first, last) = month_bounds(year, month)?;
        let mut tallies = vec![Tally::default(); last.day() as usize];
        for rsvp in self.store.query_range(first, last).await? {
            tallies[rsvp.date.day() as usize - 1].bump(rsvp.rtype);
        }
        Ok(tallies)
    }

    /// Per-month tallies for one year, zero-filled: entry `i` covers month
    /// `i + 1`. Admin only.
    pub async fn monthly_tallies(&self, year: i32) -> Result<Vec<Tally>, Error> {
        let (_, role) = self.current_role().await?;
        if !role.is_admin() {
            return Err(Error::NotPermitted);
        }
        let (first, _) = month_bounds(year, 1)?;
        let (_, last) = month_bounds(year, 12)?;
        let mut tallies = vec![Tally::default(); 12];
        for rsvp in self.store.query_range(first, last).await? {
            tallies[rsvp.date.month() as usize - 1].bump(rsvp.rtype);
        }
        Ok(tallies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::{Room, TimeSlot};
    use async_trait::async_trait;
    use chrono::Utc;
    use reservation::{MemoryReservationStore, UserRef};

    struct Signed {
        id: &'static str,
        role: Role,
    }

    #[async_trait]
    impl IdentityProvider for Signed {
        async fn current_user(&self) -> Option<UserRef> {
            Some(UserRef {
                id: self.id.to_string(),
                display_name: self.id.to_string(),
            })
        }

        async fn current_role(&self) -> Result<Option<Role>, Error> {
            Ok(Some(self.role))
        }
    }

    async fn seeded_store() -> Arc<MemoryReservationStore> {
        let store = Arc::new(MemoryReservationStore::new());
        for (user, date, hour, rtype) in [
            ("u1", "2025-03-03", 10, ReservationType::Lesson),
            ("u1", "2025-03-10", 11, ReservationType::Practice),
            ("u2", "2025-03-03", 12, ReservationType::Practice),
            ("u1", "2025-04-01", 10, ReservationType::Practice),
        ] {
            store
                .create(Reservation::new(
                    user,
                    user,
                    date.parse().unwrap(),
                    TimeSlot::new(hour).unwrap(),
                    Room::B,
                    rtype,
                    Utc::now(),
                ))
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn month_bounds_cover_the_whole_month() {
        let (first, last) = month_bounds(2025, 2).unwrap();
        assert_eq!(first.to_string(), "2025-02-01");
        assert_eq!(last.to_string(), "2025-02-28");

        let (_, december) = month_bounds(2025, 12).unwrap();
        assert_eq!(december.to_string(), "2025-12-31");

        assert!(month_bounds(2025, 13).is_err());
    }

    #[tokio::test]
    async fn month_lists_only_the_callers_bookings() {
        let store = seeded_store().await;
        let me = Arc::new(Signed {
            id: "u1",
            role: Role::Regular,
        });
        let overview = ReservationOverview::new(store, me);

        let march = overview.month(2025, 3).await.unwrap();
        let dates: Vec<String> = march.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, ["2025-03-03", "2025-03-10"]);
        assert!(march.iter().all(|r| r.user_id == "u1"));
    }

    #[tokio::test]
    async fn admins_see_every_booking_in_the_month() {
        let store = seeded_store().await;
        let admin = Arc::new(Signed {
            id: "a1",
            role: Role::Admin,
        });
        let overview = ReservationOverview::new(store, admin);
        assert_eq!(overview.month(2025, 3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tallies_are_zero_filled_and_admin_only() {
        let store = seeded_store().await;
        let admin = Arc::new(Signed {
            id: "a1",
            role: Role::Admin,
        });
        let overview = ReservationOverview::new(store.clone(), admin);

        let daily = overview.daily_tallies(2025, 3).await.unwrap();
        assert_eq!(daily.len(), 31);
        assert_eq!(daily[2], Tally { lessons: 1, practices: 1 }); // March 3rd
        assert_eq!(daily[9].practices, 1);
        assert_eq!(daily[0], Tally::default());

        let monthly = overview.monthly_tallies(2025).await.unwrap();
        assert_eq!(monthly.len(), 12);
        assert_eq!(monthly[2], Tally { lessons: 1, practices: 2 });
        assert_eq!(monthly[3].practices, 1);
        assert_eq!(monthly[0], Tally::default());

        let member = Arc::new(Signed {
            id: "u1",
            role: Role::Regular,
        });
        let overview = ReservationOverview::new(store, member);
        assert_eq!(
            overview.daily_tallies(2025, 3).await.unwrap_err(),
            Error::NotPermitted
        );
        assert_eq!(
            overview.monthly_tallies(2025).await.unwrap_err(),
            Error::NotPermitted
        );
    }
}
