use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{ReservationId, ReservationStore};

/// In-process reservation store. Used as the test double for the scheduler
/// and as a reference for the conditional-write contract: `create` claims a
/// slot key atomically under one lock, mirroring the unique index the
/// Postgres store relies on.
#[derive(Debug, Default)]
pub struct MemoryReservationStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    reservations: HashMap<ReservationId, abi::Reservation>,
    roles: HashMap<String, abi::Role>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user's role, as the identity platform would.
    pub fn set_role(&self, user_id: impl Into<String>, role: abi::Role) {
        self.lock().roles.insert(user_id.into(), role);
    }

    pub fn len(&self) -> usize {
        self.lock().reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().reservations.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn create(&self, mut rsvp: abi::Reservation) -> Result<abi::Reservation, abi::Error> {
        rsvp.validate()?;
        let mut inner = self.lock();
        let key = rsvp.key();
        if inner.reservations.values().any(|r| r.key() == key) {
            return Err(abi::Error::SlotTaken);
        }
        inner.next_id += 1;
        rsvp.id = format!("rsvp-{}", inner.next_id);
        inner.reservations.insert(rsvp.id.clone(), rsvp.clone());
        Ok(rsvp)
    }

    async fn delete(&self, id: ReservationId) -> Result<(), abi::Error> {
        self.lock()
            .reservations
            .remove(&id)
            .map(|_| ())
            .ok_or(abi::Error::NotFound)
    }

    async fn update_user_name(
        &self,
        id: ReservationId,
        user_name: String,
    ) -> Result<abi::Reservation, abi::Error> {
        let mut inner = self.lock();
        let rsvp = inner.reservations.get_mut(&id).ok_or(abi::Error::NotFound)?;
        rsvp.user_name = user_name;
        Ok(rsvp.clone())
    }

    async fn get(&self, id: ReservationId) -> Result<abi::Reservation, abi::Error> {
        self.lock()
            .reservations
            .get(&id)
            .cloned()
            .ok_or(abi::Error::NotFound)
    }

    async fn query_by_date(&self, date: NaiveDate) -> Result<Vec<abi::Reservation>, abi::Error> {
        let mut found: Vec<_> = self
            .lock()
            .reservations
            .values()
            .filter(|r| r.date == date)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.slot, r.room.to_string()));
        Ok(found)
    }

    async fn query_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<abi::Reservation>, abi::Error> {
        let mut found: Vec<_> = self
            .lock()
            .reservations
            .values()
            .filter(|r| r.date >= from && r.date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.date, r.slot, r.room.to_string()));
        Ok(found)
    }

    async fn user_role(&self, user_id: &str) -> Result<Option<abi::Role>, abi::Error> {
        Ok(self.lock().roles.get(user_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::{Reservation, ReservationType, Room, TimeSlot};
    use chrono::Utc;

    fn practice(user: &str, date: &str, hour: u32, room: Room) -> Reservation {
        Reservation::new(
            user,
            user,
            date.parse().unwrap(),
            TimeSlot::new(hour).unwrap(),
            room,
            ReservationType::Practice,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn create_assigns_an_id() {
        let store = MemoryReservationStore::new();
        let created = store
            .create(practice("u1", "2025-03-03", 10, Room::B))
            .await
            .unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(store.get(created.id.clone()).await.unwrap(), created);
    }

    #[tokio::test]
    async fn second_create_on_the_same_key_is_rejected() {
        let store = MemoryReservationStore::new();
        store
            .create(practice("u1", "2025-03-03", 10, Room::B))
            .await
            .unwrap();
        let err = store
            .create(practice("u2", "2025-03-03", 10, Room::B))
            .await
            .unwrap_err();
        assert_eq!(err, abi::Error::SlotTaken);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn different_rooms_do_not_conflict() {
        let store = MemoryReservationStore::new();
        store
            .create(practice("u1", "2025-03-03", 10, Room::B))
            .await
            .unwrap();
        store
            .create(practice("u2", "2025-03-03", 10, Room::C))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn rename_changes_only_the_name() {
        let store = MemoryReservationStore::new();
        let created = store
            .create(practice("u1", "2025-03-03", 10, Room::B))
            .await
            .unwrap();
        let renamed = store
            .update_user_name(created.id.clone(), "Walk-in".into())
            .await
            .unwrap();
        assert_eq!(renamed.user_name, "Walk-in");
        assert_eq!(renamed.user_id, created.user_id);
        assert_eq!(renamed.rtype, created.rtype);
    }

    #[tokio::test]
    async fn delete_then_get_reports_not_found() {
        let store = MemoryReservationStore::new();
        let created = store
            .create(practice("u1", "2025-03-03", 10, Room::B))
            .await
            .unwrap();
        store.delete(created.id.clone()).await.unwrap();
        assert_eq!(store.get(created.id).await.unwrap_err(), abi::Error::NotFound);
        assert_eq!(
            store.delete("rsvp-999".into()).await.unwrap_err(),
            abi::Error::NotFound
        );
    }

    #[tokio::test]
    async fn range_query_is_inclusive_and_sorted() {
        let store = MemoryReservationStore::new();
        for (date, hour) in [("2025-03-05", 12), ("2025-03-01", 10), ("2025-03-31", 11)] {
            store.create(practice("u1", date, hour, Room::B)).await.unwrap();
        }
        store
            .create(practice("u1", "2025-04-01", 10, Room::B))
            .await
            .unwrap();

        let march = store
            .query_range("2025-03-01".parse().unwrap(), "2025-03-31".parse().unwrap())
            .await
            .unwrap();
        let dates: Vec<String> = march.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, ["2025-03-01", "2025-03-05", "2025-03-31"]);
    }

    #[tokio::test]
    async fn roles_round_trip() {
        let store = MemoryReservationStore::new();
        assert_eq!(store.user_role("u1").await.unwrap(), None);
        store.set_role("u1", abi::Role::Guest);
        assert_eq!(store.user_role("u1").await.unwrap(), Some(abi::Role::Guest));
    }
}
