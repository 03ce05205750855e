//! Shared test doubles for the scheduler integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use mockable::Clock;

use abi::{Error, Reservation, Role};
use reservation::{
    IdentityProvider, MemoryReservationStore, ReservationId, ReservationStore, UserRef,
};

/// Settable clock so tests control "now".
pub struct FixtureClock(Mutex<DateTime<Utc>>);

impl FixtureClock {
    pub fn at(now: &str) -> Self {
        Self(Mutex::new(now.parse().expect("fixture timestamp")))
    }

    pub fn advance_hours(&self, hours: i64) {
        *self.lock() += Duration::hours(hours);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// Scripted identity platform: whoever the test signs in is the caller.
#[derive(Default)]
pub struct FakeIdentity {
    session: Mutex<Option<(UserRef, Option<Role>)>>,
}

impl FakeIdentity {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(id: &str, name: &str, role: Role) -> Self {
        let identity = Self::default();
        identity.sign_in(id, name, Some(role));
        identity
    }

    pub fn sign_in(&self, id: &str, name: &str, role: Option<Role>) {
        *self.lock() = Some((
            UserRef {
                id: id.to_string(),
                display_name: name.to_string(),
            },
            role,
        ));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(UserRef, Option<Role>)>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn current_user(&self) -> Option<UserRef> {
        self.lock().as_ref().map(|(user, _)| user.clone())
    }

    async fn current_role(&self) -> Result<Option<Role>, Error> {
        Ok(self.lock().as_ref().and_then(|(_, role)| *role))
    }
}

/// Store wrapper whose reads or writes can be switched to fail, for the
/// stale-grid and no-partial-apply scenarios.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryReservationStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_role(&self, user_id: &str, role: Role) {
        self.inner.set_role(user_id, role);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::store_read("injected read failure"));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store_write("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for FlakyStore {
    async fn create(&self, rsvp: Reservation) -> Result<Reservation, Error> {
        self.check_write()?;
        self.inner.create(rsvp).await
    }

    async fn delete(&self, id: ReservationId) -> Result<(), Error> {
        self.check_write()?;
        self.inner.delete(id).await
    }

    async fn update_user_name(
        &self,
        id: ReservationId,
        user_name: String,
    ) -> Result<Reservation, Error> {
        self.check_write()?;
        self.inner.update_user_name(id, user_name).await
    }

    async fn get(&self, id: ReservationId) -> Result<Reservation, Error> {
        self.check_read()?;
        self.inner.get(id).await
    }

    async fn query_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, Error> {
        self.check_read()?;
        self.inner.query_by_date(date).await
    }

    async fn query_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Reservation>, Error> {
        self.check_read()?;
        self.inner.query_range(from, to).await
    }

    async fn user_role(&self, user_id: &str) -> Result<Option<Role>, Error> {
        self.check_read()?;
        self.inner.user_role(user_id).await
    }
}
