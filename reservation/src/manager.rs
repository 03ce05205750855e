use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Uuid;
use sqlx::{FromRow, PgPool, Row};

use crate::{PgReservationStore, ReservationId, ReservationStore};

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Flat row shape of rsvp.reservations; converted into the domain type so
/// abi stays free of database glue.
#[derive(FromRow)]
struct ReservationRow {
    id: Uuid,
    user_id: String,
    user_name: String,
    rdate: NaiveDate,
    time_slot: String,
    room: String,
    rtype: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for abi::Reservation {
    type Error = abi::Error;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(abi::Reservation {
            id: row.id.to_string(),
            user_id: row.user_id,
            user_name: row.user_name,
            date: row.rdate,
            slot: row.time_slot.parse()?,
            room: row.room.parse()?,
            rtype: row.rtype.parse()?,
            created_at: row.created_at,
        })
    }
}

fn parse_id(id: &str) -> Result<Uuid, abi::Error> {
    Uuid::parse_str(id).map_err(|_| abi::Error::InvalidReservationId(id.to_string()))
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn create(&self, mut rsvp: abi::Reservation) -> Result<abi::Reservation, abi::Error> {
        rsvp.validate()?;

        // Conditional write: the unique (rdate, time_slot, room) index is the
        // arbiter, so two racing clients cannot both claim the slot.
        let id: Option<Uuid> = sqlx::query(
            "INSERT INTO rsvp.reservations (user_id, user_name, rdate, time_slot, room, rtype, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (rdate, time_slot, room) DO NOTHING \
             RETURNING id",
        )
        .bind(rsvp.user_id.clone())
        .bind(rsvp.user_name.clone())
        .bind(rsvp.date)
        .bind(rsvp.slot.to_string())
        .bind(rsvp.room.to_string())
        .bind(rsvp.rtype.to_string())
        .bind(rsvp.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(abi::Error::store_write)?
        .map(|row| row.get(0));

        match id {
            Some(id) => {
                rsvp.id = id.to_string();
                Ok(rsvp)
            }
            None => Err(abi::Error::SlotTaken),
        }
    }

    async fn delete(&self, id: ReservationId) -> Result<(), abi::Error> {
        let id = parse_id(&id)?;
        let result = sqlx::query("DELETE FROM rsvp.reservations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(abi::Error::store_write)?;
        if result.rows_affected() == 0 {
            return Err(abi::Error::NotFound);
        }
        Ok(())
    }

    async fn update_user_name(
        &self,
        id: ReservationId,
        user_name: String,
    ) -> Result<abi::Reservation, abi::Error> {
        let id = parse_id(&id)?;
        let row: Option<ReservationRow> = sqlx::query_as(
            "UPDATE rsvp.reservations SET user_name = $1 WHERE id = $2 RETURNING *",
        )
        .bind(user_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(abi::Error::store_write)?;
        row.ok_or(abi::Error::NotFound)?.try_into()
    }

    async fn get(&self, id: ReservationId) -> Result<abi::Reservation, abi::Error> {
        let id = parse_id(&id)?;
        let row: Option<ReservationRow> =
            sqlx::query_as("SELECT * FROM rsvp.reservations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(abi::Error::store_read)?;
        row.ok_or(abi::Error::NotFound)?.try_into()
    }

    async fn query_by_date(&self, date: NaiveDate) -> Result<Vec<abi::Reservation>, abi::Error> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            "SELECT * FROM rsvp.reservations WHERE rdate = $1 ORDER BY time_slot, room",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(abi::Error::store_read)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn query_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<abi::Reservation>, abi::Error> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            "SELECT * FROM rsvp.reservations WHERE rdate BETWEEN $1 AND $2 \
             ORDER BY rdate, time_slot, room",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(abi::Error::store_read)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn user_role(&self, user_id: &str) -> Result<Option<abi::Role>, abi::Error> {
        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM rsvp.users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(abi::Error::store_read)?;
        role.map(|r| r.parse()).transpose()
    }
}
