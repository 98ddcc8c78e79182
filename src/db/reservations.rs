use crate::db::models::{
    BookedRange, PropertyStatus, Reservation, ReservationDetail, RESERVATION_BOOKING, RESERVATION_CANCELLED,
    RESERVATION_CONFIRMED, RESERVATION_PENDING, RESERVATION_PURCHASE, RESERVATION_REFUND_REQUIRED,
};
use crate::db::notifications::{insert_notification, NewNotification};
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::{NaiveDate, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

const RESERVATION_COLUMNS: &str = "id, property_id, user_id, kind, start_date, end_date, total_price, status, \
     stripe_session_id, created_at";

const DETAIL_SELECT: &str = "SELECT r.id, r.property_id, p.title AS property_title, p.city AS property_city, \
     p.owner_id, r.user_id, u.name AS user_name, u.email AS user_email, r.kind, r.start_date, r.end_date, \
     r.total_price, r.status, r.created_at \
     FROM reservations r JOIN properties p ON p.id = r.property_id JOIN users u ON u.id = r.user_id";

/// Result of recording a paid checkout session.
#[derive(Debug, Clone)]
pub enum Recorded {
    Inserted(Reservation),
    /// Paid, but another confirmed booking or sale got there first. The row
    /// is kept as `refund_required`.
    Conflict(Reservation),
    /// Stripe redelivered an event for a session that is already recorded.
    AlreadyRecorded,
}

/// A completed checkout session to record.
#[derive(Debug, Clone)]
pub struct PaidCheckout<'a> {
    pub property_id: Uuid,
    pub user_id: Uuid,
    pub total_price: f64,
    pub stripe_session_id: &'a str,
}

const OVERLAP_SQL: &str = "SELECT EXISTS (SELECT 1 FROM reservations WHERE property_id = $1 AND kind = $2 \
     AND status = $3 AND start_date < $5 AND end_date > $4)";

/// Locks the property row so concurrent webhooks for it run one at a time.
async fn lock_property_status(conn: &mut PgConnection, property_id: Uuid) -> Result<String, AppError> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM properties WHERE id = $1 FOR UPDATE")
        .bind(property_id)
        .fetch_optional(&mut *conn)
        .await?;
    status.ok_or_else(|| AppError::NotFound("Property not found".into()))
}

async fn session_recorded(conn: &mut PgConnection, stripe_session_id: &str) -> Result<bool, AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM reservations WHERE stripe_session_id = $1)")
        .bind(stripe_session_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

async fn insert_paid_reservation(
    conn: &mut PgConnection,
    checkout: &PaidCheckout<'_>,
    kind: &str,
    dates: Option<(NaiveDate, NaiveDate)>,
    status: &str,
) -> Result<Option<Reservation>, AppError> {
    let sql = format!(
        "INSERT INTO reservations (id, property_id, user_id, kind, start_date, end_date, total_price, status, stripe_session_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (stripe_session_id) DO NOTHING RETURNING {RESERVATION_COLUMNS}"
    );
    let inserted = sqlx::query_as::<_, Reservation>(&sql)
        .bind(Uuid::new_v4())
        .bind(checkout.property_id)
        .bind(checkout.user_id)
        .bind(kind)
        .bind(dates.map(|(start, _)| start))
        .bind(dates.map(|(_, end)| end))
        .bind(checkout.total_price)
        .bind(status)
        .bind(checkout.stripe_session_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(inserted)
}

async fn write_notifications<F>(conn: &mut PgConnection, recorded: &Recorded, notices: F) -> Result<(), AppError>
where
    F: FnOnce(&Recorded) -> Vec<NewNotification>,
{
    for notification in notices(recorded) {
        insert_notification(&mut *conn, &notification).await?;
    }
    Ok(())
}

async fn record_booking_in(
    conn: &mut PgConnection,
    checkout: &PaidCheckout<'_>,
    start: NaiveDate,
    end: NaiveDate,
    notices: impl FnOnce(&Recorded) -> Vec<NewNotification>,
) -> Result<Recorded, AppError> {
    lock_property_status(conn, checkout.property_id).await?;
    if session_recorded(conn, checkout.stripe_session_id).await? {
        return Ok(Recorded::AlreadyRecorded);
    }

    let overlapping: bool = sqlx::query_scalar(OVERLAP_SQL)
        .bind(checkout.property_id)
        .bind(RESERVATION_BOOKING)
        .bind(RESERVATION_CONFIRMED)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *conn)
        .await?;
    let status = if overlapping { RESERVATION_REFUND_REQUIRED } else { RESERVATION_CONFIRMED };

    let recorded = match insert_paid_reservation(conn, checkout, RESERVATION_BOOKING, Some((start, end)), status).await? {
        Some(reservation) if overlapping => Recorded::Conflict(reservation),
        Some(reservation) => Recorded::Inserted(reservation),
        None => return Ok(Recorded::AlreadyRecorded),
    };
    write_notifications(conn, &recorded, notices).await?;
    Ok(recorded)
}

async fn record_purchase_in(
    conn: &mut PgConnection,
    checkout: &PaidCheckout<'_>,
    notices: impl FnOnce(&Recorded) -> Vec<NewNotification>,
) -> Result<Recorded, AppError> {
    let property_status = lock_property_status(conn, checkout.property_id).await?;
    if session_recorded(conn, checkout.stripe_session_id).await? {
        return Ok(Recorded::AlreadyRecorded);
    }

    let available = PropertyStatus::parse(&property_status) == Some(PropertyStatus::Available);
    let status = if available { RESERVATION_CONFIRMED } else { RESERVATION_REFUND_REQUIRED };

    let recorded = match insert_paid_reservation(conn, checkout, RESERVATION_PURCHASE, None, status).await? {
        Some(reservation) if available => Recorded::Inserted(reservation),
        Some(reservation) => Recorded::Conflict(reservation),
        None => return Ok(Recorded::AlreadyRecorded),
    };
    if available {
        sqlx::query("UPDATE properties SET status = 'sold', updated_at = $2 WHERE id = $1")
            .bind(checkout.property_id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
    }
    write_notifications(conn, &recorded, notices).await?;
    Ok(recorded)
}

impl DbOperations {
    pub async fn has_overlapping_booking(
        &self,
        property_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, AppError> {
        // Half-open ranges: checkout day is free for the next guest
        let overlapping: bool = sqlx::query_scalar(OVERLAP_SQL)
            .bind(property_id)
            .bind(RESERVATION_BOOKING)
            .bind(RESERVATION_CONFIRMED)
            .bind(start)
            .bind(end)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(overlapping)
    }

    pub async fn get_booked_ranges(&self, property_id: Uuid) -> Result<Vec<BookedRange>, AppError> {
        let ranges = sqlx::query_as::<_, BookedRange>(
            "SELECT start_date, end_date FROM reservations \
             WHERE property_id = $1 AND kind = $2 AND status = $3 AND end_date >= $4 \
             AND start_date IS NOT NULL AND end_date IS NOT NULL ORDER BY start_date",
        )
        .bind(property_id)
        .bind(RESERVATION_BOOKING)
        .bind(RESERVATION_CONFIRMED)
        .bind(Utc::now().date_naive())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(ranges)
    }

    /// Records a paid booking. The overlap check is repeated under a lock on
    /// the property, and the notifications commit with the reservation.
    pub async fn record_paid_booking(
        &self,
        checkout: &PaidCheckout<'_>,
        start: NaiveDate,
        end: NaiveDate,
        notices: impl FnOnce(&Recorded) -> Vec<NewNotification>,
    ) -> Result<Recorded, AppError> {
        let mut transaction = self.begin_transaction().await?;
        match record_booking_in(&mut transaction, checkout, start, end, notices).await {
            Ok(recorded) => {
                transaction.commit().await?;
                Ok(recorded)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e)
            }
        }
    }

    /// Records a paid purchase and marks the property sold, unless it was no
    /// longer available when the payment landed.
    pub async fn record_paid_purchase(
        &self,
        checkout: &PaidCheckout<'_>,
        notices: impl FnOnce(&Recorded) -> Vec<NewNotification>,
    ) -> Result<Recorded, AppError> {
        let mut transaction = self.begin_transaction().await?;
        match record_purchase_in(&mut transaction, checkout, notices).await {
            Ok(recorded) => {
                transaction.commit().await?;
                Ok(recorded)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e)
            }
        }
    }

    pub async fn get_reservation(&self, id: Uuid) -> Result<Option<ReservationDetail>, AppError> {
        let sql = format!("{DETAIL_SELECT} WHERE r.id = $1");
        let reservation = sqlx::query_as::<_, ReservationDetail>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(reservation)
    }

    pub async fn list_reservations_for_user(&self, user_id: Uuid) -> Result<Vec<ReservationDetail>, AppError> {
        let sql = format!("{DETAIL_SELECT} WHERE r.user_id = $1 ORDER BY r.created_at DESC");
        let reservations = sqlx::query_as::<_, ReservationDetail>(&sql)
            .bind(user_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(reservations)
    }

    pub async fn list_reservations_for_owner(
        &self,
        owner_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ReservationDetail>, AppError> {
        let sql = format!("{DETAIL_SELECT} WHERE p.owner_id = $1 ORDER BY r.created_at DESC LIMIT $2");
        let reservations = sqlx::query_as::<_, ReservationDetail>(&sql)
            .bind(owner_id)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(reservations)
    }

    pub async fn list_all_reservations(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ReservationDetail>, i64), AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(self.pool.as_ref())
        .await?;

        let sql = format!(
            "{DETAIL_SELECT} WHERE ($1::text IS NULL OR r.status = $1) \
             ORDER BY r.created_at DESC LIMIT $2 OFFSET $3"
        );
        let reservations = sqlx::query_as::<_, ReservationDetail>(&sql)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok((reservations, total))
    }

    /// Cancels a reservation; a cancelled purchase puts the listing back on the market.
    pub async fn cancel_reservation(&self, id: Uuid) -> Result<Reservation, AppError> {
        let mut transaction = self.begin_transaction().await?;

        // Refund-required rows never held the listing, so they are settled by an admin
        let sql = format!(
            "UPDATE reservations SET status = $2 WHERE id = $1 AND status IN ($3, $4) RETURNING {RESERVATION_COLUMNS}"
        );
        let cancelled = sqlx::query_as::<_, Reservation>(&sql)
            .bind(id)
            .bind(RESERVATION_CANCELLED)
            .bind(RESERVATION_PENDING)
            .bind(RESERVATION_CONFIRMED)
            .fetch_optional(&mut *transaction)
            .await;

        let cancelled = match cancelled {
            Ok(Some(reservation)) => reservation,
            Ok(None) => {
                transaction.rollback().await?;
                return Err(AppError::ValidationError("Reservation cannot be cancelled".into()));
            }
            Err(e) => {
                transaction.rollback().await?;
                return Err(e.into());
            }
        };

        if cancelled.kind == RESERVATION_PURCHASE {
            let restored = sqlx::query(
                "UPDATE properties SET status = 'available', updated_at = $2 WHERE id = $1 AND status = 'sold'",
            )
            .bind(cancelled.property_id)
            .bind(Utc::now())
            .execute(&mut *transaction)
            .await;
            if let Err(e) = restored {
                transaction.rollback().await?;
                return Err(e.into());
            }
        }

        transaction.commit().await?;
        Ok(cancelled)
    }

    pub async fn has_confirmed_reservation(&self, user_id: Uuid, property_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reservations WHERE user_id = $1 AND property_id = $2 AND status = $3)",
        )
        .bind(user_id)
        .bind(property_id)
        .bind(RESERVATION_CONFIRMED)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists)
    }

    pub async fn count_reservations_for_session(&self, stripe_session_id: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE stripe_session_id = $1",
        )
        .bind(stripe_session_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }
}
