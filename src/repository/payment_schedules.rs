use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    billing::{PaymentSchedule, ScheduleStatus},
    error::{map_db_error, AppError, AppResult},
};

const SCHEDULE_COLUMNS: &str = "ps.id, ps.rental_agreement_id, ps.contract_number, ps.due_date, \
     ps.billing_period_start, ps.billing_period_end, ps.amount_due, ps.amount_paid, ps.balance, \
     ps.status, ps.is_overdue, ps.days_overdue, ps.late_fee, ps.payment_id";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentScheduleRow {
    pub id: Uuid,
    pub rental_agreement_id: Uuid,
    pub contract_number: Option<String>,
    pub due_date: NaiveDate,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub status: String,
    pub is_overdue: bool,
    pub days_overdue: i32,
    pub late_fee: Decimal,
    pub payment_id: Option<Uuid>,
}

impl TryFrom<PaymentScheduleRow> for PaymentSchedule {
    type Error = AppError;

    fn try_from(row: PaymentScheduleRow) -> Result<Self, Self::Error> {
        Ok(PaymentSchedule {
            id: Some(row.id),
            rental_agreement_id: row.rental_agreement_id,
            contract_number: row.contract_number,
            due_date: row.due_date,
            billing_period_start: row.billing_period_start,
            billing_period_end: row.billing_period_end,
            amount_due: row.amount_due,
            amount_paid: row.amount_paid,
            balance: row.balance,
            status: ScheduleStatus::from_str(&row.status)?,
            is_overdue: row.is_overdue,
            days_overdue: i64::from(row.days_overdue),
            late_fee: row.late_fee,
            payment_id: row.payment_id,
        })
    }
}

/// Where a board row lives and who owes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BoardContext {
    pub building_id: Uuid,
    pub building_name: String,
    pub flat_number: String,
    pub tenant_name: String,
    pub tenant_contact: Option<String>,
}

/// A schedule row as it appears on the cross-agreement boards.
#[derive(Debug, Clone, sqlx::FromRow)]
struct BoardRow {
    #[sqlx(flatten)]
    schedule: PaymentScheduleRow,
    #[sqlx(flatten)]
    context: BoardContext,
}

fn into_schedules(rows: Vec<PaymentScheduleRow>) -> AppResult<Vec<PaymentSchedule>> {
    rows.into_iter().map(PaymentSchedule::try_from).collect()
}

pub async fn count_for_agreement(conn: &mut PgConnection, agreement_id: Uuid) -> AppResult<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM payment_schedules WHERE rental_agreement_id = $1",
    )
    .bind(agreement_id)
    .fetch_one(conn)
    .await
    .map_err(map_db_error)
}

/// Bulk insert freshly generated rows. The unique index on
/// `(rental_agreement_id, billing_period_start)` turns a lost race into a
/// 23505, which surfaces as Conflict.
pub async fn insert_many(conn: &mut PgConnection, schedules: &[PaymentSchedule]) -> AppResult<u64> {
    if schedules.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO payment_schedules
            (rental_agreement_id, contract_number, due_date, billing_period_start,
             billing_period_end, amount_due, amount_paid, balance, status, is_overdue,
             days_overdue, late_fee) ",
    );
    builder.push_values(schedules, |mut row, schedule| {
        row.push_bind(schedule.rental_agreement_id)
            .push_bind(schedule.contract_number.clone())
            .push_bind(schedule.due_date)
            .push_bind(schedule.billing_period_start)
            .push_bind(schedule.billing_period_end)
            .push_bind(schedule.amount_due)
            .push_bind(schedule.amount_paid)
            .push_bind(schedule.balance)
            .push_bind(schedule.status.as_str())
            .push_bind(schedule.is_overdue)
            .push_bind(days_to_column(schedule.days_overdue))
            .push_bind(schedule.late_fee);
    });

    let result = builder.build().execute(conn).await.map_err(map_db_error)?;
    Ok(result.rows_affected())
}

pub async fn list_for_agreement<'e>(
    executor: impl PgExecutor<'e>,
    agreement_id: Uuid,
) -> AppResult<Vec<PaymentSchedule>> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM payment_schedules ps
         WHERE ps.rental_agreement_id = $1
         ORDER BY ps.due_date, ps.billing_period_start"
    );
    let rows = sqlx::query_as::<_, PaymentScheduleRow>(&sql)
        .bind(agreement_id)
        .fetch_all(executor)
        .await
        .map_err(map_db_error)?;
    into_schedules(rows)
}

/// Row-lock every schedule row of an agreement, oldest first.
pub async fn lock_for_agreement(
    conn: &mut PgConnection,
    agreement_id: Uuid,
) -> AppResult<Vec<PaymentSchedule>> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM payment_schedules ps
         WHERE ps.rental_agreement_id = $1
         ORDER BY ps.due_date, ps.billing_period_start
         FOR UPDATE"
    );
    let rows = sqlx::query_as::<_, PaymentScheduleRow>(&sql)
        .bind(agreement_id)
        .fetch_all(conn)
        .await
        .map_err(map_db_error)?;
    into_schedules(rows)
}

pub async fn agreement_id_for<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> AppResult<Uuid> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT rental_agreement_id FROM payment_schedules WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Payment schedule not found.".to_string()))
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> AppResult<PaymentSchedule> {
    let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM payment_schedules ps WHERE ps.id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, PaymentScheduleRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Payment schedule not found.".to_string()))?;
    PaymentSchedule::try_from(row)
}

/// Unsettled rows of active agreements with building, flat and tenant, optionally
/// narrowed to one building. Status is projected by the caller.
pub async fn list_unsettled_on_active<'e>(
    executor: impl PgExecutor<'e>,
    building_id: Option<Uuid>,
) -> AppResult<Vec<(BoardContext, PaymentSchedule)>> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS}, ra.building_id, b.name AS building_name, f.flat_number,
                t.full_name AS tenant_name,
                NULLIF(concat_ws(' ', t.country_code, t.contact_number), '') AS tenant_contact
         FROM payment_schedules ps
         JOIN rental_agreements ra ON ra.id = ps.rental_agreement_id
         JOIN buildings b ON b.id = ra.building_id
         JOIN flats f ON f.id = ra.flat_id
         JOIN tenants t ON t.id = ra.tenant_id
         WHERE ra.is_active = TRUE
           AND ps.amount_paid < ps.amount_due
           AND ($1::uuid IS NULL OR ra.building_id = $1)
         ORDER BY ps.due_date, ps.billing_period_start"
    );
    let rows = sqlx::query_as::<_, BoardRow>(&sql)
        .bind(building_id)
        .fetch_all(executor)
        .await
        .map_err(map_db_error)?;

    rows.into_iter()
        .map(|row| Ok((row.context, PaymentSchedule::try_from(row.schedule)?)))
        .collect()
}

/// Persist amounts, derived fields and the payment link of one row.
pub async fn update(conn: &mut PgConnection, schedule: &PaymentSchedule) -> AppResult<()> {
    let id = schedule
        .id
        .ok_or_else(|| AppError::Internal("Cannot update an unsaved schedule row.".to_string()))?;

    let result = sqlx::query(
        "UPDATE payment_schedules
         SET amount_paid = $2,
             balance = $3,
             status = $4,
             is_overdue = $5,
             days_overdue = $6,
             late_fee = $7,
             payment_id = $8,
             updated_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .bind(schedule.amount_paid)
    .bind(schedule.balance)
    .bind(schedule.status.as_str())
    .bind(schedule.is_overdue)
    .bind(days_to_column(schedule.days_overdue))
    .bind(schedule.late_fee)
    .bind(schedule.payment_id)
    .execute(conn)
    .await
    .map_err(map_db_error)?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Payment schedule not found.".to_string()));
    }
    Ok(())
}

fn days_to_column(days: i64) -> i32 {
    i32::try_from(days).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::{days_to_column, PaymentScheduleRow};
    use crate::billing::{PaymentSchedule, ScheduleStatus};

    fn stored(status: &str) -> PaymentScheduleRow {
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date");
        PaymentScheduleRow {
            id: Uuid::from_u128(7),
            rental_agreement_id: Uuid::from_u128(1),
            contract_number: None,
            due_date: day,
            billing_period_start: day,
            billing_period_end: NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date"),
            amount_due: dec!(300),
            amount_paid: dec!(120),
            balance: dec!(180),
            status: status.to_string(),
            is_overdue: false,
            days_overdue: 12,
            late_fee: dec!(0),
            payment_id: None,
        }
    }

    #[test]
    fn stored_rows_become_schedules() {
        let schedule = PaymentSchedule::try_from(stored("partial")).expect("valid row");
        assert_eq!(schedule.id, Some(Uuid::from_u128(7)));
        assert_eq!(schedule.status, ScheduleStatus::Partial);
        assert_eq!(schedule.days_overdue, 12);
        assert_eq!(schedule.outstanding(), dec!(180));
    }

    #[test]
    fn unknown_stored_status_is_rejected() {
        assert!(PaymentSchedule::try_from(stored("cancelled")).is_err());
    }

    #[test]
    fn day_counts_saturate_into_the_column() {
        assert_eq!(days_to_column(45), 45);
        assert_eq!(days_to_column(i64::MAX), i32::MAX);
    }
}
