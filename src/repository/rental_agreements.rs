use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::{
    billing::{DurationUnit, RentalAgreement, RentalPeriod},
    error::{map_db_error, AppError, AppResult},
};

const AGREEMENT_COLUMNS: &str = "id, contract_number, tenant_id, flat_id, building_id, \
     start_date, end_date, duration_value, duration_unit, rental_amount, rental_period, \
     advance_amount, is_active, created_by, created_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RentalAgreementRow {
    pub id: Uuid,
    pub contract_number: Option<String>,
    pub tenant_id: Uuid,
    pub flat_id: Uuid,
    pub building_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub duration_value: i32,
    pub duration_unit: String,
    pub rental_amount: Decimal,
    pub rental_period: String,
    pub advance_amount: Decimal,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RentalAgreementRow {
    /// The billing view of this agreement.
    pub fn to_agreement(&self) -> AppResult<RentalAgreement> {
        Ok(RentalAgreement {
            id: self.id,
            contract_number: self.contract_number.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            duration_value: self.duration_value,
            duration_unit: DurationUnit::from_str(&self.duration_unit)?,
            rental_amount: self.rental_amount,
            rental_period: RentalPeriod::from_str(&self.rental_period)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewRentalAgreement {
    pub contract_number: String,
    pub tenant_id: Uuid,
    pub flat_id: Uuid,
    pub building_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_value: i32,
    pub duration_unit: DurationUnit,
    pub rental_amount: Decimal,
    pub rental_period: RentalPeriod,
    pub advance_amount: Decimal,
    pub created_by: Uuid,
}

pub async fn get<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> AppResult<RentalAgreementRow> {
    let sql = format!("SELECT {AGREEMENT_COLUMNS} FROM rental_agreements WHERE id = $1");
    sqlx::query_as::<_, RentalAgreementRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Rental agreement not found.".to_string()))
}

/// Row-lock the agreement for the rest of the transaction. Concurrent
/// generators and payers for the same agreement queue up here.
pub async fn lock(conn: &mut PgConnection, id: Uuid) -> AppResult<RentalAgreementRow> {
    let sql = format!("SELECT {AGREEMENT_COLUMNS} FROM rental_agreements WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, RentalAgreementRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Rental agreement not found.".to_string()))
}

pub async fn list<'e>(
    executor: impl PgExecutor<'e>,
    is_active: Option<bool>,
    building_id: Option<Uuid>,
    limit: i64,
) -> AppResult<Vec<RentalAgreementRow>> {
    let sql = format!(
        "SELECT {AGREEMENT_COLUMNS} FROM rental_agreements
         WHERE ($1::bool IS NULL OR is_active = $1)
           AND ($2::uuid IS NULL OR building_id = $2)
         ORDER BY created_at DESC
         LIMIT $3"
    );
    sqlx::query_as::<_, RentalAgreementRow>(&sql)
        .bind(is_active)
        .bind(building_id)
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(map_db_error)
}

pub async fn insert(
    conn: &mut PgConnection,
    agreement: &NewRentalAgreement,
) -> AppResult<RentalAgreementRow> {
    let sql = format!(
        "INSERT INTO rental_agreements
            (contract_number, tenant_id, flat_id, building_id, start_date, end_date,
             duration_value, duration_unit, rental_amount, rental_period, advance_amount,
             is_active, created_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, TRUE, $12)
         RETURNING {AGREEMENT_COLUMNS}"
    );
    sqlx::query_as::<_, RentalAgreementRow>(&sql)
        .bind(&agreement.contract_number)
        .bind(agreement.tenant_id)
        .bind(agreement.flat_id)
        .bind(agreement.building_id)
        .bind(agreement.start_date)
        .bind(agreement.end_date)
        .bind(agreement.duration_value)
        .bind(agreement.duration_unit.as_str())
        .bind(agreement.rental_amount)
        .bind(agreement.rental_period.as_str())
        .bind(agreement.advance_amount)
        .bind(agreement.created_by)
        .fetch_one(conn)
        .await
        .map_err(map_db_error)
}

pub async fn deactivate(
    conn: &mut PgConnection,
    id: Uuid,
    end_date: NaiveDate,
) -> AppResult<RentalAgreementRow> {
    let sql = format!(
        "UPDATE rental_agreements
         SET is_active = FALSE, end_date = $2, updated_at = now()
         WHERE id = $1
         RETURNING {AGREEMENT_COLUMNS}"
    );
    sqlx::query_as::<_, RentalAgreementRow>(&sql)
        .bind(id)
        .bind(end_date)
        .fetch_optional(conn)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Rental agreement not found.".to_string()))
}

/// Lock a flat and return whether it is currently occupied.
pub async fn lock_flat_occupancy(conn: &mut PgConnection, flat_id: Uuid) -> AppResult<bool> {
    sqlx::query_scalar::<_, bool>("SELECT is_occupied FROM flats WHERE id = $1 FOR UPDATE")
        .bind(flat_id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Flat not found.".to_string()))
}

pub async fn set_flat_occupied(
    conn: &mut PgConnection,
    flat_id: Uuid,
    occupied: bool,
) -> AppResult<()> {
    sqlx::query("UPDATE flats SET is_occupied = $2, updated_at = now() WHERE id = $1")
        .bind(flat_id)
        .bind(occupied)
        .execute(conn)
        .await
        .map_err(map_db_error)?;
    Ok(())
}

/// `RA-YYYYMM-XXXXXXXX`, unique through the agreement id suffix.
pub fn contract_number_for(id: Uuid, start_date: NaiveDate) -> String {
    let simple = id.simple().to_string().to_ascii_uppercase();
    format!("RA-{}-{}", start_date.format("%Y%m"), &simple[..8])
}
