use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::{map_db_error, AppResult};

const PAYMENT_COLUMNS: &str = "id, rental_agreement_id, contract_number, tenant_id, building_id, \
     payment_date, amount, payment_type, payment_method, remarks, billing_period_start, \
     billing_period_end, is_partial, allocated_amount, unallocated_amount, created_by, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentType {
    Rent,
    Advance,
}

impl PaymentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rent => "rent",
            Self::Advance => "advance",
        }
    }
}

/// Immutable ledger entry. Rows are only ever inserted.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub rental_agreement_id: Uuid,
    pub contract_number: Option<String>,
    pub tenant_id: Uuid,
    pub building_id: Uuid,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub payment_type: String,
    pub payment_method: Option<String>,
    pub remarks: Option<String>,
    pub billing_period_start: Option<NaiveDate>,
    pub billing_period_end: Option<NaiveDate>,
    pub is_partial: bool,
    pub allocated_amount: Decimal,
    pub unallocated_amount: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub rental_agreement_id: Uuid,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub payment_method: Option<String>,
    pub remarks: Option<String>,
    pub billing_period_start: Option<NaiveDate>,
    pub billing_period_end: Option<NaiveDate>,
    pub is_partial: bool,
    pub allocated_amount: Decimal,
    pub unallocated_amount: Decimal,
    pub created_by: Option<Uuid>,
}

/// Insert a ledger entry, copying contract, tenant and building from the
/// agreement.
pub async fn insert(conn: &mut PgConnection, payment: &NewPayment) -> AppResult<PaymentRow> {
    let sql = format!(
        "INSERT INTO payments
            (rental_agreement_id, contract_number, tenant_id, building_id, payment_date,
             amount, payment_type, payment_method, remarks, billing_period_start,
             billing_period_end, is_partial, allocated_amount, unallocated_amount, created_by)
         SELECT ra.id, ra.contract_number, ra.tenant_id, ra.building_id, $2,
                $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
         FROM rental_agreements ra
         WHERE ra.id = $1
         RETURNING {PAYMENT_COLUMNS}"
    );
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(payment.rental_agreement_id)
        .bind(payment.payment_date)
        .bind(payment.amount)
        .bind(payment.payment_type.as_str())
        .bind(payment.payment_method.as_deref())
        .bind(payment.remarks.as_deref())
        .bind(payment.billing_period_start)
        .bind(payment.billing_period_end)
        .bind(payment.is_partial)
        .bind(payment.allocated_amount)
        .bind(payment.unallocated_amount)
        .bind(payment.created_by)
        .fetch_one(conn)
        .await
        .map_err(map_db_error)
}

pub async fn list_for_agreement<'e>(
    executor: impl PgExecutor<'e>,
    agreement_id: Uuid,
) -> AppResult<Vec<PaymentRow>> {
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments
         WHERE rental_agreement_id = $1
         ORDER BY payment_date DESC, created_at DESC"
    );
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(agreement_id)
        .fetch_all(executor)
        .await
        .map_err(map_db_error)
}
