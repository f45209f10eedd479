use std::future::Future;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    billing::{
        apply_payment, calculate_late_fee, generate_schedule, most_overdue_first, overdue_only,
        project_status, AllocationResult, LateFeePolicy, PaymentSchedule, RentalAgreement,
        ScheduleStatus,
    },
    error::{AppError, AppResult},
    repository::{
        payment_schedules::{self, BoardContext},
        payments::{self, NewPayment, PaymentRow, PaymentType},
        rental_agreements,
    },
    schemas::{validate_money, RecordPaymentInput, UpdatePaymentScheduleInput},
};

/// A lost serialization race is retried once; the second failure is
/// reported to the caller.
const WRITE_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub count: u64,
    pub truncated: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: Option<String>,
    pub remarks: Option<String>,
    pub recorded_by: Uuid,
}

impl PaymentRequest {
    /// Payment date defaults to `today`; blank method and remarks are dropped.
    pub fn from_input(
        input: RecordPaymentInput,
        recorded_by: Uuid,
        today: NaiveDate,
    ) -> AppResult<Self> {
        validate_money("amount", input.amount, false)?;
        Ok(Self {
            amount: input.amount,
            payment_date: input.payment_date.unwrap_or(today),
            payment_method: non_blank(input.payment_method),
            remarks: non_blank(input.remarks),
            recorded_by,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedPayment {
    pub payment: PaymentRow,
    pub allocation: AllocationResult,
    pub schedules: Vec<PaymentSchedule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LateFeeRun {
    pub as_of: NaiveDate,
    pub policy: LateFeePolicy,
    pub updated: usize,
    pub total_late_fees: Decimal,
    pub schedules: Vec<PaymentSchedule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Board {
    Overdue,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardEntry {
    #[serde(flatten)]
    pub context: BoardContext,
    #[serde(flatten)]
    pub schedule: PaymentSchedule,
}

/// Generate and insert the schedule of an agreement the caller has already
/// locked. Rejects with Conflict when the agreement has any rows.
pub async fn generate_locked(
    conn: &mut PgConnection,
    agreement: &RentalAgreement,
) -> AppResult<GenerationOutcome> {
    let existing = payment_schedules::count_for_agreement(&mut *conn, agreement.id).await?;
    if existing > 0 {
        return Err(AppError::Conflict(
            "Payment schedules already exist for this rental agreement.".to_string(),
        ));
    }

    let generated = generate_schedule(agreement)?;
    let count = payment_schedules::insert_many(conn, &generated.schedules).await?;
    Ok(GenerationOutcome {
        count,
        truncated: generated.limit_exceeded,
        warning: generated.truncation().map(|warning| warning.to_string()),
    })
}

pub async fn generate_for_agreement(
    pool: &PgPool,
    agreement_id: Uuid,
) -> AppResult<GenerationOutcome> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    let agreement = rental_agreements::lock(&mut tx, agreement_id)
        .await?
        .to_agreement()?;
    let outcome = generate_locked(&mut tx, &agreement).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    tracing::info!(
        rental_agreement_id = %agreement_id,
        count = outcome.count,
        truncated = outcome.truncated,
        "Payment schedules generated"
    );
    Ok(outcome)
}

/// Stored rows of one agreement, projected as of `as_of`.
pub async fn list_projected(
    pool: &PgPool,
    agreement_id: Uuid,
    as_of: NaiveDate,
) -> AppResult<Vec<PaymentSchedule>> {
    rental_agreements::get(pool, agreement_id).await?;
    let rows = payment_schedules::list_for_agreement(pool, agreement_id).await?;
    Ok(project_status(&rows, as_of))
}

pub async fn list_board(
    pool: &PgPool,
    building_id: Option<Uuid>,
    as_of: NaiveDate,
    board: Board,
) -> AppResult<Vec<BoardEntry>> {
    let rows = payment_schedules::list_unsettled_on_active(pool, building_id).await?;
    Ok(board_entries(rows, as_of, board))
}

/// Allocate a payment across the agreement's outstanding rows, oldest first,
/// and record it in the ledger. All of it commits or none of it does.
pub async fn record_payment(
    pool: &PgPool,
    agreement_id: Uuid,
    request: &PaymentRequest,
    today: NaiveDate,
) -> AppResult<RecordedPayment> {
    with_one_retry("record_payment", || {
        record_payment_once(pool, agreement_id, request, today)
    })
    .await
}

async fn record_payment_once(
    pool: &PgPool,
    agreement_id: Uuid,
    request: &PaymentRequest,
    today: NaiveDate,
) -> AppResult<RecordedPayment> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    rental_agreements::lock(&mut tx, agreement_id).await?;
    let locked = payment_schedules::lock_for_agreement(&mut tx, agreement_id).await?;
    if locked.is_empty() {
        return Err(AppError::BadRequest(
            "No payment schedules exist for this rental agreement.".to_string(),
        ));
    }

    let projected = project_status(&locked, request.payment_date);
    let allocation = apply_payment(&projected, request.amount, request.payment_date)?;

    let payment = payments::insert(&mut tx, &ledger_entry(agreement_id, request, &allocation)).await?;
    let settled = settle_rows(&projected, &allocation, payment.id, today);
    for row in &settled {
        payment_schedules::update(&mut tx, row).await?;
    }

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    tracing::info!(
        rental_agreement_id = %agreement_id,
        payment_id = %payment.id,
        amount = %allocation.total_payment,
        allocated = %allocation.allocated_amount,
        remaining = %allocation.remaining_amount,
        rows = settled.len(),
        "Payment recorded"
    );

    Ok(RecordedPayment {
        payment,
        allocation,
        schedules: settled,
    })
}

/// Pay against exactly one schedule row. Anything above its balance is
/// reported as remainder and not carried to other rows.
pub async fn record_schedule_payment(
    pool: &PgPool,
    schedule_id: Uuid,
    request: &PaymentRequest,
    today: NaiveDate,
) -> AppResult<RecordedPayment> {
    with_one_retry("record_schedule_payment", || {
        record_schedule_payment_once(pool, schedule_id, request, today)
    })
    .await
}

async fn record_schedule_payment_once(
    pool: &PgPool,
    schedule_id: Uuid,
    request: &PaymentRequest,
    today: NaiveDate,
) -> AppResult<RecordedPayment> {
    let agreement_id = payment_schedules::agreement_id_for(pool, schedule_id).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    rental_agreements::lock(&mut tx, agreement_id).await?;
    let row = payment_schedules::lock(&mut tx, schedule_id).await?;
    let projected = project_status(std::slice::from_ref(&row), request.payment_date);
    if projected.iter().all(|row| row.status == ScheduleStatus::Paid) {
        return Err(AppError::Conflict(
            "Payment schedule is already paid.".to_string(),
        ));
    }

    let allocation = apply_payment(&projected, request.amount, request.payment_date)?;
    let payment = payments::insert(&mut tx, &ledger_entry(agreement_id, request, &allocation)).await?;
    let settled = settle_rows(&projected, &allocation, payment.id, today);
    for row in &settled {
        payment_schedules::update(&mut tx, row).await?;
    }

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    tracing::info!(
        payment_schedule_id = %schedule_id,
        payment_id = %payment.id,
        amount = %allocation.total_payment,
        remaining = %allocation.remaining_amount,
        "Schedule payment recorded"
    );

    Ok(RecordedPayment {
        payment,
        allocation,
        schedules: settled,
    })
}

/// Compute and store late fees on every overdue row of an agreement.
pub async fn apply_late_fees(
    pool: &PgPool,
    agreement_id: Uuid,
    policy: &LateFeePolicy,
    as_of: NaiveDate,
) -> AppResult<LateFeeRun> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    rental_agreements::lock(&mut tx, agreement_id).await?;
    let locked = payment_schedules::lock_for_agreement(&mut tx, agreement_id).await?;
    let assessed = assess_late_fees(&project_status(&locked, as_of), policy)?;

    let changed = assessed
        .iter()
        .zip(locked.iter())
        .filter(|(after, before)| after.late_fee != before.late_fee)
        .map(|(after, _)| after)
        .collect::<Vec<_>>();
    for row in &changed {
        payment_schedules::update(&mut tx, row).await?;
    }

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    let updated = changed.len();
    tracing::info!(rental_agreement_id = %agreement_id, updated, "Late fees applied");

    Ok(LateFeeRun {
        as_of,
        policy: policy.clone(),
        updated,
        total_late_fees: assessed.iter().map(|row| row.late_fee).sum(),
        schedules: overdue_only(&assessed),
    })
}

/// Direct edit of a row's `amount_paid` and `late_fee`.
pub async fn update_schedule(
    pool: &PgPool,
    schedule_id: Uuid,
    input: &UpdatePaymentScheduleInput,
    today: NaiveDate,
) -> AppResult<PaymentSchedule> {
    let agreement_id = payment_schedules::agreement_id_for(pool, schedule_id).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    rental_agreements::lock(&mut tx, agreement_id).await?;
    let row = payment_schedules::lock(&mut tx, schedule_id).await?;
    let edited = apply_schedule_edit(&row, input)?;
    let projected = project_status(std::slice::from_ref(&edited), today)
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("Projection dropped the edited row.".to_string()))?;
    payment_schedules::update(&mut tx, &projected).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    tracing::info!(payment_schedule_id = %schedule_id, "Payment schedule updated");
    Ok(projected)
}

async fn with_one_retry<T, F, Fut>(operation: &'static str, mut run: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match run().await {
            Err(error) if error.is_retryable() && attempt < WRITE_ATTEMPTS => {
                tracing::warn!(operation, attempt, error = %error, "Retrying after concurrent modification");
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn ledger_entry(
    agreement_id: Uuid,
    request: &PaymentRequest,
    allocation: &AllocationResult,
) -> NewPayment {
    let first = allocation.allocations.first();
    let last = allocation.allocations.last();
    NewPayment {
        rental_agreement_id: agreement_id,
        payment_date: request.payment_date,
        amount: allocation.total_payment,
        payment_type: PaymentType::Rent,
        payment_method: request.payment_method.clone(),
        remarks: request.remarks.clone(),
        billing_period_start: first.map(|entry| entry.billing_period_start),
        billing_period_end: last.map(|entry| entry.billing_period_end),
        is_partial: last.is_some_and(|entry| entry.new_balance > Decimal::ZERO),
        allocated_amount: allocation.allocated_amount,
        unallocated_amount: allocation.remaining_amount,
        created_by: Some(request.recorded_by),
    }
}

/// The rows an allocation touched, with new amounts and the payment link,
/// projected as of `as_of`.
fn settle_rows(
    rows: &[PaymentSchedule],
    allocation: &AllocationResult,
    payment_id: Uuid,
    as_of: NaiveDate,
) -> Vec<PaymentSchedule> {
    let touched = allocation
        .allocations
        .iter()
        .filter_map(|entry| {
            let row = rows
                .iter()
                .find(|row| row.id.is_some() && row.id == entry.schedule_id)?;
            Some(PaymentSchedule {
                amount_paid: entry.new_amount_paid,
                payment_id: Some(payment_id),
                ..row.clone()
            })
        })
        .collect::<Vec<_>>();
    project_status(&touched, as_of)
}

/// Late fee per row. Overdue rows are charged on their outstanding balance;
/// a recorded fee is never lowered, and rows that are not overdue keep
/// whatever fee they already carry.
fn assess_late_fees(
    projected: &[PaymentSchedule],
    policy: &LateFeePolicy,
) -> AppResult<Vec<PaymentSchedule>> {
    projected
        .iter()
        .map(|row| {
            if !row.is_overdue {
                return Ok(row.clone());
            }
            let assessed = calculate_late_fee(row.days_overdue, row.outstanding(), policy)?;
            Ok(PaymentSchedule {
                late_fee: assessed.max(row.late_fee),
                ..row.clone()
            })
        })
        .collect()
}

fn apply_schedule_edit(
    row: &PaymentSchedule,
    input: &UpdatePaymentScheduleInput,
) -> AppResult<PaymentSchedule> {
    let amount_paid = input.amount_paid.unwrap_or(row.amount_paid);
    if amount_paid < row.amount_paid {
        return Err(AppError::UnprocessableEntity(format!(
            "amount_paid cannot decrease (currently {}).",
            row.amount_paid
        )));
    }
    if amount_paid > row.amount_due {
        return Err(AppError::UnprocessableEntity(format!(
            "amount_paid cannot exceed amount_due ({}).",
            row.amount_due
        )));
    }

    Ok(PaymentSchedule {
        amount_paid,
        late_fee: input.late_fee.unwrap_or(row.late_fee),
        ..row.clone()
    })
}

fn board_entries(
    rows: Vec<(BoardContext, PaymentSchedule)>,
    as_of: NaiveDate,
    board: Board,
) -> Vec<BoardEntry> {
    let (contexts, schedules): (Vec<BoardContext>, Vec<PaymentSchedule>) = rows.into_iter().unzip();
    let mut entries = contexts
        .into_iter()
        .zip(project_status(&schedules, as_of))
        .filter(|(_, row)| match board {
            Board::Overdue => row.is_overdue,
            Board::Pending => matches!(row.status, ScheduleStatus::Pending | ScheduleStatus::Partial),
        })
        .map(|(context, schedule)| BoardEntry { context, schedule })
        .collect::<Vec<_>>();

    if board == Board::Overdue {
        entries.sort_by(|a, b| most_overdue_first(&a.schedule, &b.schedule));
    }
    entries
}
