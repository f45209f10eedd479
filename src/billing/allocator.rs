use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::error::{BillingError, BillingResult};
use super::model::{Allocation, AllocationResult, PaymentSchedule, ScheduleStatus};

/// Spread `amount` over the outstanding rows, oldest due date first.
///
/// Rows due on the same day keep their input order. Rows already paid are
/// skipped. Whatever is left once every row is settled comes back as
/// `remaining_amount`; deciding what to do with it is up to the caller.
/// No rounding happens here, so `allocated + remaining == total` exactly.
pub fn apply_payment(
    schedules: &[PaymentSchedule],
    amount: Decimal,
    payment_date: NaiveDate,
) -> BillingResult<AllocationResult> {
    if amount <= Decimal::ZERO {
        return Err(BillingError::InvalidAmount(format!(
            "payment amount must be greater than zero, got {amount}"
        )));
    }

    let mut ordered = schedules.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|row| row.due_date);

    let mut remaining = amount;
    let mut allocations = Vec::new();

    for row in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        if row.status == ScheduleStatus::Paid {
            continue;
        }

        let row_balance = row.outstanding();
        let applied = remaining.min(row_balance);
        if applied <= Decimal::ZERO {
            continue;
        }

        allocations.push(Allocation {
            schedule_id: row.id,
            billing_period_start: row.billing_period_start,
            billing_period_end: row.billing_period_end,
            amount_applied: applied,
            previous_amount_paid: row.amount_paid,
            new_amount_paid: row.amount_paid + applied,
            previous_balance: row_balance,
            new_balance: row_balance - applied,
        });
        remaining -= applied;
    }

    Ok(AllocationResult {
        payment_date,
        total_payment: amount,
        allocated_amount: amount - remaining,
        remaining_amount: remaining,
        allocations,
    })
}
