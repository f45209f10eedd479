use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::BillingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalPeriod {
    Day,
    Month,
}

impl RentalPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
        }
    }
}

impl FromStr for RentalPeriod {
    type Err = BillingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            other => Err(BillingError::UnknownValue {
                kind: "rental period",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Days,
    Months,
}

impl DurationUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Months => "months",
        }
    }
}

impl FromStr for DurationUnit {
    type Err = BillingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "days" => Ok(Self::Days),
            "months" => Ok(Self::Months),
            other => Err(BillingError::UnknownValue {
                kind: "duration unit",
                value: other.to_string(),
            }),
        }
    }
}

/// The slice of a rental agreement that billing needs. Owned by the
/// agreement store; billing only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalAgreement {
    pub id: Uuid,
    pub contract_number: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub duration_value: i32,
    pub duration_unit: DurationUnit,
    pub rental_amount: Decimal,
    pub rental_period: RentalPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Pending,
    Partial,
    Overdue,
    Paid,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = BillingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "overdue" => Ok(Self::Overdue),
            "paid" => Ok(Self::Paid),
            other => Err(BillingError::UnknownValue {
                kind: "schedule status",
                value: other.to_string(),
            }),
        }
    }
}

/// One billing period of an agreement.
///
/// `balance`, `status`, `is_overdue` and `days_overdue` are derived fields:
/// only `billing::projector` computes them, and it does so by building new
/// values from shared references, so amounts are never touched on a read.
/// `id` is `None` until the row has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub id: Option<Uuid>,
    pub rental_agreement_id: Uuid,
    pub contract_number: Option<String>,
    pub due_date: NaiveDate,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub status: ScheduleStatus,
    pub is_overdue: bool,
    pub days_overdue: i64,
    pub late_fee: Decimal,
    pub payment_id: Option<Uuid>,
}

impl PaymentSchedule {
    pub fn outstanding(&self) -> Decimal {
        self.amount_due - self.amount_paid
    }

    pub fn is_settled(&self) -> bool {
        self.amount_paid >= self.amount_due
    }
}

/// How much of one payment landed on one schedule row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub schedule_id: Option<Uuid>,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub amount_applied: Decimal,
    pub previous_amount_paid: Decimal,
    pub new_amount_paid: Decimal,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub payment_date: NaiveDate,
    pub total_payment: Decimal,
    pub allocated_amount: Decimal,
    pub remaining_amount: Decimal,
    pub allocations: Vec<Allocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub period_count: usize,
    pub paid_count: usize,
    pub partial_count: usize,
    pub overdue_count: usize,
    pub pending_count: usize,
    pub total_due: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
    pub total_late_fees: Decimal,
    pub next_due: Option<PaymentSchedule>,
}
