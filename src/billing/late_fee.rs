use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::error::{BillingError, BillingResult};
use super::money::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateFeeType {
    #[default]
    Percentage,
    Fixed,
}

impl FromStr for LateFeeType {
    type Err = BillingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(BillingError::UnknownValue {
                kind: "late fee type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFeePolicy {
    pub fee_type: LateFeeType,
    /// Percent of the amount for `Percentage`, a flat amount for `Fixed`.
    pub value: Decimal,
    pub grace_period_days: i64,
    pub max_amount: Option<Decimal>,
}

impl Default for LateFeePolicy {
    fn default() -> Self {
        Self {
            fee_type: LateFeeType::Percentage,
            value: dec!(5),
            grace_period_days: 3,
            max_amount: None,
        }
    }
}

/// Late fee owed for an amount that is `days_overdue` days late.
///
/// Nothing is charged inside the grace period. A non-positive cap is
/// treated as no cap. The result is rounded to cents. Fails with
/// `InvalidAmount` when the percentage overflows `Decimal`.
pub fn calculate_late_fee(
    days_overdue: i64,
    amount: Decimal,
    policy: &LateFeePolicy,
) -> BillingResult<Decimal> {
    if days_overdue <= policy.grace_period_days {
        return Ok(Decimal::ZERO);
    }

    let fee = match policy.fee_type {
        LateFeeType::Percentage => amount
            .checked_mul(policy.value)
            .map(|scaled| scaled / Decimal::ONE_HUNDRED)
            .ok_or_else(|| {
                BillingError::InvalidAmount(format!(
                    "late fee of {}% on {amount} is out of range",
                    policy.value
                ))
            })?,
        LateFeeType::Fixed => policy.value,
    };

    let capped = match policy.max_amount {
        Some(cap) if cap > Decimal::ZERO && fee > cap => cap,
        _ => fee,
    };

    Ok(round_money(capped))
}
