use std::cmp::Ordering;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::model::{PaymentSchedule, ScheduleStatus, ScheduleSummary};

/// Recompute the derived fields of every row as of `as_of`.
///
/// Rules, first match wins:
///   paid     amount_paid >= amount_due
///   partial  0 < amount_paid < amount_due (overdue flags set once past due)
///   overdue  nothing paid and `as_of` is after the due date
///   pending  otherwise
pub fn project_status(schedules: &[PaymentSchedule], as_of: NaiveDate) -> Vec<PaymentSchedule> {
    schedules.iter().map(|row| project_row(row, as_of)).collect()
}

fn project_row(row: &PaymentSchedule, as_of: NaiveDate) -> PaymentSchedule {
    let past_due_days = (as_of - row.due_date).num_days();
    let past_due = past_due_days > 0;

    let (status, is_overdue, days_overdue) = if row.amount_paid >= row.amount_due {
        (ScheduleStatus::Paid, false, 0)
    } else if row.amount_paid > Decimal::ZERO {
        if past_due {
            (ScheduleStatus::Partial, true, past_due_days)
        } else {
            (ScheduleStatus::Partial, false, 0)
        }
    } else if past_due {
        (ScheduleStatus::Overdue, true, past_due_days)
    } else {
        (ScheduleStatus::Pending, false, 0)
    };

    PaymentSchedule {
        balance: row.amount_due - row.amount_paid,
        status,
        is_overdue,
        days_overdue,
        ..row.clone()
    }
}

/// Oldest row that still has something to pay.
pub fn next_due(schedules: &[PaymentSchedule]) -> Option<&PaymentSchedule> {
    schedules
        .iter()
        .filter(|row| !row.is_settled())
        .min_by_key(|row| row.due_date)
}

/// Rows flagged overdue by a previous projection, most overdue first.
pub fn overdue_only(schedules: &[PaymentSchedule]) -> Vec<PaymentSchedule> {
    let mut overdue = schedules
        .iter()
        .filter(|row| row.is_overdue)
        .cloned()
        .collect::<Vec<_>>();
    overdue.sort_by(most_overdue_first);
    overdue
}

/// Ordering for overdue lists: most days overdue first, then oldest due date.
pub fn most_overdue_first(a: &PaymentSchedule, b: &PaymentSchedule) -> Ordering {
    b.days_overdue
        .cmp(&a.days_overdue)
        .then(a.due_date.cmp(&b.due_date))
}

pub fn total_outstanding(schedules: &[PaymentSchedule]) -> Decimal {
    schedules
        .iter()
        .filter(|row| !row.is_settled())
        .map(PaymentSchedule::outstanding)
        .sum()
}

/// Project and aggregate in one pass, for the per-agreement summary view.
pub fn summarize(schedules: &[PaymentSchedule], as_of: NaiveDate) -> ScheduleSummary {
    let projected = project_status(schedules, as_of);

    let count = |status: ScheduleStatus| projected.iter().filter(|row| row.status == status).count();

    ScheduleSummary {
        period_count: projected.len(),
        paid_count: count(ScheduleStatus::Paid),
        partial_count: count(ScheduleStatus::Partial),
        overdue_count: count(ScheduleStatus::Overdue),
        pending_count: count(ScheduleStatus::Pending),
        total_due: projected.iter().map(|row| row.amount_due).sum(),
        total_paid: projected.iter().map(|row| row.amount_paid).sum(),
        total_outstanding: total_outstanding(&projected),
        total_late_fees: projected.iter().map(|row| row.late_fee).sum(),
        next_due: next_due(&projected).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::{next_due, overdue_only, project_status, summarize, total_outstanding};
    use crate::billing::model::{PaymentSchedule, ScheduleStatus};

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    fn row(due: &str, amount_due: Decimal, amount_paid: Decimal) -> PaymentSchedule {
        PaymentSchedule {
            id: Some(Uuid::new_v4()),
            rental_agreement_id: Uuid::from_u128(1),
            contract_number: None,
            due_date: date(due),
            billing_period_start: date(due),
            billing_period_end: date(due),
            amount_due,
            amount_paid,
            balance: Decimal::ZERO,
            status: ScheduleStatus::Pending,
            is_overdue: false,
            days_overdue: 0,
            late_fee: Decimal::ZERO,
            payment_id: None,
        }
    }

    #[test]
    fn fully_paid_row_is_paid_even_when_late() {
        let projected = project_status(&[row("2024-01-01", dec!(100), dec!(100))], date("2024-03-01"));
        assert_eq!(projected[0].status, ScheduleStatus::Paid);
        assert!(!projected[0].is_overdue);
        assert_eq!(projected[0].days_overdue, 0);
        assert_eq!(projected[0].balance, Decimal::ZERO);
    }

    #[test]
    fn overpaid_row_reports_negative_balance() {
        let projected = project_status(&[row("2024-01-01", dec!(100), dec!(120))], date("2024-01-01"));
        assert_eq!(projected[0].status, ScheduleStatus::Paid);
        assert_eq!(projected[0].balance, dec!(-20));
    }

    #[test]
    fn partial_row_tracks_overdue_days_after_due_date() {
        let rows = [row("2024-01-01", dec!(100), dec!(40))];

        let on_due_date = project_status(&rows, date("2024-01-01"));
        assert_eq!(on_due_date[0].status, ScheduleStatus::Partial);
        assert!(!on_due_date[0].is_overdue);
        assert_eq!(on_due_date[0].days_overdue, 0);

        let later = project_status(&rows, date("2024-01-11"));
        assert_eq!(later[0].status, ScheduleStatus::Partial);
        assert!(later[0].is_overdue);
        assert_eq!(later[0].days_overdue, 10);
        assert_eq!(later[0].balance, dec!(60));
    }

    #[test]
    fn unpaid_row_is_pending_until_day_after_due() {
        let rows = [row("2024-02-01", dec!(100), Decimal::ZERO)];

        assert_eq!(
            project_status(&rows, date("2024-01-15"))[0].status,
            ScheduleStatus::Pending
        );
        assert_eq!(
            project_status(&rows, date("2024-02-01"))[0].status,
            ScheduleStatus::Pending
        );

        let overdue = project_status(&rows, date("2024-02-02"));
        assert_eq!(overdue[0].status, ScheduleStatus::Overdue);
        assert!(overdue[0].is_overdue);
        assert_eq!(overdue[0].days_overdue, 1);
    }

    #[test]
    fn stale_stored_flags_are_overwritten() {
        let mut stale = row("2024-05-01", dec!(100), dec!(100));
        stale.status = ScheduleStatus::Overdue;
        stale.is_overdue = true;
        stale.days_overdue = 12;
        stale.balance = dec!(100);

        let projected = project_status(&[stale.clone()], date("2024-05-20"));
        assert_eq!(projected[0].status, ScheduleStatus::Paid);
        assert!(!projected[0].is_overdue);
        assert_eq!(projected[0].balance, Decimal::ZERO);
        assert_eq!(stale.status, ScheduleStatus::Overdue);
    }

    #[test]
    fn projection_keeps_amounts_and_identity() {
        let mut input = row("2024-01-01", dec!(250.50), dec!(10.25));
        input.late_fee = dec!(12.53);
        input.payment_id = Some(Uuid::from_u128(9));

        let projected = project_status(&[input.clone()], date("2024-02-01"));
        assert_eq!(projected[0].id, input.id);
        assert_eq!(projected[0].amount_due, input.amount_due);
        assert_eq!(projected[0].amount_paid, input.amount_paid);
        assert_eq!(projected[0].late_fee, input.late_fee);
        assert_eq!(projected[0].payment_id, input.payment_id);
    }

    #[test]
    fn next_due_picks_oldest_unpaid_row() {
        let rows = vec![
            row("2024-03-01", dec!(100), Decimal::ZERO),
            row("2024-01-01", dec!(100), dec!(100)),
            row("2024-02-01", dec!(100), dec!(50)),
        ];
        let next = next_due(&rows).expect("has unpaid rows");
        assert_eq!(next.due_date, date("2024-02-01"));

        let settled = vec![row("2024-01-01", dec!(100), dec!(100))];
        assert!(next_due(&settled).is_none());
    }

    #[test]
    fn overdue_rows_sorted_most_overdue_first() {
        let rows = project_status(
            &[
                row("2024-02-01", dec!(100), Decimal::ZERO),
                row("2024-03-01", dec!(100), Decimal::ZERO),
                row("2024-01-01", dec!(100), dec!(20)),
                row("2024-04-01", dec!(100), Decimal::ZERO),
            ],
            date("2024-03-15"),
        );
        let overdue = overdue_only(&rows);
        let dues = overdue.iter().map(|row| row.due_date).collect::<Vec<_>>();
        assert_eq!(
            dues,
            vec![date("2024-01-01"), date("2024-02-01"), date("2024-03-01")]
        );
    }

    #[test]
    fn outstanding_ignores_settled_rows() {
        let rows = vec![
            row("2024-01-01", dec!(100), dec!(130)),
            row("2024-02-01", dec!(100), dec!(40)),
            row("2024-03-01", dec!(100), Decimal::ZERO),
        ];
        assert_eq!(total_outstanding(&rows), dec!(160));
    }

    #[test]
    fn summary_counts_each_status() {
        let mut with_fee = row("2024-01-01", dec!(300), Decimal::ZERO);
        with_fee.late_fee = dec!(15);
        let rows = vec![
            with_fee,
            row("2024-02-01", dec!(300), dec!(300)),
            row("2024-03-01", dec!(300), dec!(100)),
            row("2024-04-01", dec!(300), Decimal::ZERO),
        ];
        let summary = summarize(&rows, date("2024-03-10"));

        assert_eq!(summary.period_count, 4);
        assert_eq!(summary.paid_count, 1);
        assert_eq!(summary.partial_count, 1);
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.pending_count, 1);
        assert_eq!(summary.total_due, dec!(1200));
        assert_eq!(summary.total_paid, dec!(400));
        assert_eq!(summary.total_outstanding, dec!(800));
        assert_eq!(summary.total_late_fees, dec!(15));
        assert_eq!(
            summary.next_due.map(|row| row.due_date),
            Some(date("2024-01-01"))
        );
    }

    proptest! {
        #[test]
        fn status_matches_amounts(
            due_cents in 1i64..1_000_000,
            paid_cents in 0i64..1_500_000,
            offset_days in -60i64..60,
        ) {
            let amount_due = Decimal::new(due_cents, 2);
            let amount_paid = Decimal::new(paid_cents, 2);
            let input = row("2024-06-15", amount_due, amount_paid);
            let as_of = date("2024-06-15") + chrono::Duration::days(offset_days);

            let projected = project_status(&[input], as_of);
            let out = &projected[0];

            prop_assert_eq!(out.balance, amount_due - amount_paid);
            prop_assert_eq!(amount_paid >= amount_due, out.status == ScheduleStatus::Paid);
            prop_assert_eq!(
                amount_paid > Decimal::ZERO && amount_paid < amount_due,
                out.status == ScheduleStatus::Partial
            );
            prop_assert_eq!(
                amount_paid == Decimal::ZERO && offset_days > 0,
                out.status == ScheduleStatus::Overdue
            );
            prop_assert!(out.days_overdue >= 0);
            prop_assert_eq!(out.is_overdue, out.days_overdue > 0);
        }
    }
}
