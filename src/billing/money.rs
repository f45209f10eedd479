use rust_decimal::{Decimal, RoundingStrategy};

pub const MONEY_SCALE: u32 = 2;

/// Round to cents, half away from zero. Only call this at a boundary
/// (late fee result, persistence, display); never between allocation steps.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// True when the amount carries no more than two fraction digits.
pub fn has_cent_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

#[cfg(test)]
mod tests {
    use super::{has_cent_precision, round_money};
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(2.344)), dec!(2.34));
        assert_eq!(round_money(dec!(-2.345)), dec!(-2.35));
        assert_eq!(round_money(dec!(10)), dec!(10));
        assert_eq!(round_money(dec!(10)).to_string(), "10.00");
    }

    #[test]
    fn detects_sub_cent_amounts() {
        assert!(has_cent_precision(dec!(100)));
        assert!(has_cent_precision(dec!(100.50)));
        assert!(has_cent_precision(dec!(100.500)));
        assert!(!has_cent_precision(dec!(100.505)));
    }
}
