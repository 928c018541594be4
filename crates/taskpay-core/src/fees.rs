use crate::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Platform commission taken from every payout.
pub const DEFAULT_PLATFORM_FEE_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: Decimal,
    pub platform_fee: Decimal,
    pub net: Decimal,
}

impl FeeSchedule {
    pub fn new(rate: Decimal) -> Result<Self> {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(Error::Validation(format!(
                "platform fee rate must be in [0, 1), got {}",
                rate
            )));
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Split a task price into the helper's share and the platform fee.
    ///
    /// The net amount is rounded to cents and the fee absorbs the rounding,
    /// so `platform_fee + net == gross` always holds.
    pub fn split(&self, gross: Decimal) -> Result<FeeSplit> {
        if gross <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "amount must be positive, got {}",
                gross
            )));
        }

        let net = (gross * (Decimal::ONE - self.rate))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let platform_fee = gross - net;

        Ok(FeeSplit {
            gross,
            platform_fee,
            net,
        })
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            rate: DEFAULT_PLATFORM_FEE_RATE,
        }
    }
}

/// Convert a decimal amount to integer minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| Error::Validation(format!("amount out of range: {}", amount)))
}

/// Format an amount with exactly two decimal places, as PayPal and Airwallex expect.
pub fn format_amount(amount: Decimal) -> String {
    format!(
        "{:.2}",
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_rate_is_ten_percent() {
        assert_eq!(FeeSchedule::default().rate(), dec!(0.10));
    }

    #[test]
    fn test_split() {
        let split = FeeSchedule::default().split(dec!(120.00)).unwrap();
        assert_eq!(split.net, dec!(108.00));
        assert_eq!(split.platform_fee, dec!(12.00));
    }

    #[test]
    fn test_split_rounding_keeps_total() {
        let split = FeeSchedule::default().split(dec!(33.35)).unwrap();
        // 33.35 * 0.9 = 30.015 -> 30.02
        assert_eq!(split.net, dec!(30.02));
        assert_eq!(split.platform_fee, dec!(3.33));
        assert_eq!(split.net + split.platform_fee, split.gross);
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(FeeSchedule::default().split(Decimal::ZERO).is_err());
        assert!(FeeSchedule::default().split(dec!(-5)).is_err());
        assert!(FeeSchedule::new(dec!(1)).is_err());
        assert!(FeeSchedule::new(dec!(-0.1)).is_err());
        assert!(FeeSchedule::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_minor_units_and_formatting() {
        assert_eq!(to_minor_units(dec!(108.00)).unwrap(), 10800);
        assert_eq!(to_minor_units(dec!(0.015)).unwrap(), 2);
        assert_eq!(format_amount(dec!(30)), "30.00");
        assert_eq!(format_amount(dec!(30.015)), "30.02");
    }
}
