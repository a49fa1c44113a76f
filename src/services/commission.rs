use rust_decimal::Decimal;

/// Policy seam for cashier commission.
///
/// The profit basis and rate vary by deployment, so the calculation is a
/// trait rather than a constant: reporting code asks the configured policy
/// and never hard-codes a percentage.
pub trait CommissionPolicy: Send + Sync {
    /// Commission earned on the given sale profit.
    fn commission(&self, profit: Decimal) -> Decimal;
}

/// Pays the cashier a fixed share of sale profit.
#[derive(Debug, Clone)]
pub struct ProfitShare {
    rate: Decimal,
}

impl ProfitShare {
    /// `rate` is a fraction, e.g. 0.15 for a 15% share.
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

impl CommissionPolicy for ProfitShare {
    fn commission(&self, profit: Decimal) -> Decimal {
        if profit <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        profit * self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn profit_share_applies_the_configured_rate() {
        let policy = ProfitShare::new(dec!(0.15));
        assert_eq!(policy.commission(dec!(1000)), dec!(150.00));
    }

    #[test]
    fn losses_earn_nothing() {
        let policy = ProfitShare::new(dec!(0.15));
        assert_eq!(policy.commission(dec!(-50)), Decimal::ZERO);
    }
}
