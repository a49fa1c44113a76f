//! Property-based tests over the pure money math.
//!
//! These run without a database and hammer the pricing functions across a
//! wide input range, checking the identities the rest of the system
//! depends on.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use dukapos_api::services::tax::{
    price_line, round_money, sale_totals, LineAmounts, TaxMode, TaxSettings,
};

fn money_strategy() -> impl Strategy<Value = Decimal> {
    // 0.01 .. 100_000.00 in whole cents
    (1i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    // 0% .. 30% in quarter-point steps
    (0i64..=120).prop_map(|quarter_points| Decimal::new(quarter_points * 25, 4))
}

fn quantity_strategy() -> impl Strategy<Value = i32> {
    1i32..500
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn rounding_is_idempotent_and_two_dp(cents in 1i64..1_000_000_000) {
        let value = Decimal::new(cents, 4);
        let rounded = round_money(value);
        prop_assert_eq!(round_money(rounded), rounded);
        prop_assert!(rounded.scale() <= 2);
    }

    #[test]
    fn exclusive_line_total_is_subtotal_minus_discount_plus_tax(
        quantity in quantity_strategy(),
        unit_price in money_strategy(),
        rate in rate_strategy(),
    ) {
        let settings = TaxSettings::new(TaxMode::Exclusive, rate);
        let line = price_line(quantity, unit_price, Decimal::ZERO, &settings).unwrap();
        prop_assert_eq!(line.total, line.subtotal - line.discount + line.tax);
        prop_assert!(line.tax >= Decimal::ZERO);
    }

    #[test]
    fn inclusive_line_total_never_exceeds_the_gross(
        quantity in quantity_strategy(),
        unit_price in money_strategy(),
        rate in rate_strategy(),
    ) {
        let settings = TaxSettings::new(TaxMode::Inclusive, rate);
        let line = price_line(quantity, unit_price, Decimal::ZERO, &settings).unwrap();
        prop_assert_eq!(line.total, line.subtotal);
        prop_assert!(line.tax <= line.total);
        prop_assert!(line.tax >= Decimal::ZERO);
    }

    #[test]
    fn inclusive_tax_matches_the_carve_out_formula(
        quantity in quantity_strategy(),
        unit_price in money_strategy(),
        rate in rate_strategy(),
    ) {
        let settings = TaxSettings::new(TaxMode::Inclusive, rate);
        let line = price_line(quantity, unit_price, Decimal::ZERO, &settings).unwrap();
        let expected = round_money(line.total - line.total / (Decimal::ONE + rate));
        prop_assert_eq!(line.tax, expected);
    }

    #[test]
    fn discounts_reduce_the_total_monotonically(
        quantity in quantity_strategy(),
        unit_price in money_strategy(),
        discount_cents in 0i64..10_000,
    ) {
        let settings = TaxSettings::zero_rated();
        let gross = round_money(unit_price * Decimal::from(quantity));
        let discount = Decimal::new(discount_cents, 2).min(gross);

        let without = price_line(quantity, unit_price, Decimal::ZERO, &settings).unwrap();
        let with = price_line(quantity, unit_price, discount, &settings).unwrap();
        prop_assert_eq!(without.total - with.total, discount);
    }

    #[test]
    fn sale_totals_are_the_sum_of_their_lines(
        lines in prop::collection::vec(
            (quantity_strategy(), money_strategy()),
            1..10,
        ),
        rate in rate_strategy(),
    ) {
        let settings = TaxSettings::new(TaxMode::Exclusive, rate);
        let amounts: Vec<LineAmounts> = lines
            .iter()
            .map(|(quantity, unit_price)| {
                price_line(*quantity, *unit_price, Decimal::ZERO, &settings).unwrap()
            })
            .collect();

        let totals = sale_totals(&amounts, &settings);
        let line_sum: Decimal = amounts.iter().map(|l| l.total).sum();
        prop_assert_eq!(totals.total_amount, line_sum);
        prop_assert_eq!(
            totals.total_amount,
            totals.subtotal - totals.discount_amount + totals.tax_amount
        );
    }
}

#[test]
fn sixteen_percent_inclusive_carves_the_expected_tax() {
    let settings = TaxSettings::new(TaxMode::Inclusive, dec!(0.16));
    let line = price_line(1, dec!(116), Decimal::ZERO, &settings).unwrap();
    assert_eq!(line.total, dec!(116));
    assert_eq!(line.tax, dec!(16.00));
}
