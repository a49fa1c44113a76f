//! Pure money math for sale pricing.
//!
//! Everything here is side-effect free so the arithmetic can be exercised
//! exhaustively without a database. All amounts are rounded to currency
//! precision (2 dp, half away from zero) at computation boundaries.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::ServiceError;

/// How VAT relates to the selling price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxMode {
    /// Selling prices already contain VAT; tax is carved out of the total.
    Inclusive,
    /// VAT is added on top of the discounted price.
    Exclusive,
}

/// Effective tax configuration for one tenant.
#[derive(Debug, Clone, Copy)]
pub struct TaxSettings {
    pub mode: TaxMode,
    /// VAT rate as a fraction, e.g. 0.16
    pub rate: Decimal,
}

impl TaxSettings {
    pub fn new(mode: TaxMode, rate: Decimal) -> Self {
        Self { mode, rate }
    }

    /// Zero-rated configuration, useful for exempt tenants and tests.
    pub fn zero_rated() -> Self {
        Self {
            mode: TaxMode::Exclusive,
            rate: Decimal::ZERO,
        }
    }
}

/// Amounts derived for a single sale line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAmounts {
    /// Quantity × unit price, before discount and exclusive tax
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    /// What the customer pays for this line
    pub total: Decimal,
}

/// Aggregated amounts for a whole sale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaleTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

/// Rounds to currency precision.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Prices one line. Fails when the discount exceeds the gross amount.
pub fn price_line(
    quantity: i32,
    unit_price: Decimal,
    discount: Decimal,
    settings: &TaxSettings,
) -> Result<LineAmounts, ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::Validation(
            "line quantity must be at least 1".into(),
        ));
    }
    if unit_price <= Decimal::ZERO {
        return Err(ServiceError::Validation(
            "unit price must be greater than zero".into(),
        ));
    }
    if discount < Decimal::ZERO {
        return Err(ServiceError::Validation(
            "line discount cannot be negative".into(),
        ));
    }

    let gross = round_money(unit_price * Decimal::from(quantity));
    let discounted = gross - discount;
    if discounted < Decimal::ZERO {
        return Err(ServiceError::Validation(format!(
            "discount {} exceeds line amount {}",
            discount, gross
        )));
    }

    let (tax, total) = match settings.mode {
        TaxMode::Exclusive => {
            let tax = round_money(discounted * settings.rate);
            (tax, discounted + tax)
        }
        TaxMode::Inclusive => {
            // Tax is informational: it is already part of the price.
            let divisor = Decimal::ONE + settings.rate;
            let tax = round_money(discounted - discounted / divisor);
            (tax, discounted)
        }
    };

    Ok(LineAmounts {
        subtotal: gross,
        discount,
        tax,
        total,
    })
}

/// Sums line amounts into sale totals. The identity
/// `total = subtotal + tax - discount` holds exactly in exclusive mode;
/// in inclusive mode tax is embedded and `total = subtotal - discount`.
pub fn sale_totals(lines: &[LineAmounts], settings: &TaxSettings) -> SaleTotals {
    let subtotal: Decimal = lines.iter().map(|l| l.subtotal).sum();
    let discount_amount: Decimal = lines.iter().map(|l| l.discount).sum();
    let tax_amount: Decimal = lines.iter().map(|l| l.tax).sum();

    let total_amount = match settings.mode {
        TaxMode::Exclusive => subtotal - discount_amount + tax_amount,
        TaxMode::Inclusive => subtotal - discount_amount,
    };

    SaleTotals {
        subtotal,
        tax_amount,
        discount_amount,
        total_amount,
    }
}
