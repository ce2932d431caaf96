//! Price arithmetic shared by the catalog, cart and checkout.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// The discount applies only when it is set, positive and below the list price.
fn effective_discount(price: Decimal, discount_price: Option<Decimal>) -> Option<Decimal> {
    discount_price.filter(|discount| *discount > Decimal::ZERO && *discount < price)
}

/// Price a shopper pays for one unit.
pub fn final_price(price: Decimal, discount_price: Option<Decimal>) -> Decimal {
    effective_discount(price, discount_price).unwrap_or(price)
}

/// `floor((price - discount) / price * 100)`, or 0 when no discount applies.
pub fn discount_percentage(price: Decimal, discount_price: Option<Decimal>) -> u32 {
    match effective_discount(price, discount_price) {
        // effective_discount guarantees price > discount > 0
        Some(discount) => ((price - discount) / price * Decimal::ONE_HUNDRED)
            .trunc()
            .to_u32()
            .unwrap_or(0),
        None => 0,
    }
}

/// Unit price times quantity. Non-positive quantities contribute nothing.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    if quantity <= 0 {
        return Decimal::ZERO;
    }
    unit_price * Decimal::from(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(100.00), Some(dec!(80.00)), dec!(80.00))]
    #[case(dec!(100.00), None, dec!(100.00))]
    #[case(dec!(100.00), Some(dec!(0)), dec!(100.00))]
    #[case(dec!(100.00), Some(dec!(100.00)), dec!(100.00))]
    #[case(dec!(100.00), Some(dec!(120.00)), dec!(100.00))]
    fn final_price_cases(
        #[case] price: Decimal,
        #[case] discount: Option<Decimal>,
        #[case] expected: Decimal,
    ) {
        assert_eq!(final_price(price, discount), expected);
    }

    #[rstest]
    #[case(dec!(100.00), Some(dec!(80.00)), 20)]
    #[case(dec!(30.00), Some(dec!(20.00)), 33)]
    #[case(dec!(9.99), Some(dec!(9.98)), 0)]
    #[case(dec!(100.00), None, 0)]
    #[case(dec!(100.00), Some(dec!(150.00)), 0)]
    #[case(dec!(0), Some(dec!(5.00)), 0)]
    fn discount_percentage_truncates(
        #[case] price: Decimal,
        #[case] discount: Option<Decimal>,
        #[case] expected: u32,
    ) {
        assert_eq!(discount_percentage(price, discount), expected);
    }

    #[test]
    fn line_total_multiplies() {
        assert_eq!(line_total(dec!(10.00), 2), dec!(20.00));
        assert_eq!(line_total(dec!(15.50), 0), Decimal::ZERO);
        assert_eq!(line_total(dec!(15.50), -3), Decimal::ZERO);
    }
}
