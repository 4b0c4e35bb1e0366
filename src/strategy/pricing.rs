//! Order price arithmetic.
//!
//! Every rounding step is round-half-to-even on the scaled value, which is how
//! the historical trade records were produced. Changing the rounding mode or
//! the order of rounding steps makes new prices diverge from those records.

/// Decimals used for every limit price sent to the exchange
pub const PRICE_DECIMALS: i32 = 1;

/// Decimals of the intermediate average entry after an extra buy
pub const AVERAGE_DECIMALS: i32 = 2;

/// Which side of the base price a margin is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    Above,
    Below,
}

/// Round to `decimals` places, ties to even
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Apply a fractional margin above or below `price`, rounded to one decimal
pub fn calculate_order_price(price: f64, margin: f64, offset: Offset) -> f64 {
    let shifted = match offset {
        Offset::Above => price + margin * price,
        Offset::Below => price - margin * price,
    };
    round_to(shifted, PRICE_DECIMALS)
}

/// Average entry of two equal-sized buys, rounded to two decimals
pub fn average_entry_price(first_buy: f64, second_buy: f64) -> f64 {
    round_to((first_buy + second_buy) / 2.0, AVERAGE_DECIMALS)
}
