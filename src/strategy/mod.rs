// Entry gate and order price rules
pub mod pricing;
pub mod stability;

pub use pricing::{average_entry_price, calculate_order_price, round_to, Offset};
pub use stability::{StabilityGate, MA_WINDOW};
