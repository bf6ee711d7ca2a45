//! Thai document formatting: baht words, Buddhist-era dates, money strings
//! and VAT arithmetic. Everything here is a stateless pure function.

pub mod baht;
pub mod date;
pub mod money;
pub mod vat;

pub use baht::baht_text;
pub use date::thai_long_date;
pub use money::{format_money, parse_amount};
pub use vat::{vat_breakdown, VatBreakdown, VatMode};
