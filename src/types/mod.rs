pub mod api;
pub mod conversions;

pub use api::{validate_key, DistributionEntry, ErrorPayload, QuoteRequest, QuoteResponse};
pub use conversions::ConversionError;
