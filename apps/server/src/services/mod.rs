//! Business logic layer
//!
//! Services coordinate repositories, apply business rules and own
//! transaction boundaries.

pub mod conversion;

pub use conversion::ConversionService;
