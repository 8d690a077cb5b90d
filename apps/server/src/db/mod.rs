//! Data access layer
//!
//! Repositories own the SQL; services own the business rules and
//! transaction boundaries.

pub mod invoices;
pub mod products;
pub mod visits;

pub use invoices::InvoiceRepository;
pub use products::ProductRepository;
pub use visits::VisitRepository;
