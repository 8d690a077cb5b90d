//! Row types read from and written to the clinic schema

pub mod product;
pub mod visit;

pub use product::{ProductInfo, StockDirection};
pub use visit::{Prescription, VisitRecord, VisitRow};
