//! Inventory entities

use rust_decimal::Decimal;
use sqlx::FromRow;

/// Product catalog entry as loaded at run start. `quantity_on_hand` seeds
/// the engine's in-process inventory snapshot.
#[derive(Debug, Clone, FromRow)]
pub struct ProductInfo {
    pub id: i64,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity_on_hand: i32,
}

/// Direction of a stock movement ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    Inbound,
    Outbound,
}

impl StockDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "in",
            Self::Outbound => "out",
        }
    }
}

impl std::fmt::Display for StockDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
