pub mod order;
pub mod orderbook;
pub mod trade;

pub use order::{Order, OrderKind, OrderRequest, OrderSide, OrderStatus, PersistedOrder};
pub use orderbook::{DepthLevel, DepthSnapshot, OrderBook, PriceLevel};
pub use trade::Trade;
