pub mod error;
pub mod reader;
pub mod source;
pub mod store;

pub use error::MarketError;
pub use reader::MarketReader;
pub use source::{MarketDataSource, StaticMarketData};
pub use store::SnapshotStore;
