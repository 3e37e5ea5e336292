pub mod provider;
pub mod types;

pub use provider::{MarketDataProvider, UnleashClient};
pub use types::{ApiVersion, DataQuery, Page};
