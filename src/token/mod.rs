mod flight;
mod manager;
mod store;

pub use flight::{Flight, RefreshFlight, RefreshOutcome, SharedRefresh};
pub use manager::{RefreshEvent, TokenManager};
pub use store::{FileStore, MemoryStore, TokenStore};
