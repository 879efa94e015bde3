//! Per-identity usage ledger on an embedded transactional store.

mod error;
pub use error::MeterError;

mod config;
pub use config::MeterConfig;

mod ledger;
pub use ledger::{InitPolicy, Ledger, Meter, Status};
