//! Ledger module containing account management, transaction processing and reporting

pub mod account;
pub mod core;
pub mod idempotency;
pub mod locks;
pub mod report;
pub mod transaction;

pub use account::*;
pub use self::core::*;
pub use idempotency::*;
pub use locks::*;
pub use report::*;
pub use transaction::*;
