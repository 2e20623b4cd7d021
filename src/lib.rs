//! # Wallet Ledger
//!
//! Per-account balances over an append-only ledger of deposits and
//! transfers, with idempotent operations and history reporting.
//!
//! ## Features
//!
//! - **Accounts**: unique names, zero opening balance, explicit owner
//! - **Deposits and transfers**: atomic, serialized per account, never overdrawing
//! - **Idempotency**: resubmitting a client operation token applies it once
//! - **Reports**: time-range and direction filtered history
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use wallet_ledger::{Caller, Ledger, OpFilter};
//! use wallet_ledger::utils::MemoryStorage;
//! use chrono::{Duration, Utc};
//!
//! # tokio_test_block(async {
//! let ledger = Ledger::new(MemoryStorage::new());
//! let caller = Caller::default();
//!
//! let alice = ledger.create_account(&caller, "alice").await?;
//! let bob = ledger.create_account(&caller, "bob").await?;
//! ledger.deposit(&caller, alice, 100, "t1").await?;
//! ledger.transfer(&caller, alice, bob, 40, "t2").await?;
//!
//! let now = Utc::now();
//! let lines = ledger
//!     .report(&caller, alice, now - Duration::days(1), now + Duration::days(1), OpFilter::Any)
//!     .await?;
//! assert_eq!(lines.len(), 2);
//! # Ok::<(), wallet_ledger::LedgerError>(())
//! # }).unwrap();
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod ledger;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use ledger::*;
pub use traits::*;
pub use types::*;
