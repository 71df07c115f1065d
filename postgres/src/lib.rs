//! `PostgreSQL` storage for the ledger RPC service.
//!
//! This crate implements the `LedgerStorage` port from `ledger-rpc-core` with
//! sqlx. It provides:
//!
//! - Row-level locking (`SELECT ... FOR UPDATE`) for every balance change
//! - Two-account transfers that lock in key order to avoid deadlocks
//! - Embedded migrations for the `bank_*` tables
//!
//! # Example
//!
//! ```ignore
//! use ledger_rpc_postgres::PostgresLedgerStorage;
//! use sqlx::PgPool;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPool::connect("postgres://localhost/ledger").await?;
//!     let storage = PostgresLedgerStorage::new(pool);
//!     storage.migrate().await?;
//!     Ok(())
//! }
//! ```

mod error;
mod storage;

pub use storage::PostgresLedgerStorage;
