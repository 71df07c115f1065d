//! Service methods, one file per RPC service.
//!
//! Each method takes typed requests and produces typed responses; transports
//! in [`crate::handlers`] only move frames.

mod bank;
mod resiliency;
