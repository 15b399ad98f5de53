//! Core types and trait definitions for the Frami patient portal.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the data model, the access policy, the scoped query filter and the
//! notification fan-out planner; storage backends and the HTTP layer build on
//! it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod entity;
pub mod error;
pub mod fanout;
pub mod groups;
pub mod model;
pub mod notification;
pub mod payload;
pub mod scope;
pub mod store;
pub mod user;

pub use error::{Error, Result};
