//! # hotfeed core
//!
//! Runtime-agnostic pieces of hotfeed: the cached item model, the rules that
//! turn raw completion text into summary bullets (and the fallback used when
//! that fails), and the [`store::CacheStore`] abstraction with an in-memory
//! backend.
//!
//! This crate contains no tokio, sqlx, filesystem or network I/O. Concrete
//! I/O-bound backends and adapters live in the `hotfeed` crate.

pub mod models;
pub mod store;
pub mod summary;
