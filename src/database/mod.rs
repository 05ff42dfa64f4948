//! # Database Backends
//!
//! The [`ConnectionBackend`] trait is the only place the failover layer
//! touches a database client. [`PgBackend`] implements it with SQLx
//! connection pools: a handle is a `PgPool` bound to one endpoint, and a
//! probe is `SELECT 1` on a dedicated connection or through the pool.

pub mod backend;
pub mod postgres;

pub use backend::ConnectionBackend;
pub use postgres::PgBackend;
