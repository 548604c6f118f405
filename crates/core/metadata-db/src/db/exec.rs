//! Custom executor trait for metadata database operations
//!
//! This module defines a marker trait that extends [`sqlx::Executor`] and restricts
//! which types can be used as database executors in the public API.

use sqlx::Postgres;

/// Database executor trait that extends [`sqlx::Executor`]
///
/// Implemented for `&MetadataDb` (autocommit statements on the pool) and
/// `&mut Transaction` (statements inside an open transaction).
pub trait Executor<'c>: sqlx::Executor<'c, Database = Postgres> + crate::_priv::Sealed {}
