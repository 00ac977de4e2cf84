//! Core types for staged records: target schema descriptors, derivation of
//! staging schemas, expiry, and the store abstraction.
//!
//! Nothing here touches a database; backends implement
//! [`store::StagingStore`].

// Store traits spell out `Send` futures where they need them.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod expiry;
pub mod promote;
pub mod record;
pub mod registry;
pub mod schema;
pub mod staging;
pub mod store;

pub use error::{Error, Result, ValidationError};
