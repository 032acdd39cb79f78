//! cartsync core - shared cart domain types.
//!
//! This crate provides the types shared by every cartsync component:
//! - `cartsync` - The cart synchronization engine
//! - `cartsync-cli` - Command-line driver for the engine
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no persistence. This keeps it lightweight and allows the pure
//! parts of the engine (the reconciler) to depend on nothing else.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for identifiers, quantities and prices

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
