//! cartsync cart engine.
//!
//! Keeps a guest's local cart and a signed-in user's server cart behind one
//! display view:
//! - [`local`] - persisted guest cart with subscribe/state/dispatch
//! - [`remote`] - REST client for the server cart
//! - [`reconcile`] - picks the cart to show (replace, never merge)
//! - [`dispatch`] - optimistic local update, then queued remote call
//! - [`engine`] - façade bundling the above

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod local;
pub mod notify;
pub mod reconcile;
pub mod remote;
pub mod view;

pub use engine::{CartEngine, CartEngineBuilder};
pub use error::CartError;
pub use reconcile::{CartSource, DisplayCartItem, ReconciledCart};
