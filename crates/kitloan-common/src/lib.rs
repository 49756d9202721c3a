//! KitLoan shared types and functions.
//!
//! This crate is the base foundation for the KitLoan client crates. It holds
//! the shared records and traits: the error taxonomy, minor-unit amounts,
//! payment and account records, tolerant payload normalization, the
//! session-store abstraction, the push-channel wire types and the generic
//! pub-sub consumer the live event channel is built on.

pub mod account;
pub mod amount;
pub mod error;
pub mod events;
pub mod normalize;
pub mod payment;
pub mod pub_sub;
pub mod session;
pub mod util;
pub mod wallet;
pub mod ws;

pub use amount::Amount;
pub use error::{Error, ErrorResponse};
