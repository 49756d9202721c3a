//! Core KitLoan client library.
//!
//! Implements the client side of the KitLoan rental platform: wallet top-ups
//! through a redirect-based payment gateway with exactly-once completion,
//! authoritative pull-based reconciliation, and a push channel whose events
//! are merged into the same in-memory account view without duplication.
//!
//! The crate is transport-agnostic at its seams: the REST backend is reached
//! through the [`client::ApiConnector`] trait (implemented by
//! [`client::HttpClient`]), ephemeral markers live behind
//! [`kitloan_common::session::SessionStore`], and the live channel runs over
//! any [`kitloan_common::pub_sub::remote_consumer::Transport`].

pub mod client;
pub mod wallet;

pub use client::{ApiConnector, HttpClient};
pub use kitloan_common::{self as common, Amount, Error};
pub use wallet::{Wallet, WalletBuilder};
