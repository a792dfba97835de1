//! Trade execution client for the DEUS Synchronizer.
//!
//! Oracle nodes sign the synth prices, this crate collects and reconciles their signatures,
//! encodes the Synchronizer call and hands it to a wallet for estimation and submission.

pub mod assets;
pub mod chains;
pub mod config;
pub mod error;
pub mod execution;
pub mod oracle;
pub mod portfolio;
pub mod quote;
pub mod reconcile;
pub mod route;
pub mod state;
pub mod submit;
pub mod synchronizer;
pub mod tracker;
pub mod types;
pub mod wallet;

pub use error::{FetchError, TradeError};
pub use execution::TradeExecutor;
