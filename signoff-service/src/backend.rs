//! Approval backend integration
//!
//! Provides the reqwest client that implements the artifact store and paper
//! record collaborators against the approval REST API and its storage proxy.

mod client;
mod error;
mod responses;

pub use client::BackendClient;
pub use error::BackendError;
