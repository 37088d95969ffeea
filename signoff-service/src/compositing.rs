//! Document normalization and signature compositing.
//!
//! Everything here is synchronous and CPU bound apart from
//! [`resolve_signatures`], which fetches signer artifacts concurrently.

pub mod compositor;
pub mod layout;
pub mod normalize;
pub mod pdf;
pub mod sniff;
pub mod text;

#[cfg(test)]
pub(crate) mod fixtures;

pub use compositor::{
    CompositeResult, ResolvedSignature, SignatureCompositor, SlotOutcome, SlotReport,
    resolve_signatures,
};
pub use normalize::Normalizer;
pub use sniff::ContentKind;
