//! Short code generators.
//!
//! Generators are pure: they never look at storage, so nothing here
//! guarantees uniqueness. Callers detect collisions through the store's
//! `ShortUrlConflict` signal and ask for another code.

pub mod base62;
pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use snip_core::ShortCode;

/// Trait for generating short codes.
///
/// Implementations can vary from random generators to sequential counters.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<ShortCode>;

    /// Produces a candidate short code.
    fn generate(&self) -> Self::Output;
}
