//! Domain layer: pure logic with no I/O.

pub mod digest;
pub mod model;
pub mod pending;
pub mod tx;

pub use digest::canonical_digest;
pub use model::*;
