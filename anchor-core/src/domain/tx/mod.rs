//! Minimal wire codec for the target ledger's transaction format, plus
//! size-based fee arithmetic and per-input signature pre-image digests.

pub mod builder;
pub mod encode;
pub mod fee;
pub mod script;
pub mod sighash;

pub use builder::{build_transaction, BuildParams, BuiltTransaction, TxInputSource};
pub use encode::{Transaction, TxInput, TxOutput};
pub use fee::fee_for_size;
