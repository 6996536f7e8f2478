pub mod state_machine;

pub use state_machine::{ensure_valid_transition, is_terminal, validate_transition};
