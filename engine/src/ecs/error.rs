//! Contract-violation taxonomy for the ECS.
//!
//! Every failure in this crate is misuse, not an environmental condition:
//! stale handles, unbalanced filter locks, malformed filter declarations.
//! Checks are active in debug builds and compiled out in release builds,
//! where the hot paths assume correctness for throughput. A violated
//! contract panics with the matching [`ContractViolation`] so the misuse is
//! caught at the point of introduction.

use thiserror::Error;

/// The categories of misuse the debug build detects.
#[derive(Debug, Error)]
pub enum ContractViolation {
    /// Generation mismatch, null handle, or a handle from another world.
    #[error("invalid entity handle: {0}")]
    InvalidHandle(String),

    /// Operation on a destroyed world, or a double destroy.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A filter with the same include/exclude sets but a different declared
    /// order already exists.
    #[error("duplicate filter: {0}")]
    DuplicateFilter(String),

    /// Structurally malformed filter declaration or access.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// More filter unlocks than locks.
    #[error("filter lock underflow: {0}")]
    LockUnderflow(String),

    /// An entity was created but never received a component.
    #[error("leaked entity: {0}")]
    LeakedEntity(String),
}

/// Debug-only contract check. The condition is not evaluated in release
/// builds; a failed check panics with the given [`ContractViolation`] kind.
macro_rules! contract {
    ($cond:expr, $kind:ident, $($arg:tt)+) => {
        if cfg!(debug_assertions) && !($cond) {
            panic!(
                "{}",
                $crate::ecs::error::ContractViolation::$kind(format!($($arg)+))
            );
        }
    };
}

pub(crate) use contract;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_messages_carry_their_category() {
        // Given
        let violation = ContractViolation::InvalidHandle("generation mismatch".into());

        // Then
        assert_eq!(
            violation.to_string(),
            "invalid entity handle: generation mismatch"
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "filter lock underflow")]
    fn failed_contract_panics_in_debug() {
        contract!(1 == 2, LockUnderflow, "unbalanced unlock");
    }
}
