// crates/akashi-core/tests/conflict_state.rs
// ============================================================================
// Module: Conflict State Machine Tests
// Description: Verifies resolution transitions and pair ordering.
// ============================================================================
//! ## Overview
//! Ensures the resolution state machine permits exactly the documented
//! transitions and that conflict pairs always order bytewise.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use akashi_core::ConflictPair;
use akashi_core::ConflictStatus;
use akashi_core::ConflictTransition;
use akashi_core::DecisionId;
use akashi_core::apply_transition;
use uuid::Uuid;

#[test]
fn open_accepts_every_transition() {
    assert_eq!(
        apply_transition(ConflictStatus::Open, ConflictTransition::Acknowledge),
        Ok(ConflictStatus::Acknowledged)
    );
    assert_eq!(
        apply_transition(ConflictStatus::Open, ConflictTransition::Resolve),
        Ok(ConflictStatus::Resolved)
    );
    assert_eq!(
        apply_transition(ConflictStatus::Open, ConflictTransition::WontFix),
        Ok(ConflictStatus::WontFix)
    );
}

#[test]
fn acknowledged_accepts_only_resolve() {
    assert_eq!(
        apply_transition(ConflictStatus::Acknowledged, ConflictTransition::Resolve),
        Ok(ConflictStatus::Resolved)
    );
    assert!(apply_transition(ConflictStatus::Acknowledged, ConflictTransition::Acknowledge).is_err());
    assert!(apply_transition(ConflictStatus::Acknowledged, ConflictTransition::WontFix).is_err());
}

#[test]
fn terminal_states_accept_nothing() {
    for terminal in [ConflictStatus::Resolved, ConflictStatus::WontFix] {
        for via in [
            ConflictTransition::Acknowledge,
            ConflictTransition::Resolve,
            ConflictTransition::WontFix,
        ] {
            assert!(apply_transition(terminal, via).is_err());
        }
    }
}

#[test]
fn pair_ordering_sorts_bytewise() {
    let low = DecisionId::from_uuid(Uuid::from_u128(1));
    let high = DecisionId::from_uuid(Uuid::from_u128(2));
    let forward = ConflictPair::ordered(low, high).expect("pair");
    let reversed = ConflictPair::ordered(high, low).expect("pair");
    assert_eq!(forward, reversed);
    assert_eq!(forward.a, low);
    assert_eq!(forward.b, high);
}

#[test]
fn pair_of_equal_decisions_is_rejected() {
    let id = DecisionId::from_uuid(Uuid::from_u128(7));
    assert!(ConflictPair::ordered(id, id).is_none());
}
