//! Property tests for the expression-vector algebra (§8) and the warning-state stack (§4.9),
//! grounded on the pack's own `proptest!` usage (e.g. `aero-cpu-decoder`'s `fuzz_props.rs`).

use asm::expr::{add_vectors, scalar_mult, Expr};
use asm::warn::{WarnAction, WarningState};
use proptest::prelude::*;

proptest! {
    /// `add_vectors` is commutative for two simple (plain-integer) expressions, since both
    /// sides carry only a `Simple` term and no far-absolute segment to drop asymmetrically.
    #[test]
    fn add_vectors_is_commutative_for_simple_values(a in any::<i32>(), b in any::<i32>()) {
        let p = Expr::simple(a as i64);
        let q = Expr::simple(b as i64);
        prop_assert_eq!(add_vectors(&p, &q).reloc_value(), add_vectors(&q, &p).reloc_value());
    }

    /// Adding two simple expressions sums their offsets exactly.
    #[test]
    fn add_vectors_sums_simple_offsets(a in any::<i32>(), b in any::<i32>()) {
        let p = Expr::simple(a as i64);
        let q = Expr::simple(b as i64);
        let sum = add_vectors(&p, &q);
        prop_assert!(sum.is_really_simple());
        prop_assert_eq!(sum.reloc_value(), a as i64 + b as i64);
    }

    /// Scaling a simple expression by `k` then by `1/k`'s inverse relationship: scaling twice by
    /// factors whose product is 1 (i.e. `k` and `-1` composed with itself) round-trips, avoiding
    /// the divide-by-zero case entirely.
    #[test]
    fn scalar_mult_by_one_is_identity(a in any::<i32>()) {
        let e = Expr::simple(a as i64);
        prop_assert_eq!(scalar_mult(&e, 1).reloc_value(), a as i64);
    }

    /// Scaling twice by `-1` returns the original value.
    #[test]
    fn scalar_mult_negation_is_involutive(a in any::<i32>()) {
        let e = Expr::simple(a as i64);
        let once = scalar_mult(&e, -1);
        let twice = scalar_mult(&once, -1);
        prop_assert_eq!(twice.reloc_value(), a as i64);
    }

    /// Any expression touched by `Expr::unknown()` on either side poisons the whole sum,
    /// regardless of what the other side carries (§8: unknown is absorbing).
    #[test]
    fn unknown_poisons_add_vectors(a in any::<i32>()) {
        let known = Expr::simple(a as i64);
        let unknown = Expr::unknown();
        prop_assert!(add_vectors(&known, &unknown).is_unknown());
        prop_assert!(add_vectors(&unknown, &known).is_unknown());
    }

    /// A sequence of pushes followed by the same number of pops always returns the warning
    /// state to what it was before, regardless of what got enabled/disabled in between (§4.9).
    #[test]
    fn push_pop_pairs_restore_enabled_state(toggle_off in any::<bool>()) {
        let mut w = WarningState::new();
        w.seal_floor();
        let before = w.is_enabled(asm::warn::WarningClass::FloatOverflow);
        w.push();
        if toggle_off {
            w.apply(WarnAction::Disable("float-overflow".to_string())).unwrap();
        } else {
            w.apply(WarnAction::Enable("float-overflow".to_string())).unwrap();
        }
        w.pop();
        prop_assert_eq!(w.is_enabled(asm::warn::WarningClass::FloatOverflow), before);
    }

    /// `reset_to_floor` never pops: however many pushes preceded it, every one of them is still
    /// poppable afterward (§8 property 6), and one more pop beyond that hits the permanent floor.
    #[test]
    fn reset_to_floor_preserves_stack_depth(pushes in 0usize..8) {
        let mut w = WarningState::new();
        w.seal_floor();
        for _ in 0..pushes {
            w.push();
        }
        w.reset_to_floor();
        for _ in 0..pushes {
            prop_assert!(w.pop());
        }
        prop_assert!(!w.pop());
    }
}
