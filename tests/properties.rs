//! Property-based tests for the interval lattice.
//!
//! The laws here are the algebra the solver relies on: identity of the
//! Unknown/Empty states, commutativity, inclusion monotonicity of the
//! arithmetic operations, and absorption by the full range.

use proptest::prelude::*;
use range_analysis::{Range, Width};

fn w() -> Width {
    Width::new(32)
}

/// A regular interval with smallish finite bounds.
fn finite() -> impl Strategy<Value = Range> {
    (-1000i128..=1000, -1000i128..=1000)
        .prop_map(|(a, b)| Range::new(a.min(b), a.max(b)))
}

/// A regular interval that may have sentinel bounds.
fn interval() -> impl Strategy<Value = Range> {
    prop_oneof![
        finite(),
        finite().prop_map(|r| Range::new(w().min(), r.upper())),
        finite().prop_map(|r| Range::new(r.lower(), w().max())),
        Just(Range::full(w())),
    ]
}

/// `inner ⊆ outer`?
fn contains(outer: &Range, inner: &Range) -> bool {
    outer.lower() <= inner.lower() && inner.upper() <= outer.upper()
}

/// A pair `(small, large)` with `small ⊆ large`.
fn nested() -> impl Strategy<Value = (Range, Range)> {
    (finite(), 0i128..=100, 0i128..=100).prop_map(|(r, dl, dh)| {
        let large = Range::new(
            w().clamp(r.lower() - dl),
            w().clamp(r.upper() + dh),
        );
        (r, large)
    })
}

proptest! {
    #[test]
    fn union_identities(r in interval()) {
        prop_assert_eq!(r.union_with(&Range::empty(w())), r);
        prop_assert_eq!(r.union_with(&Range::unknown(w())), r);
        prop_assert_eq!(Range::empty(w()).union_with(&r), r);
        prop_assert_eq!(Range::unknown(w()).union_with(&r), r);
    }

    #[test]
    fn intersect_identities(r in interval()) {
        prop_assert!(r.intersect_with(&Range::empty(w()), w()).is_empty());
        prop_assert_eq!(r.intersect_with(&Range::unknown(w()), w()), r);
        prop_assert_eq!(Range::unknown(w()).intersect_with(&r, w()), r);
    }

    #[test]
    fn add_commutes(a in interval(), b in interval()) {
        prop_assert_eq!(a.add(&b, w()), b.add(&a, w()));
    }

    #[test]
    fn mul_commutes(a in interval(), b in interval()) {
        prop_assert_eq!(a.mul(&b, w()), b.mul(&a, w()));
    }

    #[test]
    fn union_is_an_upper_bound(a in interval(), b in interval()) {
        let u = a.union_with(&b);
        prop_assert!(contains(&u, &a));
        prop_assert!(contains(&u, &b));
    }

    #[test]
    fn full_absorbs(r in interval()) {
        prop_assert_eq!(Range::full(w()).add(&r, w()), Range::full(w()));
        prop_assert_eq!(Range::full(w()).mul(&r, w()), Range::full(w()));
    }

    #[test]
    fn add_is_monotone((a, big_a) in nested(), (b, big_b) in nested()) {
        let small = a.add(&b, w());
        let large = big_a.add(&big_b, w());
        prop_assert!(contains(&large, &small));
    }

    #[test]
    fn sub_is_monotone((a, big_a) in nested(), (b, big_b) in nested()) {
        let small = a.sub(&b, w());
        let large = big_a.sub(&big_b, w());
        prop_assert!(contains(&large, &small));
    }

    #[test]
    fn mul_is_monotone((a, big_a) in nested(), (b, big_b) in nested()) {
        let small = a.mul(&b, w());
        let large = big_a.mul(&big_b, w());
        prop_assert!(contains(&large, &small));
    }
}

proptest! {
    #[test]
    fn add_covers_concrete_sums(
        a in -1000i128..=1000,
        b in -1000i128..=1000,
        c in -1000i128..=1000,
        d in -1000i128..=1000,
    ) {
        let x = Range::new(a.min(b), a.max(b));
        let y = Range::new(c.min(d), c.max(d));
        let r = x.add(&y, w());
        for (p, q) in [(x.lower(), y.lower()), (x.upper(), y.upper()), (x.lower(), y.upper())] {
            prop_assert!(r.lower() <= p + q && p + q <= r.upper());
        }
    }

    #[test]
    fn mul_covers_corner_products(
        a in -100i128..=100,
        b in -100i128..=100,
        c in -100i128..=100,
        d in -100i128..=100,
    ) {
        let x = Range::new(a.min(b), a.max(b));
        let y = Range::new(c.min(d), c.max(d));
        let r = x.mul(&y, w());
        for p in [x.lower(), x.upper()] {
            for q in [y.lower(), y.upper()] {
                prop_assert!(r.lower() <= p * q && p * q <= r.upper());
            }
        }
    }
}
