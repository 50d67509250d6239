// gravlax-vm - Property-based interpreter tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Property-based tests over the full pipeline: interning identity,
//! number formatting round trips, and arithmetic agreement with the host's
//! f64 semantics.

mod common;
use common::run;

use proptest::prelude::*;

/// Source-safe string content: no quotes, no backslashes, no newlines.
fn literal_text() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-zA-Z0-9 _.,!?-]{0,24}").expect("valid regex")
}

/// A number literal the scanner accepts: digits with an optional fraction.
fn number_literal() -> impl Strategy<Value = String> {
    (any::<u32>(), proptest::option::of(1u32..=99999)).prop_map(|(whole, frac)| match frac {
        Some(frac) => format!("{}.{}", whole, frac),
        None => whole.to_string(),
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Content-equal strings are the same object, so `==` is content
    /// equality even for strings built at runtime.
    #[test]
    fn interning_makes_equal_strings_identical(text in literal_text()) {
        let source = format!(
            "var a = \"{text}\"; var b = \"\" + \"{text}\"; print a == b;"
        );
        prop_assert_eq!(run(&source), "true\n");
    }

    /// Printing a number literal reproduces Rust's shortest round-trip
    /// rendering of the same f64.
    #[test]
    fn number_printing_round_trips(literal in number_literal()) {
        let expected: f64 = literal.parse().expect("literal parses as f64");
        let output = run(&format!("print {};", literal));
        prop_assert_eq!(output, format!("{}\n", expected));
    }

    /// String concatenation agrees with host concatenation.
    #[test]
    fn concatenation_matches_host(a in literal_text(), b in literal_text()) {
        let output = run(&format!("print \"{a}\" + \"{b}\";"));
        prop_assert_eq!(output, format!("{}{}\n", a, b));
    }

    /// Arithmetic is IEEE-754 double arithmetic.
    #[test]
    fn arithmetic_matches_f64(a in -10000i32..10000, b in -10000i32..10000) {
        let (af, bf) = (a as f64, b as f64);
        let source = format!(
            "var a = {a}; var b = {b}; print a + b; print a - b; print a * b;"
        );
        let expected = format!("{}\n{}\n{}\n", af + bf, af - bf, af * bf);
        prop_assert_eq!(run(&source), expected);
    }

    /// Comparison operators agree with f64 ordering.
    #[test]
    fn comparisons_match_f64(a in -1000i32..1000, b in -1000i32..1000) {
        let (af, bf) = (a as f64, b as f64);
        let source = format!("print {a} < {b}; print {a} >= {b}; print {a} == {b};");
        let expected = format!("{}\n{}\n{}\n", af < bf, af >= bf, af == bf);
        prop_assert_eq!(run(&source), expected);
    }
}
