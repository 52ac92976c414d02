//! Property-based tests for the comparer laws, tag escaping, and
//! line round-trips.

use std::cmp::Ordering;

use proptest::prelude::*;

use irc_session::line::{escape_tag_value, unescape_tag_value};
use irc_session::{CaseMapping, Line};

fn mapping_strategy() -> impl Strategy<Value = CaseMapping> {
    prop_oneof![
        Just(CaseMapping::Ascii),
        Just(CaseMapping::Rfc1459),
        Just(CaseMapping::StrictRfc1459),
    ]
}

/// Identifier-shaped strings, weighted toward the fold-sensitive
/// bracket characters.
fn ident_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9\\[\\]\\\\^_`{|}~-]{0,12}").expect("valid regex")
}

fn nickname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z\\[\\]\\\\^_`{|}][a-zA-Z0-9\\[\\]\\\\^_`{|}-]{0,8}")
        .expect("valid regex")
}

fn channel_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[#&][a-zA-Z0-9_\\[\\]{}-]{1,20}").expect("valid regex")
}

fn middle_param_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9#@+_-]{1,12}").expect("valid regex")
}

fn trailing_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\r\n\0]{0,60}").expect("valid regex")
}

fn tag_value_strategy() -> impl Strategy<Value = String> {
    // Printable with the escape-sensitive characters well represented.
    prop::string::string_regex("[ -~;\\\\]{0,40}").expect("valid regex")
}

proptest! {
    #[test]
    fn comparer_equality_implies_equal_hash(
        mapping in mapping_strategy(),
        a in ident_strategy(),
        b in ident_strategy(),
    ) {
        if mapping.eq(&a, &b) {
            prop_assert_eq!(mapping.hash64(&a), mapping.hash64(&b));
        }
    }

    #[test]
    fn comparer_equivalence_laws(
        mapping in mapping_strategy(),
        a in ident_strategy(),
        b in ident_strategy(),
        c in ident_strategy(),
    ) {
        // Reflexive.
        prop_assert!(mapping.eq(&a, &a));
        // Symmetric.
        prop_assert_eq!(mapping.eq(&a, &b), mapping.eq(&b, &a));
        // Transitive.
        if mapping.eq(&a, &b) && mapping.eq(&b, &c) {
            prop_assert!(mapping.eq(&a, &c));
        }
        // Consistent with cmp.
        prop_assert_eq!(mapping.eq(&a, &b), mapping.cmp(&a, &b) == Ordering::Equal);
    }

    #[test]
    fn lower_of_upper_is_lower(mapping in mapping_strategy(), s in ident_strategy()) {
        prop_assert_eq!(
            mapping.to_lower(&mapping.to_upper(&s)),
            mapping.to_lower(&s)
        );
    }

    #[test]
    fn fold_is_idempotent(mapping in mapping_strategy(), s in ident_strategy()) {
        let once = mapping.to_lower(&s);
        prop_assert_eq!(mapping.to_lower(&once.clone()), once);
    }

    #[test]
    fn tag_escape_round_trip(value in tag_value_strategy()) {
        let mut escaped = String::new();
        escape_tag_value(&mut escaped, &value).unwrap();
        prop_assert_eq!(unescape_tag_value(&escaped), value);
    }

    #[test]
    fn line_round_trip(
        nick in nickname_strategy(),
        channel in channel_strategy(),
        middle in middle_param_strategy(),
        trailing in trailing_strategy(),
        tag_value in tag_value_strategy(),
    ) {
        let line = Line::cmd("PRIVMSG", [channel, middle, trailing])
            .with_source(&format!("{}!user@example.net", nick))
            .with_tag("t", &tag_value);
        let reparsed = Line::parse(&line.to_string()).unwrap();
        prop_assert_eq!(reparsed, line);
    }

    #[test]
    fn parser_never_panics(raw in "[^\0]{0,80}") {
        let _ = Line::parse(&raw);
    }
}
