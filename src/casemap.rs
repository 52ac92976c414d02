//! Identifier case mapping.
//!
//! IRC equality is server-defined: the CASEMAPPING ISUPPORT token
//! selects which characters fold together. Every nickname and
//! channel lookup in this crate goes through a [`CaseMapping`].
//!
//! # Reference
//! - Modern IRC, CASEMAPPING: <https://modern.ircdocs.horse/#casemapping-parameter>

use std::cmp::Ordering;

/// A server-negotiated identifier folding rule.
///
/// `Rfc1459` folds `[\]^` to `{|}~` in addition to ASCII letters;
/// `StrictRfc1459` leaves `^`/`~` distinct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CaseMapping {
    /// Fold A–Z to a–z only.
    Ascii,
    /// Fold A–Z and `[\]^` to a–z and `{|}~`.
    #[default]
    Rfc1459,
    /// Fold A–Z and `[\]` to a–z and `{|}` (no `^` folding).
    StrictRfc1459,
}

impl CaseMapping {
    /// Parse the CASEMAPPING token value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("ascii") {
            Some(Self::Ascii)
        } else if value.eq_ignore_ascii_case("rfc1459") {
            Some(Self::Rfc1459)
        } else if value.eq_ignore_ascii_case("strict-rfc1459") {
            Some(Self::StrictRfc1459)
        } else {
            None
        }
    }

    /// The token value this mapping serializes to.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Rfc1459 => "rfc1459",
            Self::StrictRfc1459 => "strict-rfc1459",
        }
    }

    /// Fold a single character to its canonical lowercase form.
    pub fn fold_char(&self, c: char) -> char {
        match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            '[' if *self != Self::Ascii => '{',
            ']' if *self != Self::Ascii => '}',
            '\\' if *self != Self::Ascii => '|',
            '^' if *self == Self::Rfc1459 => '~',
            _ => c,
        }
    }

    /// The inverse of [`fold_char`](Self::fold_char).
    pub fn unfold_char(&self, c: char) -> char {
        match c {
            'a'..='z' => c.to_ascii_uppercase(),
            '{' if *self != Self::Ascii => '[',
            '}' if *self != Self::Ascii => ']',
            '|' if *self != Self::Ascii => '\\',
            '~' if *self == Self::Rfc1459 => '^',
            _ => c,
        }
    }

    /// Canonical lowercase form of `s`. Folded strings are the keys
    /// of every case-mapped index in the crate.
    pub fn to_lower(&self, s: &str) -> String {
        s.chars().map(|c| self.fold_char(c)).collect()
    }

    /// Canonical uppercase form of `s`.
    pub fn to_upper(&self, s: &str) -> String {
        s.chars().map(|c| self.unfold_char(c)).collect()
    }

    /// Equality under this mapping.
    pub fn eq(&self, a: &str, b: &str) -> bool {
        a.len() == b.len()
            && a.chars()
                .zip(b.chars())
                .all(|(ca, cb)| self.fold_char(ca) == self.fold_char(cb))
    }

    /// Lexicographic comparison on folded code points. The empty
    /// string sorts below any non-empty string.
    pub fn cmp(&self, a: &str, b: &str) -> Ordering {
        let mut ia = a.chars().map(|c| self.fold_char(c));
        let mut ib = b.chars().map(|c| self.fold_char(c));
        loop {
            match (ia.next(), ib.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(x), Some(y)) => match x.cmp(&y) {
                    Ordering::Equal => continue,
                    other => return other,
                },
            }
        }
    }

    /// Comparison lifted to optional strings: `None` is less than
    /// every `Some` and equal to itself.
    pub fn cmp_opt(&self, a: Option<&str>, b: Option<&str>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => self.cmp(a, b),
        }
    }

    /// Equality lifted to optional strings.
    pub fn eq_opt(&self, a: Option<&str>, b: Option<&str>) -> bool {
        self.cmp_opt(a, b) == Ordering::Equal
    }

    /// FNV-1a over folded code points, so that
    /// `eq(a, b)` implies `hash64(a) == hash64(b)`.
    pub fn hash64(&self, s: &str) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for c in s.chars() {
            let mut buf = [0u8; 4];
            for b in self.fold_char(c).encode_utf8(&mut buf).bytes() {
                h ^= u64::from(b);
                h = h.wrapping_mul(0x0000_0100_0000_01b3);
            }
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_folds_letters_only() {
        let m = CaseMapping::Ascii;
        assert!(m.eq("Nick", "nick"));
        assert!(!m.eq("[a]", "{a}"));
        assert_eq!(m.to_lower("A[\\]^"), "a[\\]^");
    }

    #[test]
    fn rfc1459_folds_brackets_and_caret() {
        let m = CaseMapping::Rfc1459;
        assert!(m.eq("[\\]^", "{|}~"));
        assert_eq!(m.to_lower("NI[CK]^"), "ni{ck}~");
        assert_eq!(m.to_upper("ni{ck}~"), "NI[CK]^");
    }

    #[test]
    fn strict_rfc1459_leaves_caret() {
        let m = CaseMapping::StrictRfc1459;
        assert!(m.eq("[\\]", "{|}"));
        assert!(!m.eq("^", "~"));
    }

    #[test]
    fn cmp_orders_empty_first() {
        let m = CaseMapping::Rfc1459;
        assert_eq!(m.cmp("", "a"), Ordering::Less);
        assert_eq!(m.cmp("a", ""), Ordering::Greater);
        assert_eq!(m.cmp("", ""), Ordering::Equal);
        assert_eq!(m.cmp("Alpha", "alpha"), Ordering::Equal);
        assert_eq!(m.cmp("abc", "abd"), Ordering::Less);
    }

    #[test]
    fn cmp_opt_none_below_everything() {
        let m = CaseMapping::Ascii;
        assert_eq!(m.cmp_opt(None, None), Ordering::Equal);
        assert_eq!(m.cmp_opt(None, Some("")), Ordering::Less);
        assert_eq!(m.cmp_opt(Some(""), None), Ordering::Greater);
    }

    #[test]
    fn equal_strings_hash_equal() {
        let m = CaseMapping::Rfc1459;
        assert_eq!(m.hash64("Nick[1]"), m.hash64("nick{1}"));
        assert_ne!(m.hash64("alice"), m.hash64("bob"));
    }

    #[test]
    fn parse_token_values() {
        assert_eq!(CaseMapping::parse("ascii"), Some(CaseMapping::Ascii));
        assert_eq!(CaseMapping::parse("RFC1459"), Some(CaseMapping::Rfc1459));
        assert_eq!(
            CaseMapping::parse("strict-rfc1459"),
            Some(CaseMapping::StrictRfc1459)
        );
        assert_eq!(CaseMapping::parse("rfc7613"), None);
    }
}
