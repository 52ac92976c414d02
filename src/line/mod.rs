//! The wire line codec.
//!
//! [`Line`] is the parsed form of one IRC protocol line: an optional
//! tag map, an optional source, a command token, and an ordered
//! parameter list. Whether the last parameter is sent in trailing
//! (`:`-prefixed) form is a serialization concern only — two lines
//! differing only in trailing form parse equal.
//!
//! # Reference
//! - RFC 2812 §2.3.1 message format
//! - IRCv3 message tags: <https://ircv3.net/specs/extensions/message-tags>

mod parser;
pub mod tags;

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LineParseError, ProtocolError};

pub use self::tags::{escape_tag_value, unescape_tag_value};

/// One parsed IRC protocol line.
///
/// Immutable by convention: handlers construct lines with the
/// builder methods and never mutate received ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Line {
    /// IRCv3 message tags. Keys are unique; order carries no meaning.
    pub tags: BTreeMap<String, String>,
    /// Message source (server name or `nick!ident@host`), without the `:`.
    pub source: Option<String>,
    /// Command token, numeric or alphabetic, as received.
    pub command: String,
    /// Ordered parameters, trailing included as a plain last element.
    pub params: Vec<String>,
}

impl Line {
    /// Build a line from a command and parameters.
    pub fn cmd<C, P, S>(command: C, params: P) -> Self
    where
        C: Into<String>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Line {
            tags: BTreeMap::new(),
            source: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach a tag. An absent value serializes as a bare key.
    #[must_use]
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Attach a source.
    #[must_use]
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_owned());
        self
    }

    /// Parse one line of text. Trailing CR/LF is stripped; leading
    /// space runs are tolerated.
    pub fn parse(s: &str) -> Result<Line, LineParseError> {
        let trimmed = s.trim_end_matches(['\r', '\n']);
        if trimmed.trim_start_matches(' ').is_empty() {
            return Err(LineParseError::EmptyLine);
        }

        let raw = match parser::parse_line(trimmed) {
            Ok((_, raw)) => raw,
            Err(_) => return Err(LineParseError::InvalidCommand),
        };

        let mut tags = BTreeMap::new();
        if let Some(section) = raw.tags {
            for item in section.split(';') {
                let (key, value) = match item.split_once('=') {
                    Some((k, v)) => (k, unescape_tag_value(v)),
                    None => (item, String::new()),
                };
                if key.is_empty() {
                    return Err(LineParseError::EmptyTagKey);
                }
                tags.insert(key.to_owned(), value);
            }
        }

        Ok(Line {
            tags,
            source: raw.source.map(str::to_owned),
            command: raw.command.to_owned(),
            params: raw.params.into_iter().map(str::to_owned).collect(),
        })
    }

    /// Decode `bytes` with the given text encoding, then parse.
    /// Invalid sequences become U+FFFD; decoding itself never fails.
    pub fn from_bytes(
        bytes: &[u8],
        enc: &'static encoding::Encoding,
    ) -> Result<Line, ProtocolError> {
        let (text, _, _) = enc.decode(bytes);
        Line::parse(&text).map_err(|cause| ProtocolError::InvalidLine {
            string: String::from_utf8_lossy(bytes).into_owned(),
            cause,
        })
    }

    /// Parameter at `i`, if present.
    pub fn param(&self, i: usize) -> Option<&str> {
        self.params.get(i).map(String::as_str)
    }

    /// The nickname (or server name) portion of the source.
    pub fn source_nick(&self) -> Option<&str> {
        self.source.as_deref().map(|s| split_hostmask(s).0)
    }

    /// Serialized byte length under `enc`, CRLF not included.
    pub fn wire_len(&self, enc: &'static encoding::Encoding) -> usize {
        let rendered = self.to_string();
        let (bytes, _, _) = enc.encode(&rendered);
        bytes.len()
    }
}

/// Split `nick!ident@host` into its parts; absent sections are `None`.
pub fn split_hostmask(mask: &str) -> (&str, Option<&str>, Option<&str>) {
    let (nick, rest) = match mask.split_once('!') {
        Some((n, r)) => (n, Some(r)),
        None => match mask.split_once('@') {
            Some((n, h)) => return (n, None, Some(h)),
            None => (mask, None),
        },
    };
    match rest {
        Some(r) => match r.split_once('@') {
            Some((ident, host)) => (nick, Some(ident), Some(host)),
            None => (nick, Some(r), None),
        },
        None => (nick, None, None),
    }
}

fn needs_trailing(param: &str) -> bool {
    param.is_empty() || param.starts_with(':') || param.contains(' ')
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            f.write_str("@")?;
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                f.write_str(key)?;
                if !value.is_empty() {
                    f.write_str("=")?;
                    escape_tag_value(f, value)?;
                }
            }
            f.write_str(" ")?;
        }
        if let Some(source) = &self.source {
            write!(f, ":{} ", source)?;
        }
        f.write_str(&self.command)?;
        if let Some((last, middles)) = self.params.split_last() {
            for p in middles {
                write!(f, " {}", p)?;
            }
            if needs_trailing(last) {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Line {
    type Err = LineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Line::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tags_into_map() {
        let line = Line::parse("@a=x\\sy;b;c=\\: :srv 001 me :hi").unwrap();
        assert_eq!(line.tags["a"], "x y");
        assert_eq!(line.tags["b"], "");
        assert_eq!(line.tags["c"], ";");
        assert_eq!(line.command, "001");
    }

    #[test]
    fn serialize_uses_trailing_when_needed() {
        let line = Line::cmd("PRIVMSG", ["#ch", "one two"]);
        assert_eq!(line.to_string(), "PRIVMSG #ch :one two");

        let line = Line::cmd("PRIVMSG", ["#ch", "bare"]);
        assert_eq!(line.to_string(), "PRIVMSG #ch bare");

        let line = Line::cmd("TOPIC", ["#ch", ""]);
        assert_eq!(line.to_string(), "TOPIC #ch :");

        let line = Line::cmd("PRIVMSG", ["#ch", ":leading"]);
        assert_eq!(line.to_string(), "PRIVMSG #ch ::leading");
    }

    #[test]
    fn round_trip_with_tags_and_source() {
        let line = Line::cmd("PRIVMSG", ["#ch", "hello world"])
            .with_tag("time", "2026-01-01T00:00:00Z")
            .with_tag("empty", "")
            .with_source("n!u@h");
        let reparsed = Line::parse(&line.to_string()).unwrap();
        assert_eq!(reparsed, line);
    }

    #[test]
    fn empty_line_rejected() {
        assert_eq!(Line::parse("   "), Err(LineParseError::EmptyLine));
        assert_eq!(Line::parse("\r\n"), Err(LineParseError::EmptyLine));
    }

    #[test]
    fn from_bytes_replaces_invalid_sequences() {
        let line = Line::from_bytes(b"PRIVMSG #ch :caf\xc3\xa9", encoding::UTF_8).unwrap();
        assert_eq!(line.param(1), Some("café"));

        let line = Line::from_bytes(b"PRIVMSG #ch :bad\xff\xfe", encoding::UTF_8).unwrap();
        assert!(line.param(1).unwrap().contains('\u{FFFD}'));
    }

    #[test]
    fn from_bytes_latin1() {
        let line = Line::from_bytes(b"PRIVMSG #ch :caf\xe9", encoding::WINDOWS_1252).unwrap();
        assert_eq!(line.param(1), Some("café"));
    }

    #[test]
    fn hostmask_split() {
        assert_eq!(split_hostmask("n!u@h"), ("n", Some("u"), Some("h")));
        assert_eq!(split_hostmask("n!u"), ("n", Some("u"), None));
        assert_eq!(split_hostmask("n@h"), ("n", None, Some("h")));
        assert_eq!(split_hostmask("irc.example.net"), ("irc.example.net", None, None));
    }

    #[test]
    fn duplicate_tag_keys_keep_last() {
        let line = Line::parse("@k=1;k=2 PING :x").unwrap();
        assert_eq!(line.tags["k"], "2");
    }
}
