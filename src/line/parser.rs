//! Nom-based wire line parser.
//!
//! Splits one CRLF-stripped line into its raw sections; tag
//! unescaping and map construction happen in [`super::Line::parse`].

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::opt,
    sequence::preceded,
    IResult,
};

/// Raw sections of a wire line, borrowed from the input.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct RawLine<'a> {
    pub tags: Option<&'a str>,
    pub source: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
}

fn spaces(input: &str) -> IResult<&str, &str> {
    take_while(|c| c == ' ')(input)
}

/// The tag section: everything after `@` up to the next space.
fn tag_section(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_while1(|c| c != ' '))(input)
}

/// The source: everything after `:` up to the next space.
fn source_section(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

/// Command: numeric or alphabetic wire token.
fn command_section(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric())(input)
}

/// Parameters after the command: space-separated middles, then an
/// optional `:`-prefixed trailing that may contain spaces or be
/// empty.
fn params_section(input: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut rest = input;

    loop {
        let trimmed = rest.trim_start_matches(' ');
        if trimmed.len() == rest.len() || trimmed.is_empty() {
            break;
        }
        rest = trimmed;

        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            break;
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    params
}

/// Parse one full line. Leading space runs are tolerated.
pub(super) fn parse_line(input: &str) -> IResult<&str, RawLine<'_>> {
    let (input, _) = spaces(input)?;
    let (input, tags) = opt(tag_section)(input)?;
    let (input, _) = spaces(input)?;
    let (input, source) = opt(source_section)(input)?;
    let (input, _) = spaces(input)?;
    let (input, command) = command_section(input)?;
    let params = params_section(input);
    Ok(("", RawLine { tags, source, command, params }))
}
