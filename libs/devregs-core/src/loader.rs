//! Parser for the line-oriented register definition format.
//!
//! ```text
//! /CTRL_BITS                  # field set
//! :EN:0
//! LED_CTRL  0x02000000.w      # register, 16 bit access
//! :MODE:1-2                   # field, bits 1..=2
//! :ALIAS:MODE                 # copy of a field defined earlier
//! :CTRL_BITS/                 # include a field set, closes the register
//! ```
//!
//! Bad lines are reported and skipped, they never stop the rest of the file from loading.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{anychar, char, hex_digit1, satisfy, space1},
    combinator::{map_res, opt, recognize},
    sequence::{pair, preceded},
    IResult,
};

use crate::{
    bits::{is_bit_range, parse_bits},
    catalog::{Catalog, FieldDescriptor, FieldSet, Width},
    error::{LoadError, ParseError, ParseErrorKind},
};

/// Result of loading one definition file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Definitions {
    pub catalog: Catalog,
    /// Every line that was rejected, in file order
    pub errors: Vec<ParseError>,
}

pub fn load_path(path: impl AsRef<Path>) -> Result<Definitions, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    load_reader(&path.display().to_string(), BufReader::new(file))
}

/// `source` only names the input in log messages.
pub fn load_reader(source: &str, mut reader: impl BufRead) -> Result<Definitions, LoadError> {
    let mut loader = Loader::new(source);
    let mut buf = Vec::new();
    let mut line_number = 0;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| LoadError::Read {
                line: line_number,
                source,
            })?;
        if read == 0 {
            break;
        }
        line_number += 1;
        loader.feed_line(line_number, &String::from_utf8_lossy(&buf));
    }
    Ok(loader.finish())
}

pub fn parse_str(text: &str) -> Definitions {
    let mut loader = Loader::new("<string>");
    for (i, line) in text.lines().enumerate() {
        loader.feed_line(i + 1, line);
    }
    loader.finish()
}

/// What subsequent field lines attach to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Unknown,
    InRegister,
    InFieldSet,
}

impl State {
    /// `None` if `line` is not allowed in this state.
    fn next(self, line: &Line<'_>) -> Option<State> {
        match (self, line) {
            (state, Line::Blank) => Some(state),
            (_, Line::Register { .. }) => Some(State::InRegister),
            (_, Line::FieldSet { .. }) => Some(State::InFieldSet),
            (State::InRegister | State::InFieldSet, Line::Field { .. }) => Some(self),
            (State::Unknown, Line::Field { .. }) => None,
            (State::InRegister, Line::Include { .. }) => Some(State::Unknown),
            (State::Unknown | State::InFieldSet, Line::Include { .. }) => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Register {
        name: &'a str,
        address: u64,
        width: Width,
    },
    Field {
        name: &'a str,
        spec: &'a str,
    },
    Include {
        name: &'a str,
    },
    FieldSet {
        name: &'a str,
    },
}

struct Loader {
    source: String,
    state: State,
    catalog: Catalog,
    field_sets: Vec<FieldSet>,
    errors: Vec<ParseError>,
}

impl Loader {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            state: State::Unknown,
            catalog: Catalog::default(),
            field_sets: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn feed_line(&mut self, line_number: usize, raw: &str) {
        let text = clean(raw);
        let result = parse_line(text).and_then(|line| self.apply(line));
        if let Err(kind) = result {
            // A broken register or field set header must not let its fields
            // land on whatever was open before it.
            if opens_context(text) {
                self.state = State::Unknown;
            }
            let error = ParseError {
                line: line_number,
                kind,
            };
            log::warn!("{}: {}", self.source, error);
            self.errors.push(error);
        }
    }

    fn apply(&mut self, line: Line<'_>) -> Result<(), ParseErrorKind> {
        let Some(next) = self.state.next(&line) else {
            return Err(match line {
                Line::Include { .. } => ParseErrorKind::InclusionWithoutRegister,
                _ => ParseErrorKind::FieldWithoutContainer,
            });
        };
        match line {
            Line::Blank => {}
            Line::Register {
                name,
                address,
                width,
            } => {
                self.catalog.push_register(name.to_string(), address, width);
            }
            Line::FieldSet { name } => {
                self.field_sets.push(FieldSet {
                    name: name.to_string(),
                    fields: Vec::new(),
                });
            }
            Line::Field { name, spec } => {
                let fields = self.fields_for(name, spec)?;
                match self.state {
                    State::InRegister => self.catalog.prepend_fields(fields),
                    State::InFieldSet => {
                        if let Some(set) = self.field_sets.last_mut() {
                            set.fields.splice(0..0, fields);
                        }
                    }
                    State::Unknown => {}
                }
            }
            Line::Include { name } => {
                // Most recent definition wins when a name is reused
                let Some(set) = self.field_sets.iter().rev().find(|set| set.name == name) else {
                    self.flag_case_mismatch(name);
                    return Err(ParseErrorKind::UnknownFieldSet(name.to_string()));
                };
                self.catalog.append_entry_fields(&set.fields);
            }
        }
        self.state = next;
        Ok(())
    }

    fn fields_for(&self, name: &str, spec: &str) -> Result<Vec<FieldDescriptor>, ParseErrorKind> {
        if spec.is_empty() || is_bit_range(spec) {
            let (startbit, bitcount) = parse_bits(spec).map_err(ParseErrorKind::InvalidBits)?;
            return Ok(vec![FieldDescriptor {
                name: name.to_string(),
                startbit,
                bitcount,
            }]);
        }
        let fields = self.catalog.declared_fields_named(spec);
        if fields.is_empty() {
            return Err(ParseErrorKind::UnknownField(spec.to_string()));
        }
        Ok(fields
            .into_iter()
            .map(|field| FieldDescriptor {
                name: name.to_string(),
                ..field
            })
            .collect())
    }

    fn flag_case_mismatch(&self, name: &str) {
        if let Some(set) = self
            .field_sets
            .iter()
            .find(|set| set.name.eq_ignore_ascii_case(name))
        {
            log::warn!(
                "{}: field set '{}' differs from '{}' only in case, field set names are case-sensitive",
                self.source,
                set.name,
                name
            );
        }
    }

    fn finish(self) -> Definitions {
        log::debug!(
            "{}: {} registers, {} field sets, {} bad lines",
            self.source,
            self.catalog.len(),
            self.field_sets.len(),
            self.errors.len()
        );
        Definitions {
            catalog: self.catalog,
            errors: self.errors,
        }
    }
}

/// Drops comments, surrounding blanks and control characters.
fn clean(raw: &str) -> &str {
    let end = [raw.find('#'), raw.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(raw.len());
    raw[..end].trim_matches(|c: char| c.is_whitespace() || c.is_control())
}

fn opens_context(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '/')
}

fn parse_line(text: &str) -> Result<Line<'_>, ParseErrorKind> {
    match text.chars().next() {
        None => Ok(Line::Blank),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => register_line(text),
        Some(':') => field_line(&text[1..]),
        Some('/') => field_set_line(text),
        Some(_) => Err(ParseErrorKind::Unrecognized(text.to_string())),
    }
}

fn register_line(text: &str) -> Result<Line<'_>, ParseErrorKind> {
    let (rest, name) =
        identifier(text).map_err(|_| ParseErrorKind::Unrecognized(text.to_string()))?;
    let (rest, address) = preceded(space1, hex_address)(rest)
        .map_err(|_: nom::Err<nom::error::Error<&str>>| {
            ParseErrorKind::ExpectedAddress(rest.trim_start().to_string())
        })?;
    let (rest, suffix) = width_suffix(rest)
        .map_err(|_| ParseErrorKind::TrailingInput(rest.to_string()))?;
    let width = match suffix {
        Some(c) => Width::from_suffix(c).ok_or(ParseErrorKind::InvalidWidth(c))?,
        None => Width::Word,
    };
    if !rest.is_empty() {
        return Err(ParseErrorKind::TrailingInput(rest.to_string()));
    }
    Ok(Line::Register {
        name,
        address,
        width,
    })
}

/// `text` is everything after the leading `:`.
fn field_line(text: &str) -> Result<Line<'_>, ParseErrorKind> {
    let body = text.trim_start();
    let (rest, name) = field_name(body)
        .map_err(|_| ParseErrorKind::MissingFieldSeparator(format!(":{text}")))?;
    if let Some(spec) = rest.strip_prefix(':') {
        return Ok(Line::Field {
            name,
            spec: spec.trim(),
        });
    }
    match rest.strip_prefix('/') {
        Some(tail) if tail.trim().is_empty() => Ok(Line::Include { name }),
        Some(tail) => Err(ParseErrorKind::TrailingInput(tail.trim().to_string())),
        None => Err(ParseErrorKind::MissingFieldSeparator(format!(":{text}"))),
    }
}

fn field_set_line(text: &str) -> Result<Line<'_>, ParseErrorKind> {
    match preceded(char('/'), field_name)(text) {
        Ok(("", name)) => Ok(Line::FieldSet { name }),
        _ => Err(ParseErrorKind::InvalidFieldSetName(text.to_string())),
    }
}

pub(crate) fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_name_char),
    ))(input)
}

fn field_name(input: &str) -> IResult<&str, &str> {
    take_while1(is_name_char)(input)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Hex with an optional `0x`; bare digits are hex too.
pub(crate) fn hex_address(input: &str) -> IResult<&str, u64> {
    preceded(
        opt(alt((tag("0x"), tag("0X")))),
        map_res(hex_digit1, |digits| u64::from_str_radix(digits, 16)),
    )(input)
}

pub(crate) fn width_suffix(input: &str) -> IResult<&str, Option<char>> {
    opt(preceded(char('.'), anychar))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, startbit: u32, bitcount: u32) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            startbit,
            bitcount,
        }
    }

    fn names<'a>(defs: &'a Definitions) -> Vec<&'a str> {
        defs.catalog
            .entries()
            .iter()
            .map(|entry| defs.catalog.descriptor_of(entry).unwrap().name.as_str())
            .collect()
    }

    #[test]
    fn widths() {
        let defs = parse_str(
            "A 0x10.w
B 0x20.b
C 0x30.l
D 0x40
E 0x50.W
F 0x60.q
",
        );
        let widths: Vec<_> = defs.catalog.entries().iter().map(|e| e.width).collect();
        assert_eq!(
            widths,
            [
                Width::Halfword,
                Width::Byte,
                Width::Word,
                Width::Word,
                Width::Halfword
            ]
        );
        assert_eq!(names(&defs), ["A", "B", "C", "D", "E"]);
        assert_eq!(
            defs.errors,
            [ParseError {
                line: 6,
                kind: ParseErrorKind::InvalidWidth('q')
            }]
        );
    }

    #[test]
    fn comments_and_blanks() {
        let defs = parse_str(
            "# header comment

   // another one
GPIO1_DR 0x0209C000   # data register
\t:BIT0:0 // first bit\r
",
        );
        assert!(defs.errors.is_empty(), "{:?}", defs.errors);
        let entry = &defs.catalog.entries()[0];
        assert_eq!(entry.address, 0x0209C000);
        assert_eq!(entry.fields, [field("BIT0", 0, 1)]);
    }

    #[test]
    fn fields_are_prepended() {
        let defs = parse_str(
            "LED_CTRL 0x02000000
:ENABLE:0-0
:MODE:1-2
",
        );
        let entry = &defs.catalog.entries()[0];
        assert_eq!(entry.fields, [field("MODE", 1, 2), field("ENABLE", 0, 1)]);
        assert_eq!(
            defs.catalog.descriptor_of(entry).unwrap().fields,
            entry.fields
        );
    }

    #[test]
    fn named_field_copies_every_earlier_match() {
        let defs = parse_str(
            "UART1_CR 0x1000
:en:0
UART2_CR 0x2000
:EN:4
UART3_CR 0x3000
:ENABLE:En
",
        );
        assert!(defs.errors.is_empty(), "{:?}", defs.errors);
        let uart3 = &defs.catalog.entries()[2];
        assert_eq!(
            uart3.fields,
            [field("ENABLE", 0, 1), field("ENABLE", 4, 1)]
        );
    }

    #[test]
    fn unknown_named_field() {
        let defs = parse_str(
            "R 0x0
:A:NOPE
",
        );
        assert!(defs.catalog.entries()[0].fields.is_empty());
        assert_eq!(
            defs.errors[0].kind,
            ParseErrorKind::UnknownField("NOPE".into())
        );
    }

    #[test]
    fn bad_bits_skip_only_that_line() {
        let defs = parse_str(
            "R 0x0
:A:16-40
:B:3
",
        );
        assert_eq!(defs.catalog.entries()[0].fields, [field("B", 3, 1)]);
        assert_eq!(defs.errors.len(), 1);
        assert_eq!(defs.errors[0].line, 2);
        assert!(matches!(
            defs.errors[0].kind,
            ParseErrorKind::InvalidBits(_)
        ));
    }

    #[test]
    fn field_sets_are_appended_and_close_the_register() {
        let defs = parse_str(
            "/CTRL
:EN:0
:IRQ:1
R 0x100
:OWN:8-15
:CTRL/
:LATE:16
",
        );
        let entry = &defs.catalog.entries()[0];
        assert_eq!(
            entry.fields,
            [field("OWN", 8, 8), field("IRQ", 1, 1), field("EN", 0, 1)]
        );
        // Included fields belong to the entry, not to the register's own declarations
        assert_eq!(
            defs.catalog.descriptor_of(entry).unwrap().fields,
            [field("OWN", 8, 8)]
        );
        assert_eq!(
            defs.errors,
            [ParseError {
                line: 7,
                kind: ParseErrorKind::FieldWithoutContainer
            }]
        );
    }

    #[test]
    fn field_set_names_are_case_sensitive() {
        let defs = parse_str(
            "/Ctrl
:EN:0
R 0x100
:CTRL/
:OWN:4
",
        );
        assert_eq!(
            defs.errors,
            [ParseError {
                line: 4,
                kind: ParseErrorKind::UnknownFieldSet("CTRL".into())
            }]
        );
        // failed inclusion leaves the register open
        assert_eq!(defs.catalog.entries()[0].fields, [field("OWN", 4, 1)]);
    }

    #[test]
    fn state_machine_rejections() {
        let defs = parse_str(
            ":ORPHAN:0
:SET/
/SET
:SET/
",
        );
        assert!(defs.catalog.is_empty());
        let kinds: Vec<_> = defs.errors.into_iter().map(|e| (e.line, e.kind)).collect();
        assert_eq!(
            kinds,
            [
                (1, ParseErrorKind::FieldWithoutContainer),
                (2, ParseErrorKind::InclusionWithoutRegister),
                (4, ParseErrorKind::InclusionWithoutRegister),
            ]
        );
    }

    #[test]
    fn transition_table() {
        use State::*;
        let register = Line::Register {
            name: "R",
            address: 0,
            width: Width::Word,
        };
        let field = Line::Field {
            name: "F",
            spec: "0",
        };
        let include = Line::Include { name: "S" };
        let set = Line::FieldSet { name: "S" };
        for state in [Unknown, InRegister, InFieldSet] {
            assert_eq!(state.next(&Line::Blank), Some(state));
            assert_eq!(state.next(&register), Some(InRegister));
            assert_eq!(state.next(&set), Some(InFieldSet));
        }
        assert_eq!(Unknown.next(&field), None);
        assert_eq!(InRegister.next(&field), Some(InRegister));
        assert_eq!(InFieldSet.next(&field), Some(InFieldSet));
        assert_eq!(Unknown.next(&include), None);
        assert_eq!(InRegister.next(&include), Some(Unknown));
        assert_eq!(InFieldSet.next(&include), None);
    }

    #[test]
    fn rejected_register_does_not_inherit_fields() {
        let defs = parse_str(
            "GOOD 0x0
BAD 0x4.z
:F:0
",
        );
        assert_eq!(names(&defs), ["GOOD"]);
        assert!(defs.catalog.entries()[0].fields.is_empty());
        let lines: Vec<_> = defs.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, [2, 3]);
    }

    #[test]
    fn rejected_field_set_does_not_inherit_fields() {
        let defs = parse_str(
            "R 0x0
:A:0
/bad name
:B:1
",
        );
        assert_eq!(defs.catalog.entries()[0].fields, [field("A", 0, 1)]);
        assert_eq!(
            defs.errors,
            [
                ParseError {
                    line: 3,
                    kind: ParseErrorKind::InvalidFieldSetName("/bad name".into())
                },
                ParseError {
                    line: 4,
                    kind: ParseErrorKind::FieldWithoutContainer
                },
            ]
        );
    }

    #[test]
    fn syntax_errors() {
        let defs = parse_str(
            "NOADDR
SPACED 0x10 junk
1234 0x10
:NOSEP
/bad name
R 0x0
",
        );
        assert_eq!(names(&defs), ["R"]);
        let kinds: Vec<_> = defs.errors.into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                ParseErrorKind::ExpectedAddress("".into()),
                ParseErrorKind::TrailingInput(" junk".into()),
                ParseErrorKind::Unrecognized("1234 0x10".into()),
                ParseErrorKind::MissingFieldSeparator(":NOSEP".into()),
                ParseErrorKind::InvalidFieldSetName("/bad name".into()),
            ]
        );
    }

    #[test]
    fn duplicate_addresses_are_kept() {
        let defs = parse_str(
            "FIRST 0x10
SECOND 0x10
",
        );
        assert_eq!(defs.catalog.len(), 2);
        let found = defs.catalog.find_by_address(0x10).unwrap();
        assert_eq!(defs.catalog.descriptor_of(found).unwrap().name, "FIRST");
        assert!(defs.catalog.find_by_address(0x14).is_none());
    }

    #[test]
    fn loading_is_deterministic() {
        let text = "/S
:A:0
R1 0x0.w
:B:1-3
:S/
R2 0x4
:C:B
";
        assert_eq!(parse_str(text), parse_str(text));
        let from_reader = load_reader("test", text.as_bytes()).unwrap();
        assert_eq!(from_reader, parse_str(text));
    }

    #[test]
    fn missing_file() {
        let err = load_path("/nonexistent/devregs.dat").unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }
}
