use std::{error::Error as StdError, fmt, io, path::PathBuf};

/// Why a bit range such as `4-7` was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitsError {
    Syntax(String),
    StartOutOfRange { start: u32 },
    TooWide { start: u32, count: u32 },
}

impl fmt::Display for BitsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitsError::Syntax(spec) => write!(
                f,
                "invalid bit range '{spec}', use 'start[-end]' in decimal"
            ),
            BitsError::StartOutOfRange { start } => {
                write!(f, "start bit {start} is outside of 0..=31")
            }
            BitsError::TooWide { start, count } => write!(
                f,
                "{count} bits starting at bit {start} do not fit in 32 bits"
            ),
        }
    }
}

impl StdError for BitsError {}

/// A single rejected line of a definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Register line with something other than `.b`, `.w` or `.l` after the address
    InvalidWidth(char),
    /// Register name not followed by whitespace and a hex address
    ExpectedAddress(String),
    /// Anything left over after the address and width suffix
    TrailingInput(String),
    InvalidBits(BitsError),
    UnknownField(String),
    /// `:name` not followed by `:` or `/`
    MissingFieldSeparator(String),
    FieldWithoutContainer,
    InclusionWithoutRegister,
    UnknownFieldSet(String),
    InvalidFieldSetName(String),
    Unrecognized(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidWidth(c) => write!(f, "invalid width char '{c}'"),
            ParseErrorKind::ExpectedAddress(rest) => {
                write!(f, "expecting a hex address, found <{rest}>")
            }
            ParseErrorKind::TrailingInput(rest) => {
                write!(f, "expecting end of address, found <{rest}>")
            }
            ParseErrorKind::InvalidBits(e) => write!(f, "{e}"),
            ParseErrorKind::UnknownField(name) => {
                write!(f, "no previously defined field named '{name}'")
            }
            ParseErrorKind::MissingFieldSeparator(line) => {
                write!(f, "missing field separator in <{line}>")
            }
            ParseErrorKind::FieldWithoutContainer => {
                f.write_str("field line outside of a register or field set")
            }
            ParseErrorKind::InclusionWithoutRegister => {
                f.write_str("field set inclusion outside of a register")
            }
            ParseErrorKind::UnknownFieldSet(name) => write!(f, "unknown field set '{name}'"),
            ParseErrorKind::InvalidFieldSetName(line) => {
                write!(f, "invalid field set name <{line}>")
            }
            ParseErrorKind::Unrecognized(line) => write!(f, "unrecognized line <{line}>"),
        }
    }
}

impl StdError for ParseError {}

/// The definition file itself could not be used.
#[derive(Debug)]
pub enum LoadError {
    Open { path: PathBuf, source: io::Error },
    Read { line: usize, source: io::Error },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Open { path, .. } => write!(f, "cannot open {}", path.display()),
            LoadError::Read { line, .. } => write!(f, "read failed after line {line}"),
        }
    }
}

impl StdError for LoadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            LoadError::Open { source, .. } | LoadError::Read { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NothingMatched(String),
    InvalidSpecifier(String),
    InvalidWidth(char),
    InvalidBits(BitsError),
    /// `0xADDR:NAME`; named fields need a register name to look them up in
    NamedFieldOnAddress(String),
    InvalidValue(String),
    AmbiguousRegisters { count: usize },
    AmbiguousFields { register: String, count: usize },
    /// A named field was asked for on a register that does not have it
    NoSuchField { register: String, field: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NothingMatched(spec) => write!(f, "nothing matched {spec}"),
            ResolveError::InvalidSpecifier(spec) => write!(
                f,
                "invalid register name or address '{spec}', use NAME or 0xHEX"
            ),
            ResolveError::InvalidWidth(c) => write!(f, "invalid width char <{c}>"),
            ResolveError::InvalidBits(e) => write!(f, "{e}"),
            ResolveError::NamedFieldOnAddress(spec) => write!(
                f,
                "'{spec}': only bit ranges can follow an address, use the register name for named fields"
            ),
            ResolveError::InvalidValue(value) => write!(f, "invalid value '{value}', use hex"),
            ResolveError::AmbiguousRegisters { count } => {
                write!(f, "{count} registers matched, refusing to write")
            }
            ResolveError::AmbiguousFields { register, count } => write!(
                f,
                "{count} fields matched on {register}, refusing to write"
            ),
            ResolveError::NoSuchField { register, field } => {
                write!(f, "{register} has no field {field}, refusing to write")
            }
        }
    }
}

impl StdError for ResolveError {}

#[derive(Debug)]
pub enum AccessError {
    ValueOutOfRange {
        register: String,
        value: u32,
        max: u32,
    },
    FieldOutsideWidth {
        register: String,
        field: String,
    },
    MultipleFields {
        register: String,
        count: usize,
    },
    Misaligned {
        address: u64,
        width: usize,
    },
    Open {
        path: PathBuf,
        source: io::Error,
    },
    Map {
        page: u64,
        source: io::Error,
    },
}

impl AccessError {
    /// Device and mapping failures leave nothing else worth attempting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AccessError::Open { .. } | AccessError::Map { .. })
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::ValueOutOfRange {
                register,
                value,
                max,
            } => write!(
                f,
                "value {value:#x} exceeds max {max:#x} for register {register}"
            ),
            AccessError::FieldOutsideWidth { register, field } => write!(
                f,
                "field {field} lies outside the access width of {register}"
            ),
            AccessError::MultipleFields { register, count } => write!(
                f,
                "{count} fields selected on {register}, a value can only go to one"
            ),
            AccessError::Misaligned { address, width } => {
                write!(f, "address {address:#010x} is not aligned to {width} bytes")
            }
            AccessError::Open { path, .. } => write!(f, "cannot open {}", path.display()),
            AccessError::Map { page, .. } => write!(f, "cannot map page {page:#010x}"),
        }
    }
}

impl StdError for AccessError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AccessError::Open { source, .. } | AccessError::Map { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Everything a single devregs invocation can fail with.
#[derive(Debug)]
pub enum Error {
    Load(LoadError),
    Resolve(ResolveError),
    Access(AccessError),
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Load(_) => true,
            Error::Resolve(_) => false,
            Error::Access(e) => e.is_fatal(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Load(e) => write!(f, "{e}"),
            Error::Resolve(e) => write!(f, "{e}"),
            Error::Access(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Load(e) => e.source(),
            Error::Resolve(e) => e.source(),
            Error::Access(e) => e.source(),
        }
    }
}

impl From<LoadError> for Error {
    fn from(value: LoadError) -> Self {
        Error::Load(value)
    }
}

impl From<ResolveError> for Error {
    fn from(value: ResolveError) -> Self {
        Error::Resolve(value)
    }
}

impl From<AccessError> for Error {
    fn from(value: AccessError) -> Self {
        Error::Access(value)
    }
}
