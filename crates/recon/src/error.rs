use std::fmt;
use std::path::PathBuf;

/// Which of the three input documents an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    Sop,
    RateCard,
    Settlement,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sop => write!(f, "SOP"),
            Self::RateCard => write!(f, "rate card"),
            Self::Settlement => write!(f, "settlement report"),
        }
    }
}

/// A document could not be read or has no usable structure.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub document: Document,
    pub message: String,
    /// 1-based line (CSV record) the failure was detected on, if known.
    pub line: Option<u64>,
}

impl ParseError {
    pub fn new(document: Document, message: impl Into<String>) -> Self {
        Self { document, message: message.into(), line: None }
    }

    pub fn at_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} line {line}: {}", self.document, self.message),
            None => write!(f, "{}: {}", self.document, self.message),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub enum ReconError {
    /// One of the three input documents failed to parse.
    Parse(ParseError),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad weight, inverted thresholds, etc.).
    ConfigValidation(String),
    /// The SOP declares nothing a tour can be joined on.
    NoMatch(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "cannot reconcile: {e}"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::NoMatch(msg) => write!(f, "no tour could be normalized: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for ReconError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

/// Writing a report workbook failed. The destination is left untouched.
#[derive(Debug)]
pub struct ExportError {
    pub path: PathBuf,
    pub message: String,
}

impl ExportError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot write report {}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for ExportError {}
