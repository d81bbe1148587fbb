//! Error taxonomy shared across the interpreter.
//!
//! Every fallible operation returns `Result<T, HawkError>`. A `HawkError`
//! couples an [`ErrorKind`] with an optional source-or-runtime location and
//! a formatted message; the kind alone is enough for programmatic handling,
//! the message is for diagnostics.

use std::fmt;
use std::rc::Rc;

use hawk_regex::RegexError;

/// A position in a source file or the running program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Loc {
    /// Source file name; `None` for the main script or runtime errors.
    pub file: Option<Rc<str>>,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub colm: u32,
}

impl Loc {
    pub fn new(line: u32, colm: u32) -> Loc {
        Loc {
            file: None,
            line,
            colm,
        }
    }

    pub fn in_file(file: Rc<str>, line: u32, colm: u32) -> Loc {
        Loc {
            file: Some(file),
            line,
            colm,
        }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(name) => write!(f, "{}:{}:{}", name, self.line, self.colm),
            None => write!(f, "{}:{}", self.line, self.colm),
        }
    }
}

/// Error numbers, mirrored across parse, runtime, regex, and I/O families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    // -- general --
    #[error("insufficient memory")]
    NoMem,
    #[error("invalid parameter or data")]
    Invalid,
    #[error("not found")]
    NoEnt,
    #[error("already exists")]
    Exist,
    #[error("operation not permitted")]
    Perm,
    #[error("no I/O handler provided")]
    IoUser,
    #[error("I/O handler failed")]
    IoImpl,
    #[error("no such I/O name found")]
    IoNameNotFound,
    #[error("unexpected end of input")]
    Eof,
    #[error("cannot open")]
    Open,
    #[error("cannot close")]
    Close,
    #[error("cannot read")]
    Read,
    #[error("cannot write")]
    Write,
    #[error("encoding conversion error")]
    EcErr,
    #[error("buffer full")]
    BufFull,
    #[error("internal error - invariant broken")]
    Intern,
    #[error("runtime halted")]
    RuntimeHalted,

    // -- regex family --
    #[error("invalid regular expression")]
    RexBadPattern,
    #[error("invalid bracket expression in regular expression")]
    RexBadBracket,
    #[error("unbalanced parenthesis in regular expression")]
    RexBadParen,
    #[error("invalid brace expression in regular expression")]
    RexBadBrace,
    #[error("invalid range in regular expression")]
    RexBadRange,
    #[error("nothing to repeat in regular expression")]
    RexBadRepeat,
    #[error("invalid back-reference in regular expression")]
    RexBadSubReg,
    #[error("invalid escape in regular expression")]
    RexBadEscape,
    #[error("invalid collating element in regular expression")]
    RexBadCollate,
    #[error("unknown character class in regular expression")]
    RexBadCtype,

    // -- parse family --
    #[error("left parenthesis expected")]
    Lparen,
    #[error("left brace expected")]
    Lbrace,
    #[error("right brace expected")]
    Rbrace,
    #[error("right parenthesis expected")]
    Rparen,
    #[error("keyword redefined")]
    KwRed,
    #[error("function redefined")]
    FnRed,
    #[error("global variable redefined")]
    GblRed,
    #[error("duplicate local variable")]
    DupLcl,
    #[error("duplicate global variable")]
    DupGbl,
    #[error("duplicate parameter name")]
    DupPar,
    #[error("undefined identifier")]
    Undef,
    #[error("statement not ended properly")]
    Stmtend,
    #[error("expression too deeply nested")]
    ExprNest,
    #[error("block too deeply nested")]
    BlockNest,
    #[error("include level too deep")]
    InclNest,
    #[error("string literal expected for include")]
    InclStr,
    #[error("break outside a loop")]
    BreakNoLoop,
    #[error("continue outside a loop")]
    ContinueNoLoop,
    #[error("return outside a function")]
    ReturnOnly,
    #[error("next cannot be used in the BEGIN block")]
    NextBeg,
    #[error("next cannot be used in the END block")]
    NextEnd,
    #[error("nextfile cannot be used in the BEGIN block")]
    NextFBeg,
    #[error("nextfile cannot be used in the END block")]
    NextFEnd,

    // -- evaluator family --
    #[error("division by zero")]
    DivByZero,
    #[error("stack overflow")]
    StackOvf,
    #[error("too many arguments")]
    TooManyArgs,
    #[error("too few arguments")]
    TooFewArgs,
}

impl From<RegexError> for ErrorKind {
    fn from(e: RegexError) -> ErrorKind {
        match e {
            RegexError::BadPattern => ErrorKind::RexBadPattern,
            RegexError::BadBracket => ErrorKind::RexBadBracket,
            RegexError::BadParen => ErrorKind::RexBadParen,
            RegexError::BadBrace => ErrorKind::RexBadBrace,
            RegexError::BadRange => ErrorKind::RexBadRange,
            RegexError::BadRepeat => ErrorKind::RexBadRepeat,
            RegexError::BadSubReg => ErrorKind::RexBadSubReg,
            RegexError::BadEscape => ErrorKind::RexBadEscape,
            RegexError::BadCollate => ErrorKind::RexBadCollate,
            RegexError::BadCtype => ErrorKind::RexBadCtype,
        }
    }
}

/// An error with its location and rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HawkError {
    pub kind: ErrorKind,
    pub loc: Option<Loc>,
    msg: String,
}

impl std::error::Error for HawkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl fmt::Display for HawkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.loc {
            Some(loc) => write!(f, "{} at {}", self.msg, loc),
            None => f.write_str(&self.msg),
        }
    }
}

impl HawkError {
    pub fn new(kind: ErrorKind) -> HawkError {
        HawkError {
            kind,
            loc: None,
            msg: kind.to_string(),
        }
    }

    pub fn with_msg(kind: ErrorKind, msg: impl Into<String>) -> HawkError {
        HawkError {
            kind,
            loc: None,
            msg: msg.into(),
        }
    }

    pub fn at(mut self, loc: Loc) -> HawkError {
        self.loc = Some(loc);
        self
    }

    /// The rendered message without the location suffix.
    pub fn msg(&self) -> &str {
        &self.msg
    }
}

impl From<ErrorKind> for HawkError {
    fn from(kind: ErrorKind) -> HawkError {
        HawkError::new(kind)
    }
}

impl From<RegexError> for HawkError {
    fn from(e: RegexError) -> HawkError {
        HawkError::with_msg(ErrorKind::from(e), e.to_string())
    }
}

/// Last-error slot kept on the interpreter handle and each runtime context.
///
/// `backup` preserves a message across nested calls that would otherwise
/// overwrite it (the original's `backup_errmsg`).
#[derive(Debug, Default)]
pub struct ErrorState {
    last: Option<HawkError>,
    backup: Option<String>,
}

impl ErrorState {
    pub fn set(&mut self, err: HawkError) {
        self.last = Some(err);
    }

    pub fn last(&self) -> Option<&HawkError> {
        self.last.as_ref()
    }

    pub fn clear(&mut self) {
        self.last = None;
    }

    /// Snapshot the current message so a nested failure can refer to it.
    pub fn backup_errmsg(&mut self) -> Option<&str> {
        self.backup = self.last.as_ref().map(|e| e.msg.clone());
        self.backup.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location() {
        let e = HawkError::new(ErrorKind::Undef).at(Loc::in_file("f.hawk".into(), 3, 7));
        assert_eq!(e.to_string(), "undefined identifier at f.hawk:3:7");
    }

    #[test]
    fn regex_errors_map() {
        assert_eq!(
            ErrorKind::from(RegexError::BadBracket),
            ErrorKind::RexBadBracket
        );
    }

    #[test]
    fn backup_survives_overwrite() {
        let mut st = ErrorState::default();
        st.set(HawkError::with_msg(ErrorKind::Perm, "first failure"));
        assert_eq!(st.backup_errmsg(), Some("first failure"));
        st.set(HawkError::new(ErrorKind::Invalid));
        assert_eq!(st.last().unwrap().kind, ErrorKind::Invalid);
    }
}
