//! Tokeniser for the Hawk language.
//!
//! Single-character pushback on the reader, single-token pushback in the
//! parser. Operators lex longest-first; keywords are gated by the traits
//! they need, so `getline` is a plain identifier when `RIO` is off.

use hawk_core::{ErrorKind, HawkError, Loc, Trait};

use crate::source::SourceReader;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Eof,
    Newline,

    // assignment operators, in opcode order
    Assn,
    PlusAssn,
    MinusAssn,
    MulAssn,
    DivAssn,
    IdivAssn,
    ModAssn,
    ExpAssn,
    ConcatAssn,
    RsAssn,
    LsAssn,
    BandAssn,
    BxorAssn,
    BorAssn,

    Teq,
    Tne,
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
    Ma,
    Nm,
    LNot,
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Mul,
    Div,
    Idiv,
    Mod,
    Lor,
    Land,
    Bor,
    Bxor,
    Band,
    Bnot,
    Rs,
    Ls,
    In,
    Exp,
    Concat,

    Lparen,
    Rparen,
    Lbrace,
    Rbrace,
    Lbrack,
    Rbrack,

    Dollar,
    Comma,
    Semicolon,
    Colon,
    DblColon,
    Quest,

    // extended reserved words
    XGlobal,
    XLocal,
    XInclude,
    XIncludeOnce,
    XPragma,
    XAbort,
    XReset,

    // reserved words
    Begin,
    End,
    Function,
    If,
    Else,
    While,
    For,
    Do,
    Break,
    Continue,
    Return,
    Exit,
    Delete,
    Next,
    NextFile,
    NextOfile,
    Print,
    Printf,
    Getline,

    Ident(String),
    Int(i64),
    Flt(f64),
    Str(String),
    Mbs(Vec<u8>),
    Rex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokKind,
    pub loc: Loc,
}

/// Keyword table; the trait column must be fully satisfied for the word
/// to lex as a keyword.
const KWTAB: &[(&str, TokKind, Trait)] = &[
    ("@abort", TokKind::XAbort, Trait::empty()),
    ("@global", TokKind::XGlobal, Trait::empty()),
    ("@include", TokKind::XInclude, Trait::empty()),
    ("@include_once", TokKind::XIncludeOnce, Trait::empty()),
    ("@local", TokKind::XLocal, Trait::empty()),
    ("@pragma", TokKind::XPragma, Trait::empty()),
    ("@reset", TokKind::XReset, Trait::empty()),
    ("BEGIN", TokKind::Begin, Trait::PABLOCK),
    ("END", TokKind::End, Trait::PABLOCK),
    ("break", TokKind::Break, Trait::empty()),
    ("continue", TokKind::Continue, Trait::empty()),
    ("delete", TokKind::Delete, Trait::empty()),
    ("do", TokKind::Do, Trait::empty()),
    ("else", TokKind::Else, Trait::empty()),
    ("exit", TokKind::Exit, Trait::empty()),
    ("for", TokKind::For, Trait::empty()),
    ("function", TokKind::Function, Trait::empty()),
    ("getline", TokKind::Getline, Trait::RIO),
    ("if", TokKind::If, Trait::empty()),
    ("in", TokKind::In, Trait::empty()),
    ("next", TokKind::Next, Trait::PABLOCK),
    ("nextfile", TokKind::NextFile, Trait::PABLOCK),
    (
        "nextofile",
        TokKind::NextOfile,
        Trait::PABLOCK.union(Trait::NEXTOFILE),
    ),
    ("print", TokKind::Print, Trait::RIO),
    ("printf", TokKind::Printf, Trait::RIO),
    ("return", TokKind::Return, Trait::empty()),
    ("while", TokKind::While, Trait::empty()),
];

fn keyword_for(word: &str, traits: Trait) -> Option<TokKind> {
    KWTAB
        .iter()
        .find(|(kw, _, _)| *kw == word)
        .and_then(|(_, kind, need)| traits.contains(*need).then(|| kind.clone()))
}

pub(crate) struct Lexer<'io> {
    pub reader: SourceReader<'io>,
    traits: Trait,
}

impl<'io> Lexer<'io> {
    pub fn new(reader: SourceReader<'io>, traits: Trait) -> Lexer<'io> {
        Lexer { reader, traits }
    }

    fn err(&self, kind: ErrorKind, msg: String, loc: &Loc) -> HawkError {
        HawkError::with_msg(kind, msg).at(loc.clone())
    }

    pub fn next_token(&mut self) -> Result<Token, HawkError> {
        loop {
            let loc = self.reader.loc();
            let Some(c) = self.reader.get()? else {
                return Ok(Token {
                    kind: TokKind::Eof,
                    loc,
                });
            };
            let kind = match c {
                ' ' | '\t' | '\r' => continue,
                '\\' => {
                    // line continuation
                    match self.reader.get()? {
                        Some('\n') => continue,
                        Some('\r') => {
                            if let Some(nl) = self.reader.get()? {
                                if nl == '\n' {
                                    continue;
                                }
                                self.reader.unget(nl);
                            }
                            continue;
                        }
                        _ => {
                            return Err(self.err(
                                ErrorKind::Invalid,
                                "stray backslash".to_string(),
                                &loc,
                            ))
                        }
                    }
                }
                '#' => {
                    while let Some(c) = self.reader.get()? {
                        if c == '\n' {
                            self.reader.unget(c);
                            break;
                        }
                    }
                    continue;
                }
                '\n' => TokKind::Newline,
                '0'..='9' => {
                    self.reader.unget(c);
                    self.lex_number(&loc)?
                }
                '.' => match self.peek()? {
                    Some(d) if d.is_ascii_digit() => {
                        self.reader.unget(c);
                        self.lex_number(&loc)?
                    }
                    _ => {
                        return Err(self.err(
                            ErrorKind::Invalid,
                            "stray '.'".to_string(),
                            &loc,
                        ))
                    }
                },
                '"' => TokKind::Str(self.lex_dq_string(&loc)?),
                '\'' => TokKind::Str(self.lex_sq_string(&loc)?),
                'B' => match self.peek()? {
                    Some('"') => {
                        self.reader.get()?;
                        TokKind::Mbs(self.lex_dq_string(&loc)?.bytes().collect())
                    }
                    Some('\'') => {
                        self.reader.get()?;
                        TokKind::Mbs(self.lex_sq_string(&loc)?.bytes().collect())
                    }
                    _ => {
                        self.reader.unget(c);
                        self.lex_word(&loc)?
                    }
                },
                c if c.is_alphabetic() || c == '_' || c == '@' => {
                    self.reader.unget(c);
                    self.lex_word(&loc)?
                }
                '=' => match self.peek()? {
                    Some('=') => {
                        self.reader.get()?;
                        if self.eat('=')? {
                            TokKind::Teq
                        } else {
                            TokKind::Eq
                        }
                    }
                    _ => TokKind::Assn,
                },
                '!' => {
                    if self.eat('=')? {
                        if self.eat('=')? {
                            TokKind::Tne
                        } else {
                            TokKind::Ne
                        }
                    } else if self.eat('~')? {
                        TokKind::Nm
                    } else {
                        TokKind::LNot
                    }
                }
                '>' => {
                    if self.eat('>')? {
                        if self.eat('=')? {
                            TokKind::RsAssn
                        } else {
                            TokKind::Rs
                        }
                    } else if self.eat('=')? {
                        TokKind::Ge
                    } else {
                        TokKind::Gt
                    }
                }
                '<' => {
                    if self.eat('<')? {
                        if self.eat('=')? {
                            TokKind::LsAssn
                        } else {
                            TokKind::Ls
                        }
                    } else if self.eat('=')? {
                        TokKind::Le
                    } else {
                        TokKind::Lt
                    }
                }
                '+' => {
                    if self.eat('+')? {
                        TokKind::PlusPlus
                    } else if self.eat('=')? {
                        TokKind::PlusAssn
                    } else {
                        TokKind::Plus
                    }
                }
                '-' => {
                    if self.eat('-')? {
                        TokKind::MinusMinus
                    } else if self.eat('=')? {
                        TokKind::MinusAssn
                    } else {
                        TokKind::Minus
                    }
                }
                '*' => {
                    if self.eat('=')? {
                        TokKind::MulAssn
                    } else {
                        TokKind::Mul
                    }
                }
                '/' => {
                    if self.eat('/')? {
                        if self.eat('=')? {
                            TokKind::IdivAssn
                        } else {
                            TokKind::Idiv
                        }
                    } else if self.eat('=')? {
                        TokKind::DivAssn
                    } else {
                        TokKind::Div
                    }
                }
                '%' => {
                    if self.eat('%')? {
                        if self.eat('=')? {
                            TokKind::ConcatAssn
                        } else {
                            TokKind::Concat
                        }
                    } else if self.eat('=')? {
                        TokKind::ModAssn
                    } else {
                        TokKind::Mod
                    }
                }
                '^' => {
                    if self.eat('^')? {
                        if self.eat('=')? {
                            TokKind::BxorAssn
                        } else {
                            TokKind::Bxor
                        }
                    } else if self.eat('=')? {
                        TokKind::ExpAssn
                    } else {
                        TokKind::Exp
                    }
                }
                '~' => {
                    if self.eat('~')? {
                        TokKind::Bnot
                    } else {
                        TokKind::Ma
                    }
                }
                '&' => {
                    if self.eat('&')? {
                        TokKind::Land
                    } else if self.eat('=')? {
                        TokKind::BandAssn
                    } else {
                        TokKind::Band
                    }
                }
                '|' => {
                    if self.eat('|')? {
                        TokKind::Lor
                    } else if self.eat('=')? {
                        TokKind::BorAssn
                    } else {
                        TokKind::Bor
                    }
                }
                '(' => TokKind::Lparen,
                ')' => TokKind::Rparen,
                '{' => TokKind::Lbrace,
                '}' => TokKind::Rbrace,
                '[' => TokKind::Lbrack,
                ']' => TokKind::Rbrack,
                '$' => TokKind::Dollar,
                ',' => TokKind::Comma,
                ';' => TokKind::Semicolon,
                ':' => {
                    if self.eat(':')? {
                        TokKind::DblColon
                    } else {
                        TokKind::Colon
                    }
                }
                '?' => TokKind::Quest,
                other => {
                    return Err(self.err(
                        ErrorKind::Invalid,
                        format!("invalid character '{}'", other),
                        &loc,
                    ))
                }
            };
            return Ok(Token { kind, loc });
        }
    }

    fn peek(&mut self) -> Result<Option<char>, HawkError> {
        let c = self.reader.get()?;
        if let Some(c) = c {
            self.reader.unget(c);
        }
        Ok(c)
    }

    fn eat(&mut self, want: char) -> Result<bool, HawkError> {
        match self.reader.get()? {
            Some(c) if c == want => Ok(true),
            Some(c) => {
                self.reader.unget(c);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn lex_word(&mut self, loc: &Loc) -> Result<TokKind, HawkError> {
        let mut word = String::new();
        if let Some(c) = self.reader.get()? {
            word.push(c);
        }
        while let Some(c) = self.reader.get()? {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
            } else {
                self.reader.unget(c);
                break;
            }
        }
        if let Some(kind) = keyword_for(&word, self.traits) {
            return Ok(kind);
        }
        if word.starts_with('@') {
            return Err(self.err(
                ErrorKind::Invalid,
                format!("undefined keyword '{}'", word),
                loc,
            ));
        }
        Ok(TokKind::Ident(word))
    }

    fn lex_number(&mut self, loc: &Loc) -> Result<TokKind, HawkError> {
        let mut text = String::new();
        let first = self.reader.get()?.expect("digit present");
        text.push(first);

        if first == '0' {
            match self.peek()? {
                Some('x') | Some('X') => {
                    self.reader.get()?;
                    let digits = self.take_while(|c| c.is_ascii_hexdigit())?;
                    return self.radix_token(&digits, 16, loc);
                }
                Some('b') | Some('B') => {
                    self.reader.get()?;
                    let digits = self.take_while(|c| c == '0' || c == '1')?;
                    return self.radix_token(&digits, 2, loc);
                }
                _ => {}
            }
        }

        text.push_str(&self.take_while(|c| c.is_ascii_digit())?);
        let mut is_float = first == '.';
        if !is_float {
            if let Some('.') = self.peek()? {
                self.reader.get()?;
                text.push('.');
                text.push_str(&self.take_while(|c| c.is_ascii_digit())?);
                is_float = true;
            }
        } else {
            // started at '.', digits already consumed above
        }
        if matches!(self.peek()?, Some('e') | Some('E')) {
            self.reader.get()?;
            let mut exp = String::from("e");
            if matches!(self.peek()?, Some('+') | Some('-')) {
                exp.push(self.reader.get()?.unwrap());
            }
            let digits = self.take_while(|c| c.is_ascii_digit())?;
            if digits.is_empty() {
                return Err(self.err(
                    ErrorKind::Invalid,
                    "malformed exponent".to_string(),
                    loc,
                ));
            }
            exp.push_str(&digits);
            text.push_str(&exp);
            is_float = true;
        }

        if is_float {
            let v: f64 = text
                .parse()
                .map_err(|_| self.err(ErrorKind::Invalid, format!("bad number '{}'", text), loc))?;
            Ok(TokKind::Flt(v))
        } else if text.len() > 1 && text.starts_with('0') {
            self.radix_token(&text[1..], 8, loc)
        } else {
            let v: i64 = text
                .parse()
                .map_err(|_| self.err(ErrorKind::Invalid, format!("bad number '{}'", text), loc))?;
            Ok(TokKind::Int(v))
        }
    }

    fn radix_token(&self, digits: &str, radix: u32, loc: &Loc) -> Result<TokKind, HawkError> {
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(self.err(
                ErrorKind::Invalid,
                format!("bad radix-{} number", radix),
                loc,
            ));
        }
        i64::from_str_radix(digits, radix)
            .map(TokKind::Int)
            .map_err(|_| self.err(ErrorKind::Invalid, "integer overflow".to_string(), loc))
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> Result<String, HawkError> {
        let mut out = String::new();
        while let Some(c) = self.reader.get()? {
            if pred(c) {
                out.push(c);
            } else {
                self.reader.unget(c);
                break;
            }
        }
        Ok(out)
    }

    /// Double-quoted string with C-style escapes.
    fn lex_dq_string(&mut self, loc: &Loc) -> Result<String, HawkError> {
        let mut out = String::new();
        loop {
            let Some(c) = self.reader.get()? else {
                return Err(self.err(ErrorKind::Eof, "string not terminated".to_string(), loc));
            };
            match c {
                '"' => return Ok(out),
                '\n' if !self.traits.contains(Trait::MULTILINE_STR) => {
                    return Err(self.err(
                        ErrorKind::Invalid,
                        "newline in string literal".to_string(),
                        loc,
                    ))
                }
                '\\' => out.push_str(&self.lex_escape(loc)?),
                c => out.push(c),
            }
        }
    }

    fn lex_escape(&mut self, loc: &Loc) -> Result<String, HawkError> {
        let Some(c) = self.reader.get()? else {
            return Err(self.err(ErrorKind::Eof, "string not terminated".to_string(), loc));
        };
        Ok(match c {
            'n' => "\n".to_string(),
            't' => "\t".to_string(),
            'r' => "\r".to_string(),
            'f' => "\u{c}".to_string(),
            'v' => "\u{b}".to_string(),
            'a' => "\u{7}".to_string(),
            'b' => "\u{8}".to_string(),
            'x' => self.hex_escape(2, loc)?,
            'u' => self.hex_escape(4, loc)?,
            'U' => self.hex_escape(8, loc)?,
            '0'..='7' => {
                let mut v = c.to_digit(8).unwrap();
                for _ in 0..2 {
                    match self.peek()? {
                        Some(d) if d.is_digit(8) => {
                            self.reader.get()?;
                            v = v * 8 + d.to_digit(8).unwrap();
                        }
                        _ => break,
                    }
                }
                char::from_u32(v).map(String::from).unwrap_or_default()
            }
            // unknown escapes keep the character itself
            c => c.to_string(),
        })
    }

    fn hex_escape(&mut self, max: usize, loc: &Loc) -> Result<String, HawkError> {
        let mut v: u32 = 0;
        let mut n = 0;
        while n < max {
            match self.peek()? {
                Some(d) if d.is_ascii_hexdigit() => {
                    self.reader.get()?;
                    v = v.wrapping_mul(16) + d.to_digit(16).unwrap();
                    n += 1;
                }
                _ => break,
            }
        }
        if n == 0 {
            return Err(self.err(
                ErrorKind::Invalid,
                "malformed hex escape".to_string(),
                loc,
            ));
        }
        Ok(char::from_u32(v).map(String::from).unwrap_or_default())
    }

    /// Single-quoted string: no escapes except the terminator.
    fn lex_sq_string(&mut self, loc: &Loc) -> Result<String, HawkError> {
        let mut out = String::new();
        loop {
            let Some(c) = self.reader.get()? else {
                return Err(self.err(ErrorKind::Eof, "string not terminated".to_string(), loc));
            };
            match c {
                '\'' => return Ok(out),
                '\n' if !self.traits.contains(Trait::MULTILINE_STR) => {
                    return Err(self.err(
                        ErrorKind::Invalid,
                        "newline in string literal".to_string(),
                        loc,
                    ))
                }
                c => out.push(c),
            }
        }
    }

    /// Convert a just-lexed `/`-family token into the regex literal it
    /// opens. `prefix` holds characters the operator lexing already
    /// consumed past the opening slash (`=` from `/=`); a lexed `//`
    /// is the empty pattern and never reaches here.
    pub fn read_regex_rest(&mut self, prefix: &str, loc: &Loc) -> Result<String, HawkError> {
        let mut out = String::from(prefix);
        loop {
            let Some(c) = self.reader.get()? else {
                return Err(self.err(ErrorKind::Eof, "regex not terminated".to_string(), loc));
            };
            match c {
                '/' => return Ok(out),
                '\n' if !self.traits.contains(Trait::MULTILINE_STR) => {
                    return Err(self.err(
                        ErrorKind::Invalid,
                        "newline in regex literal".to_string(),
                        loc,
                    ))
                }
                '\\' => {
                    // keep the escape for the regex compiler, except for a
                    // quoted slash
                    match self.reader.get()? {
                        Some('/') => out.push('/'),
                        Some(e) => {
                            out.push('\\');
                            out.push(e);
                        }
                        None => {
                            return Err(self.err(
                                ErrorKind::Eof,
                                "regex not terminated".to_string(),
                                loc,
                            ))
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceReader, StringSource};

    fn lex_all(src: &str) -> Vec<TokKind> {
        let mut io = StringSource::new(src);
        let reader = SourceReader::new(&mut io, 8).unwrap();
        let mut lexer = Lexer::new(reader, Trait::MODERN);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            let done = tok.kind == TokKind::Eof;
            out.push(tok.kind);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn operators_longest_match() {
        assert_eq!(
            lex_all("=== == = !== != !~ ! >>= >> >= > <<= << <= <"),
            vec![
                TokKind::Teq,
                TokKind::Eq,
                TokKind::Assn,
                TokKind::Tne,
                TokKind::Ne,
                TokKind::Nm,
                TokKind::LNot,
                TokKind::RsAssn,
                TokKind::Rs,
                TokKind::Ge,
                TokKind::Gt,
                TokKind::LsAssn,
                TokKind::Ls,
                TokKind::Le,
                TokKind::Lt,
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn composite_operators() {
        assert_eq!(
            lex_all("%% ^^ ~~ :: // %%= ^^="),
            vec![
                TokKind::Concat,
                TokKind::Bxor,
                TokKind::Bnot,
                TokKind::DblColon,
                TokKind::Idiv,
                TokKind::ConcatAssn,
                TokKind::BxorAssn,
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lex_all("12 0x1F 0b11 017 2.5 1e3 .5"),
            vec![
                TokKind::Int(12),
                TokKind::Int(31),
                TokKind::Int(3),
                TokKind::Int(15),
                TokKind::Flt(2.5),
                TokKind::Flt(1000.0),
                TokKind::Flt(0.5),
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            lex_all(r#""a\tb" "\x41" "\101" 'no\escape'"#),
            vec![
                TokKind::Str("a\tb".to_string()),
                TokKind::Str("A".to_string()),
                TokKind::Str("A".to_string()),
                TokKind::Str(r"no\escape".to_string()),
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn byte_strings() {
        assert_eq!(
            lex_all(r#"B"ab" B'cd' Bob"#),
            vec![
                TokKind::Mbs(vec![b'a', b'b']),
                TokKind::Mbs(vec![b'c', b'd']),
                TokKind::Ident("Bob".to_string()),
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_gated_by_traits() {
        let mut io = StringSource::new("print getline BEGIN");
        let reader = SourceReader::new(&mut io, 8).unwrap();
        let mut lexer = Lexer::new(reader, Trait::empty());
        // with no traits these all lex as plain identifiers
        for expect in ["print", "getline", "BEGIN"] {
            let t = lexer.next_token().unwrap();
            assert_eq!(t.kind, TokKind::Ident(expect.to_string()));
        }
    }

    #[test]
    fn at_keywords() {
        assert_eq!(
            lex_all("@global @include_once @pragma"),
            vec![
                TokKind::XGlobal,
                TokKind::XIncludeOnce,
                TokKind::XPragma,
                TokKind::Eof,
            ]
        );
        let mut io = StringSource::new("@nosuch");
        let reader = SourceReader::new(&mut io, 8).unwrap();
        let mut lexer = Lexer::new(reader, Trait::MODERN);
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn comments_and_newlines() {
        assert_eq!(
            lex_all("a # trailing\nb"),
            vec![
                TokKind::Ident("a".to_string()),
                TokKind::Newline,
                TokKind::Ident("b".to_string()),
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn line_continuation() {
        assert_eq!(
            lex_all("a \\\n b"),
            vec![
                TokKind::Ident("a".to_string()),
                TokKind::Ident("b".to_string()),
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn regex_rest() {
        let mut io = StringSource::new("ab+\\/c/ rest");
        let reader = SourceReader::new(&mut io, 8).unwrap();
        let mut lexer = Lexer::new(reader, Trait::MODERN);
        let pat = lexer.read_regex_rest("", &Loc::default()).unwrap();
        assert_eq!(pat, "ab+/c");
        assert_eq!(
            lexer.next_token().unwrap().kind,
            TokKind::Ident("rest".to_string())
        );
    }
}
