//! POSIX extended pattern parser.
//!
//! Produces the [`Ast`] consumed by the compiler. Bounds (`{m,n}`) are only
//! recognised when [`CompileOpts::bounds`] is set; otherwise `{` is an
//! ordinary character, matching the classic AWK behavior.

use crate::ast::{Assertion, Ast, ClassSet, SetItem};
use crate::class::CharClass;
use crate::{CompileOpts, RegexError};

/// Upper bound for `{m,n}` repetition counts.
const DUP_MAX: u32 = 255;

pub fn parse(pattern: &str, opts: CompileOpts) -> Result<Ast, RegexError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut p = Parser {
        chars,
        pos: 0,
        opts,
        groups_opened: 0,
        groups_closed: Vec::new(),
    };
    let ast = p.parse_alt()?;
    if p.pos != p.chars.len() {
        // the only way to stop early is an unmatched ')'
        return Err(RegexError::BadParen);
    }
    Ok(ast)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    opts: CompileOpts,
    groups_opened: usize,
    groups_closed: Vec<usize>,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn parse_alt(&mut self) -> Result<Ast, RegexError> {
        let mut branches = vec![self.parse_concat()?];
        while self.peek() == Some('|') {
            self.bump();
            branches.push(self.parse_concat()?);
        }
        if branches.len() == 1 {
            Ok(branches.pop().unwrap())
        } else {
            Ok(Ast::Alt(branches))
        }
    }

    fn parse_concat(&mut self) -> Result<Ast, RegexError> {
        let mut items: Vec<Ast> = Vec::new();
        loop {
            match self.peek() {
                None | Some('|') | Some(')') => break,
                Some('*') | Some('+') | Some('?') => {
                    // postfix with nothing before it
                    return Err(RegexError::BadRepeat);
                }
                _ => {}
            }
            let atom = self.parse_atom()?;
            let atom = self.parse_postfix(atom)?;
            items.push(atom);
        }
        match items.len() {
            0 => Ok(Ast::Empty),
            1 => Ok(items.pop().unwrap()),
            _ => Ok(Ast::Concat(items)),
        }
    }

    fn parse_postfix(&mut self, mut atom: Ast) -> Result<Ast, RegexError> {
        loop {
            match self.peek() {
                Some('*') => {
                    self.bump();
                    atom = repeat(atom, 0, None);
                }
                Some('+') => {
                    self.bump();
                    atom = repeat(atom, 1, None);
                }
                Some('?') => {
                    self.bump();
                    atom = repeat(atom, 0, Some(1));
                }
                Some('{') if self.opts.bounds && self.looks_like_bound() => {
                    self.bump();
                    let (min, max) = self.parse_bound()?;
                    atom = repeat(atom, min, max);
                }
                _ => return Ok(atom),
            }
        }
    }

    /// `{` opens a bound only when followed by a digit; `a{b}` keeps the
    /// brace literal even in bounds mode.
    fn looks_like_bound(&self) -> bool {
        matches!(self.chars.get(self.pos + 1), Some(c) if c.is_ascii_digit())
    }

    fn parse_bound(&mut self) -> Result<(u32, Option<u32>), RegexError> {
        let min = self.parse_bound_number()?;
        let max = match self.peek() {
            Some(',') => {
                self.bump();
                match self.peek() {
                    Some('}') => None,
                    Some(c) if c.is_ascii_digit() => Some(self.parse_bound_number()?),
                    _ => return Err(RegexError::BadBrace),
                }
            }
            _ => Some(min),
        };
        if self.bump() != Some('}') {
            return Err(RegexError::BadBrace);
        }
        if let Some(max) = max {
            if min > max {
                return Err(RegexError::BadBrace);
            }
        }
        Ok((min, max))
    }

    fn parse_bound_number(&mut self) -> Result<u32, RegexError> {
        let mut n: u32 = 0;
        let mut any = false;
        while let Some(c) = self.peek() {
            if let Some(d) = c.to_digit(10) {
                self.bump();
                any = true;
                n = n.saturating_mul(10).saturating_add(d);
                if n > DUP_MAX {
                    return Err(RegexError::BadBrace);
                }
            } else {
                break;
            }
        }
        if !any {
            return Err(RegexError::BadBrace);
        }
        Ok(n)
    }

    fn parse_atom(&mut self) -> Result<Ast, RegexError> {
        match self.bump().ok_or(RegexError::BadPattern)? {
            '(' => {
                self.groups_opened += 1;
                let idx = self.groups_opened;
                let inner = self.parse_alt()?;
                if self.bump() != Some(')') {
                    return Err(RegexError::BadParen);
                }
                self.groups_closed.push(idx);
                Ok(Ast::Group {
                    idx,
                    node: Box::new(inner),
                })
            }
            '[' => self.parse_bracket(),
            '.' => Ok(Ast::Any),
            '^' => Ok(Ast::Assert(Assertion::Bol)),
            '$' => Ok(Ast::Assert(Assertion::Eol)),
            '\\' => self.parse_escape(),
            c => Ok(Ast::Literal(c as u32)),
        }
    }

    fn parse_escape(&mut self) -> Result<Ast, RegexError> {
        let c = self.bump().ok_or(RegexError::BadEscape)?;
        Ok(match c {
            'n' => Ast::Literal('\n' as u32),
            't' => Ast::Literal('\t' as u32),
            'r' => Ast::Literal('\r' as u32),
            'f' => Ast::Literal('\u{c}' as u32),
            'v' => Ast::Literal('\u{b}' as u32),
            'a' => Ast::Literal('\u{7}' as u32),
            'b' => Ast::Assert(Assertion::WordBoundary),
            'B' => Ast::Assert(Assertion::NotWordBoundary),
            '<' => Ast::Assert(Assertion::WordStart),
            '>' => Ast::Assert(Assertion::WordEnd),
            '1'..='9' => {
                let idx = c.to_digit(10).unwrap() as u8;
                // the referenced group must be complete at this point;
                // forward and self references are invalid
                if !self.groups_closed.contains(&(idx as usize)) {
                    return Err(RegexError::BadSubReg);
                }
                Ast::BackRef(idx)
            }
            c if c.is_alphanumeric() => return Err(RegexError::BadEscape),
            c => Ast::Literal(c as u32),
        })
    }

    fn parse_bracket(&mut self) -> Result<Ast, RegexError> {
        let mut set = ClassSet::default();
        if self.peek() == Some('^') {
            self.bump();
            set.negate = true;
        }
        // a ']' right after the opener (or the negation) is a literal
        let mut first = true;
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => return Err(RegexError::BadBracket),
            };
            if c == ']' && !first {
                break;
            }
            first = false;
            if c == '[' {
                match self.peek() {
                    Some(':') => {
                        set.items.push(SetItem::Class(self.parse_posix_class()?));
                        continue;
                    }
                    Some('.') | Some('=') => return Err(RegexError::BadCollate),
                    _ => {}
                }
            }
            // range or single character
            if self.peek() == Some('-') && self.chars.get(self.pos + 1).is_some_and(|&n| n != ']') {
                self.bump(); // '-'
                let hi = self.bump().ok_or(RegexError::BadBracket)?;
                if hi == '[' && matches!(self.peek(), Some(':')) {
                    return Err(RegexError::BadRange);
                }
                if (c as u32) > (hi as u32) {
                    return Err(RegexError::BadRange);
                }
                set.items.push(SetItem::Range(c as u32, hi as u32));
            } else {
                set.items.push(SetItem::Range(c as u32, c as u32));
            }
        }
        if set.items.is_empty() {
            return Err(RegexError::BadBracket);
        }
        Ok(Ast::Set(set))
    }

    fn parse_posix_class(&mut self) -> Result<CharClass, RegexError> {
        debug_assert_eq!(self.peek(), Some(':'));
        self.bump();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ':' {
                break;
            }
            self.bump();
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        if self.bump() != Some(':') || self.bump() != Some(']') {
            return Err(RegexError::BadBracket);
        }
        CharClass::by_name(&name).ok_or(RegexError::BadCtype)
    }
}

fn repeat(node: Ast, min: u32, max: Option<u32>) -> Ast {
    Ast::Repeat {
        node: Box::new(node),
        min,
        max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(pat: &str) -> Result<Ast, RegexError> {
        parse(pat, CompileOpts::default())
    }

    fn pb(pat: &str) -> Result<Ast, RegexError> {
        parse(
            pat,
            CompileOpts {
                bounds: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn simple_concat() {
        assert_eq!(
            p("ab").unwrap(),
            Ast::Concat(vec![Ast::Literal('a' as u32), Ast::Literal('b' as u32)])
        );
    }

    #[test]
    fn group_numbering() {
        let ast = p("(a)(b(c))").unwrap();
        // groups are numbered by opening parenthesis
        match ast {
            Ast::Concat(items) => {
                assert!(matches!(items[0], Ast::Group { idx: 1, .. }));
                assert!(matches!(items[1], Ast::Group { idx: 2, .. }));
            }
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn bracket_literal_close() {
        // `[]a]` is a set containing ']' and 'a'
        let ast = p("[]a]").unwrap();
        match ast {
            Ast::Set(set) => {
                assert!(set.contains(']' as u32));
                assert!(set.contains('a' as u32));
                assert!(!set.contains('b' as u32));
            }
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn dash_at_edges_is_literal() {
        let ast = p("[-a]").unwrap();
        match ast {
            Ast::Set(set) => assert!(set.contains('-' as u32)),
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn bound_without_digit_is_literal() {
        let ast = pb("a{b}").unwrap();
        match ast {
            Ast::Concat(items) => assert_eq!(items[1], Ast::Literal('{' as u32)),
            other => panic!("unexpected ast {other:?}"),
        }
    }

    #[test]
    fn bound_forms() {
        assert!(matches!(
            pb("a{3}").unwrap(),
            Ast::Repeat {
                min: 3,
                max: Some(3),
                ..
            }
        ));
        assert!(matches!(
            pb("a{2,}").unwrap(),
            Ast::Repeat { min: 2, max: None, .. }
        ));
        assert_eq!(pb("a{4,2}").unwrap_err(), RegexError::BadBrace);
        assert_eq!(pb("a{1,999}").unwrap_err(), RegexError::BadBrace);
    }

    #[test]
    fn errors() {
        assert_eq!(p("a)").unwrap_err(), RegexError::BadParen);
        assert_eq!(p("[a").unwrap_err(), RegexError::BadBracket);
        assert_eq!(p("[[.a.]]").unwrap_err(), RegexError::BadCollate);
        assert_eq!(p("\\q").unwrap_err(), RegexError::BadEscape);
        assert_eq!(p("a|*").unwrap_err(), RegexError::BadRepeat);
    }

    #[test]
    fn backref_validation() {
        assert!(p("(a)\\1").is_ok());
        assert_eq!(p("\\1(a)").unwrap_err(), RegexError::BadSubReg);
    }
}
