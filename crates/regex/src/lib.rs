//! Tagged-NFA regular expression engine for the Hawk interpreter.
//!
//! Supports POSIX extended syntax plus `\N` back-references and `{m,n}`
//! bounds. A compiled [`Regex`] holds a TNFA whose transitions may fire
//! position-recording tags; submatch spans are reconstructed from the tag
//! array of the winning match.
//!
//! Two matchers share the TNFA: a parallel lockstep simulator used for
//! patterns without back-references, and a depth-first backtracker used
//! when back-references are present (or when forced via
//! [`ExecOpts::backtracking`]).
//!
//! Back-reference submatch semantics follow GNU-style longest match: an
//! inner capture anchored only by a back-reference reports the span it last
//! matched, not an empty span.

mod ast;
mod backtrack;
mod class;
mod compile;
mod parse;
mod parallel;
mod tnfa;

pub use class::{CharClass, Sym};

use tnfa::Tnfa;

/// Compile-time configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOpts {
    /// Case-insensitive matching.
    pub icase: bool,
    /// Recognise `{m,n}` bound expressions. When off, `{` is a literal.
    pub bounds: bool,
}

/// Match-time configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOpts {
    /// `^` does not match at the start of the input.
    pub notbol: bool,
    /// `$` does not match at the end of the input.
    pub noteol: bool,
    /// Force the backtracking matcher even without back-references.
    pub backtracking: bool,
}

/// Compilation failure, mirroring the POSIX `reg_errcode_t` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegexError {
    #[error("invalid regular expression")]
    BadPattern,
    #[error("unbalanced or invalid bracket expression")]
    BadBracket,
    #[error("unbalanced parenthesis")]
    BadParen,
    #[error("invalid brace expression")]
    BadBrace,
    #[error("invalid character range")]
    BadRange,
    #[error("nothing to repeat")]
    BadRepeat,
    #[error("invalid back-reference")]
    BadSubReg,
    #[error("invalid escape sequence")]
    BadEscape,
    #[error("invalid collating element")]
    BadCollate,
    #[error("unknown character class name")]
    BadCtype,
}

/// Submatch spans of a successful match.
///
/// `spans[0]` is the whole match; `spans[i]` is the i-th parenthesised
/// group. Offsets are element indices into the haystack slice (char
/// indices for [`Regex::exec_str`]). A group that did not participate in
/// the match is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captures {
    pub spans: Vec<Option<(usize, usize)>>,
}

impl Captures {
    /// Span of the whole match.
    pub fn whole(&self) -> (usize, usize) {
        self.spans[0].expect("a match always has a whole-match span")
    }

    pub fn group(&self, i: usize) -> Option<(usize, usize)> {
        self.spans.get(i).copied().flatten()
    }
}

/// A compiled regular expression.
pub struct Regex {
    pattern: String,
    tnfa: Tnfa,
}

impl std::fmt::Debug for Regex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Regex")
            .field("pattern", &self.pattern)
            .field("groups", &self.tnfa.num_submatches)
            .field("backrefs", &self.tnfa.have_backrefs)
            .finish()
    }
}

impl Regex {
    /// Compile `pattern` into a TNFA.
    pub fn compile(pattern: &str, opts: CompileOpts) -> Result<Regex, RegexError> {
        let ast = parse::parse(pattern, opts)?;
        let tnfa = compile::compile(&ast, opts)?;
        tracing::trace!(
            pattern,
            states = tnfa.states.len(),
            tags = tnfa.num_tags,
            "compiled regex"
        );
        Ok(Regex {
            pattern: pattern.to_string(),
            tnfa,
        })
    }

    /// The source text the regex was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Number of parenthesised groups (excluding the whole match).
    pub fn group_count(&self) -> usize {
        self.tnfa.num_submatches - 1
    }

    /// Whether the pattern contains `\N` back-references.
    pub fn has_backrefs(&self) -> bool {
        self.tnfa.have_backrefs
    }

    /// Run the regex over a slice of symbols, returning the leftmost match
    /// preferred by the tag-order relation.
    ///
    /// The matcher is chosen per call: the backtracker when the pattern has
    /// back-references or `opts.backtracking` is set, the parallel
    /// simulator otherwise.
    pub fn exec<C: Sym>(&self, hay: &[C], opts: ExecOpts) -> Option<Captures> {
        let tags = if self.tnfa.have_backrefs || opts.backtracking {
            backtrack::exec(&self.tnfa, hay, opts)?
        } else {
            parallel::exec(&self.tnfa, hay, opts)?
        };
        Some(self.tnfa.captures_from_tags(&tags))
    }

    /// Convenience wrapper over [`Regex::exec`] for `&str` haystacks.
    /// Returned offsets are char indices, not byte indices.
    pub fn exec_str(&self, hay: &str, opts: ExecOpts) -> Option<Captures> {
        let chars: Vec<char> = hay.chars().collect();
        self.exec(&chars, opts)
    }

    /// True when the regex matches somewhere in `hay`.
    pub fn is_match<C: Sym>(&self, hay: &[C]) -> bool {
        self.exec(hay, ExecOpts::default()).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pat: &str, hay: &str) -> Option<Captures> {
        Regex::compile(pat, CompileOpts::default())
            .unwrap()
            .exec_str(hay, ExecOpts::default())
    }

    #[test]
    fn literal_match() {
        let c = m("abc", "xxabcyy").unwrap();
        assert_eq!(c.whole(), (2, 5));
    }

    #[test]
    fn alternation_and_groups() {
        let c = m("a(b|c)d", "acd").unwrap();
        assert_eq!(c.whole(), (0, 3));
        assert_eq!(c.group(1), Some((1, 2)));
    }

    #[test]
    fn longest_iteration() {
        // maximising end tag picks the longest repetition
        let c = m("XY+", "aXYYYb").unwrap();
        assert_eq!(c.whole(), (1, 5));
    }

    #[test]
    fn leftmost_wins() {
        let c = m("b+", "abbcbbb").unwrap();
        assert_eq!(c.whole(), (1, 3));
    }

    #[test]
    fn anchors() {
        assert!(m("^abc$", "abc").is_some());
        assert!(m("^abc$", "xabc").is_none());
        let re = Regex::compile("^a", CompileOpts::default()).unwrap();
        assert!(re
            .exec_str(
                "a",
                ExecOpts {
                    notbol: true,
                    ..Default::default()
                }
            )
            .is_none());
        let re = Regex::compile("a$", CompileOpts::default()).unwrap();
        assert!(re
            .exec_str(
                "a",
                ExecOpts {
                    noteol: true,
                    ..Default::default()
                }
            )
            .is_none());
    }

    #[test]
    fn case_insensitive() {
        let re = Regex::compile(
            "abc",
            CompileOpts {
                icase: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(re.exec_str("xABCy", ExecOpts::default()).is_some());
    }

    #[test]
    fn bracket_class() {
        let c = m("[[:digit:]]+", "ab1234cd").unwrap();
        assert_eq!(c.whole(), (2, 6));
    }

    #[test]
    fn bounds_need_flag() {
        // without the bounds option, `{` is an ordinary character
        let c = m("a{2}", "a{2}").unwrap();
        assert_eq!(c.whole(), (0, 4));
        let re = Regex::compile(
            "a{2,3}",
            CompileOpts {
                bounds: true,
                ..Default::default()
            },
        )
        .unwrap();
        let c = re.exec_str("caaaab", ExecOpts::default()).unwrap();
        assert_eq!(c.whole(), (1, 4));
    }

    #[test]
    fn backref_forces_backtracker() {
        let re = Regex::compile("(ab)\\1", CompileOpts::default()).unwrap();
        assert!(re.has_backrefs());
        let c = re.exec_str("xababy", ExecOpts::default()).unwrap();
        assert_eq!(c.whole(), (1, 5));
        assert_eq!(c.group(1), Some((1, 3)));
    }

    #[test]
    fn gnu_style_backref_submatches() {
        // the published choice for the back-reference-anchored capture case
        let re = Regex::compile("(x*)ab((c*\\1)(.*))", CompileOpts::default()).unwrap();
        let c = re.exec_str("abcdefg", ExecOpts::default()).unwrap();
        assert_eq!(c.whole(), (0, 7));
        assert_eq!(c.group(1), Some((0, 0)));
        assert_eq!(c.group(2), Some((2, 7)));
        assert_eq!(c.group(3), Some((2, 3)));
        assert_eq!(c.group(4), Some((3, 7)));
    }

    #[test]
    fn submatch_containment() {
        let c = m("(a(b+)(c))", "zabbbcz").unwrap();
        let (po, pe) = c.group(1).unwrap();
        for g in 2..=3 {
            let (so, eo) = c.group(g).unwrap();
            assert!(po <= so && eo <= pe);
        }
    }

    #[test]
    fn compile_errors() {
        assert_eq!(
            Regex::compile("a(b", CompileOpts::default()).unwrap_err(),
            RegexError::BadParen
        );
        assert_eq!(
            Regex::compile("[z-a]", CompileOpts::default()).unwrap_err(),
            RegexError::BadRange
        );
        assert_eq!(
            Regex::compile("[[:nosuch:]]", CompileOpts::default()).unwrap_err(),
            RegexError::BadCtype
        );
        assert_eq!(
            Regex::compile("*a", CompileOpts::default()).unwrap_err(),
            RegexError::BadRepeat
        );
        assert_eq!(
            Regex::compile("(a)\\2", CompileOpts::default()).unwrap_err(),
            RegexError::BadSubReg
        );
    }

    #[test]
    fn byte_haystacks() {
        let re = Regex::compile("b+", CompileOpts::default()).unwrap();
        let c = re.exec(b"abbc".as_slice(), ExecOpts::default()).unwrap();
        assert_eq!(c.whole(), (1, 3));
    }

    #[test]
    fn idempotent_compilation() {
        let a = Regex::compile("(a|ab)(c*)", CompileOpts::default()).unwrap();
        let b = Regex::compile("(a|ab)(c*)", CompileOpts::default()).unwrap();
        let ca = a.exec_str("abcc", ExecOpts::default()).unwrap();
        let cb = b.exec_str("abcc", ExecOpts::default()).unwrap();
        assert_eq!(ca, cb);
    }
}
