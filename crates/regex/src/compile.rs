//! Lowers the pattern syntax tree to a tagged NFA.
//!
//! The construction is Thompson-style with explicit source and sink states
//! per node. Submatch boundaries become tag-firing epsilon transitions: a
//! minimising tag on entry, a maximising tag on exit. Transition order
//! within a state encodes greedy priority (iteration bodies before exits).

use crate::ast::Ast;
use crate::tnfa::{State, StateId, TagDir, TagId, Tnfa, TransKind, Transition};
use crate::{CompileOpts, RegexError};

pub(crate) fn compile(ast: &Ast, opts: CompileOpts) -> Result<Tnfa, RegexError> {
    let mut b = Builder {
        states: Vec::new(),
        have_backrefs: false,
        max_group: 0,
    };
    b.scan_groups(ast);

    let initial = b.state();
    let body_in = b.state();
    let body_out = b.state();
    let finals = b.state();

    // whole-match tags 0 and 1
    b.edge(initial, body_in, TransKind::Epsilon, vec![0]);
    b.edge(body_out, finals, TransKind::Epsilon, vec![1]);
    b.build(ast, body_in, body_out)?;

    let num_submatches = b.max_group + 1;
    let num_tags = 2 * num_submatches;
    let tag_dirs = (0..num_tags)
        .map(|t| if t % 2 == 0 { TagDir::Minimize } else { TagDir::Maximize })
        .collect();
    let submatches = (0..num_submatches).map(|i| (2 * i, 2 * i + 1)).collect();

    Ok(Tnfa {
        states: b.states,
        initial,
        finals,
        num_tags,
        num_submatches,
        tag_dirs,
        submatches,
        have_backrefs: b.have_backrefs,
        icase: opts.icase,
    })
}

struct Builder {
    states: Vec<State>,
    have_backrefs: bool,
    max_group: usize,
}

impl Builder {
    fn state(&mut self) -> StateId {
        self.states.push(State::default());
        self.states.len() - 1
    }

    fn edge(&mut self, from: StateId, to: StateId, kind: TransKind, tags: Vec<TagId>) {
        self.states[from].trans.push(Transition { kind, to, tags });
    }

    fn scan_groups(&mut self, ast: &Ast) {
        match ast {
            Ast::Group { idx, node } => {
                self.max_group = self.max_group.max(*idx);
                self.scan_groups(node);
            }
            Ast::Concat(items) | Ast::Alt(items) => {
                for item in items {
                    self.scan_groups(item);
                }
            }
            Ast::Repeat { node, .. } => self.scan_groups(node),
            _ => {}
        }
    }

    /// Connect `from` to `to` with a sub-automaton recognising `ast`.
    fn build(&mut self, ast: &Ast, from: StateId, to: StateId) -> Result<(), RegexError> {
        match ast {
            Ast::Empty => self.edge(from, to, TransKind::Epsilon, Vec::new()),
            Ast::Literal(c) => self.edge(from, to, TransKind::Range(*c, *c), Vec::new()),
            Ast::Any => self.edge(from, to, TransKind::Any, Vec::new()),
            Ast::Set(set) => self.edge(from, to, TransKind::Set(set.clone()), Vec::new()),
            Ast::Assert(a) => self.edge(from, to, TransKind::Assert(*a), Vec::new()),
            Ast::BackRef(idx) => {
                self.have_backrefs = true;
                self.edge(from, to, TransKind::BackRef(*idx), Vec::new());
            }
            Ast::Concat(items) => {
                let mut cur = from;
                for (i, item) in items.iter().enumerate() {
                    let next = if i + 1 == items.len() { to } else { self.state() };
                    self.build(item, cur, next)?;
                    cur = next;
                }
            }
            Ast::Alt(items) => {
                for item in items {
                    self.build(item, from, to)?;
                }
            }
            Ast::Group { idx, node } => {
                let inner_in = self.state();
                let inner_out = self.state();
                self.edge(from, inner_in, TransKind::Epsilon, vec![2 * idx]);
                self.build(node, inner_in, inner_out)?;
                self.edge(inner_out, to, TransKind::Epsilon, vec![2 * idx + 1]);
            }
            Ast::Repeat { node, min, max } => self.build_repeat(node, *min, *max, from, to)?,
        }
        Ok(())
    }

    fn build_repeat(
        &mut self,
        node: &Ast,
        min: u32,
        max: Option<u32>,
        from: StateId,
        to: StateId,
    ) -> Result<(), RegexError> {
        // mandatory copies
        let mut cur = from;
        for _ in 0..min {
            let next = self.state();
            self.build(node, cur, next)?;
            cur = next;
        }

        match max {
            None => {
                // loop state: body re-entry first (greedy), exit second
                let body_in = self.state();
                self.edge(cur, body_in, TransKind::Epsilon, Vec::new());
                self.build(node, body_in, cur)?;
                self.edge(cur, to, TransKind::Epsilon, Vec::new());
            }
            Some(max) => {
                if max < min {
                    return Err(RegexError::BadBrace);
                }
                // optional tail copies, each skippable
                for i in 0..(max - min) {
                    let next = if i + 1 == max - min { to } else { self.state() };
                    let body_in = self.state();
                    self.edge(cur, body_in, TransKind::Epsilon, Vec::new());
                    self.build(node, body_in, next)?;
                    self.edge(cur, to, TransKind::Epsilon, Vec::new());
                    cur = next;
                }
                if max == min {
                    // no optional tail; join the mandatory chain to the sink
                    self.edge(cur, to, TransKind::Epsilon, Vec::new());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn c(pat: &str) -> Tnfa {
        let opts = CompileOpts {
            bounds: true,
            ..Default::default()
        };
        compile(&parse::parse(pat, opts).unwrap(), opts).unwrap()
    }

    #[test]
    fn whole_match_tags_present() {
        let t = c("ab");
        assert_eq!(t.num_submatches, 1);
        assert_eq!(t.num_tags, 2);
        assert_eq!(t.tag_dirs[0], TagDir::Minimize);
        assert_eq!(t.tag_dirs[1], TagDir::Maximize);
    }

    #[test]
    fn group_tags_counted() {
        let t = c("(a)(b(c))");
        assert_eq!(t.num_submatches, 4);
        assert_eq!(t.num_tags, 8);
    }

    #[test]
    fn backref_flag() {
        assert!(c("(a)\\1").have_backrefs);
        assert!(!c("(a)b").have_backrefs);
    }

    #[test]
    fn bounded_repeat_expands() {
        let small = c("a{1}").states.len();
        let big = c("a{8}").states.len();
        assert!(big > small);
    }
}
