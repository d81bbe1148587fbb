//! Tagged-NFA representation shared by the compiler and both matchers.

use std::cmp::Ordering;

use crate::ast::{Assertion, ClassSet};
use crate::class::Sym;
use crate::Captures;

pub(crate) type StateId = usize;
pub(crate) type TagId = usize;

/// Position value meaning "tag never fired".
pub(crate) const TAG_UNSET: i32 = -1;

/// What a transition consumes (or asserts).
#[derive(Debug, Clone)]
pub(crate) enum TransKind {
    /// Free move.
    Epsilon,
    /// Zero-width assertion.
    Assert(Assertion),
    /// Consumes one symbol in the inclusive code range.
    Range(u32, u32),
    /// Consumes one symbol matched by a bracket expression.
    Set(ClassSet),
    /// Consumes any one symbol.
    Any,
    /// Consumes the text of a previously captured group.
    BackRef(u8),
}

impl TransKind {
    pub(crate) fn is_consuming(&self) -> bool {
        matches!(self, TransKind::Range(..) | TransKind::Set(_) | TransKind::Any)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Transition {
    pub kind: TransKind,
    pub to: StateId,
    /// Tags fired when the transition is taken; each records the current
    /// input position.
    pub tags: Vec<TagId>,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    /// Ordered by priority: the backtracker tries them first to last, and
    /// the parallel matcher seeds its closure in this order.
    pub trans: Vec<Transition>,
}

/// Whether a tag prefers the earliest or the latest firing position when
/// two parallel threads merge on one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagDir {
    Minimize,
    Maximize,
}

pub(crate) struct Tnfa {
    pub states: Vec<State>,
    pub initial: StateId,
    pub finals: StateId,
    pub num_tags: usize,
    /// Submatch count including the whole match.
    pub num_submatches: usize,
    pub tag_dirs: Vec<TagDir>,
    /// `(start_tag, end_tag)` per submatch, index 0 = whole match.
    pub submatches: Vec<(TagId, TagId)>,
    pub have_backrefs: bool,
    pub icase: bool,
}

impl Tnfa {
    /// Does this consuming transition accept symbol `c`?
    pub(crate) fn accepts<C: Sym>(&self, kind: &TransKind, c: C) -> bool {
        if self.icase {
            self.accepts_code(kind, c.fold_lower()) || self.accepts_code(kind, c.fold_upper())
        } else {
            self.accepts_code(kind, c.code())
        }
    }

    fn accepts_code(&self, kind: &TransKind, code: u32) -> bool {
        match kind {
            TransKind::Range(lo, hi) => (*lo..=*hi).contains(&code),
            TransKind::Set(set) => set.contains(code),
            TransKind::Any => true,
            _ => false,
        }
    }

    /// Check a zero-width assertion at `pos`.
    pub(crate) fn assert_holds<C: Sym>(
        assertion: Assertion,
        hay: &[C],
        pos: usize,
        notbol: bool,
        noteol: bool,
    ) -> bool {
        let before = if pos > 0 { hay.get(pos - 1) } else { None };
        let here = hay.get(pos);
        let word_before = before.is_some_and(|c| c.is_word());
        let word_here = here.is_some_and(|c| c.is_word());
        match assertion {
            Assertion::Bol => pos == 0 && !notbol,
            Assertion::Eol => pos == hay.len() && !noteol,
            Assertion::WordStart => !word_before && word_here,
            Assertion::WordEnd => word_before && !word_here,
            Assertion::WordBoundary => word_before != word_here,
            Assertion::NotWordBoundary => word_before == word_here,
        }
    }

    /// The tag-order relation: walk tags left to right; at a minimising tag
    /// the smaller position wins, at a maximising tag the larger one; ties
    /// continue. Returns `Less` when `a` is preferred.
    pub(crate) fn tag_order(&self, a: &[i32], b: &[i32]) -> Ordering {
        for t in 0..self.num_tags {
            let (va, vb) = (a[t], b[t]);
            if va == vb {
                continue;
            }
            return match self.tag_dirs[t] {
                // an unset minimising tag loses to any set one
                TagDir::Minimize => {
                    let ka = if va == TAG_UNSET { i64::MAX } else { va as i64 };
                    let kb = if vb == TAG_UNSET { i64::MAX } else { vb as i64 };
                    ka.cmp(&kb)
                }
                // TAG_UNSET is -1 and naturally loses a maximising compare
                TagDir::Maximize => vb.cmp(&va),
            };
        }
        Ordering::Equal
    }

    pub(crate) fn captures_from_tags(&self, tags: &[i32]) -> Captures {
        let spans = self
            .submatches
            .iter()
            .map(|&(so, eo)| {
                let (s, e) = (tags[so], tags[eo]);
                if s == TAG_UNSET || e == TAG_UNSET {
                    None
                } else {
                    Some((s as usize, e as usize))
                }
            })
            .collect();
        Captures { spans }
    }
}
