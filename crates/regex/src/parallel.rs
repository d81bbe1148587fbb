//! Parallel (lockstep) TNFA simulation.
//!
//! All live threads advance together one symbol at a time. Each thread
//! carries a tag array; when two threads land on the same state, the
//! tag-order relation picks the survivor. Patterns with back-references
//! never reach this matcher.

use std::cmp::Ordering;

use crate::class::Sym;
use crate::tnfa::{StateId, Tnfa, TransKind, TAG_UNSET};
use crate::ExecOpts;

struct Thread {
    state: StateId,
    tags: Vec<i32>,
}

/// One generation of threads, deduplicated by state.
struct ThreadList {
    threads: Vec<Thread>,
    /// state id -> index into `threads`, or usize::MAX
    index: Vec<usize>,
}

impl ThreadList {
    fn new(num_states: usize) -> ThreadList {
        ThreadList {
            threads: Vec::new(),
            index: vec![usize::MAX; num_states],
        }
    }

    fn clear(&mut self) {
        for t in &self.threads {
            self.index[t.state] = usize::MAX;
        }
        self.threads.clear();
    }
}

/// Run the simulation; returns the winning tag array.
pub(crate) fn exec<C: Sym>(tnfa: &Tnfa, hay: &[C], opts: ExecOpts) -> Option<Vec<i32>> {
    let mut clist = ThreadList::new(tnfa.states.len());
    let mut nlist = ThreadList::new(tnfa.states.len());
    let mut best: Option<Vec<i32>> = None;

    for pos in 0..=hay.len() {
        // seed a fresh start thread while no match has been found; once a
        // match exists, later starts can never win the leftmost compare
        if best.is_none() {
            let tags = vec![TAG_UNSET; tnfa.num_tags];
            add_thread(tnfa, &mut clist, tnfa.initial, tags, pos, hay, &opts);
        }

        // harvest a match candidate from this generation
        if let Some(i) = lookup(&clist, tnfa.finals) {
            let cand = &clist.threads[i].tags;
            let better = match &best {
                None => true,
                Some(b) => tnfa.tag_order(cand, b) == Ordering::Less,
            };
            if better {
                best = Some(cand.clone());
            }
        }

        if pos == hay.len() {
            break;
        }

        // step every thread over the current symbol
        let c = hay[pos];
        nlist.clear();
        for ti in 0..clist.threads.len() {
            let state = clist.threads[ti].state;
            for tr in &tnfa.states[state].trans {
                if tr.kind.is_consuming() && tnfa.accepts(&tr.kind, c) {
                    let mut tags = clist.threads[ti].tags.clone();
                    for &t in &tr.tags {
                        tags[t] = (pos + 1) as i32;
                    }
                    add_thread(tnfa, &mut nlist, tr.to, tags, pos + 1, hay, &opts);
                }
            }
        }
        std::mem::swap(&mut clist, &mut nlist);

        if clist.threads.is_empty() && best.is_some() {
            break;
        }
    }

    best
}

fn lookup(list: &ThreadList, state: StateId) -> Option<usize> {
    let i = list.index[state];
    if i == usize::MAX {
        None
    } else {
        Some(i)
    }
}

/// Insert a thread and chase its epsilon closure. A state occupied by a
/// better thread absorbs the newcomer; a worse occupant is replaced and the
/// closure re-expanded from it.
fn add_thread<C: Sym>(
    tnfa: &Tnfa,
    list: &mut ThreadList,
    state: StateId,
    tags: Vec<i32>,
    pos: usize,
    hay: &[C],
    opts: &ExecOpts,
) {
    match lookup(list, state) {
        Some(i) => {
            if tnfa.tag_order(&tags, &list.threads[i].tags) != Ordering::Less {
                return;
            }
            list.threads[i].tags = tags.clone();
        }
        None => {
            list.index[state] = list.threads.len();
            list.threads.push(Thread {
                state,
                tags: tags.clone(),
            });
        }
    }

    for tr in &tnfa.states[state].trans {
        let pass = match &tr.kind {
            TransKind::Epsilon => true,
            TransKind::Assert(a) => Tnfa::assert_holds(*a, hay, pos, opts.notbol, opts.noteol),
            _ => false,
        };
        if pass {
            let mut next_tags = tags.clone();
            for &t in &tr.tags {
                next_tags[t] = pos as i32;
            }
            add_thread(tnfa, list, tr.to, next_tags, pos, hay, opts);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{CompileOpts, ExecOpts, Regex};

    fn whole(pat: &str, hay: &str) -> Option<(usize, usize)> {
        Regex::compile(pat, CompileOpts::default())
            .unwrap()
            .exec_str(hay, ExecOpts::default())
            .map(|c| c.whole())
    }

    #[test]
    fn longest_alternative_wins() {
        // POSIX longest, not first-alternative
        assert_eq!(whole("a|ab", "ab"), Some((0, 2)));
    }

    #[test]
    fn empty_iteration_terminates() {
        // a nullable body must not spin the closure
        assert_eq!(whole("(a*)*b", "aab"), Some((0, 3)));
        assert_eq!(whole("()*x", "x"), Some((0, 1)));
    }

    #[test]
    fn no_match_is_none() {
        assert_eq!(whole("zz", "aaa"), None);
    }

    #[test]
    fn match_at_eof_anchor() {
        assert_eq!(whole("a$", "bba"), Some((2, 3)));
    }

    #[test]
    fn greedy_star_inside_groups() {
        let re = Regex::compile("(a*)(b*)", CompileOpts::default()).unwrap();
        let c = re.exec_str("aabbb", ExecOpts::default()).unwrap();
        assert_eq!(c.group(1), Some((0, 2)));
        assert_eq!(c.group(2), Some((2, 5)));
    }
}
