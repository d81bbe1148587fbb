//! Depth-first TNFA matcher with back-reference support.
//!
//! Explores transitions in priority order with an explicit stack; on a dead
//! end the most recent branching point is resumed. A back-reference
//! transition replays the text between the referenced group's recorded
//! tags. Greedy-first exploration yields GNU-style longest submatches.

use crate::class::Sym;
use crate::tnfa::{StateId, Tnfa, TransKind, TAG_UNSET};
use crate::ExecOpts;

struct Frame {
    state: StateId,
    pos: usize,
    /// Next transition to try at `state`.
    next_trans: usize,
    /// Length of the tag undo log when this frame was entered.
    undo_mark: usize,
    /// Length of the visited list when this frame was entered.
    seen_mark: usize,
}

pub(crate) fn exec<C: Sym>(tnfa: &Tnfa, hay: &[C], opts: ExecOpts) -> Option<Vec<i32>> {
    // leftmost: earlier start positions are tried first and win outright
    for start in 0..=hay.len() {
        if let Some(tags) = try_at(tnfa, hay, start, &opts) {
            return Some(tags);
        }
    }
    None
}

fn try_at<C: Sym>(tnfa: &Tnfa, hay: &[C], start: usize, opts: &ExecOpts) -> Option<Vec<i32>> {
    let mut tags = vec![TAG_UNSET; tnfa.num_tags];
    // (tag, previous value) pairs for rewinding on backtrack
    let mut undo: Vec<(usize, i32)> = Vec::new();
    // (state, pos) pairs on the current path, cutting empty loops
    let mut seen: Vec<(StateId, usize)> = vec![(tnfa.initial, start)];
    let mut stack = vec![Frame {
        state: tnfa.initial,
        pos: start,
        next_trans: 0,
        undo_mark: 0,
        seen_mark: 1,
    }];

    while let Some(top) = stack.last_mut() {
        if top.state == tnfa.finals {
            return Some(tags);
        }

        let trans = &tnfa.states[top.state].trans;
        if top.next_trans >= trans.len() {
            // dead end: rewind this frame's tag writes and pop
            let frame = stack.pop().unwrap();
            while undo.len() > frame.undo_mark {
                let (t, old) = undo.pop().unwrap();
                tags[t] = old;
            }
            seen.truncate(frame.seen_mark);
            continue;
        }

        let tr = &trans[top.next_trans];
        top.next_trans += 1;
        let pos = top.pos;

        let next_pos = match &tr.kind {
            TransKind::Epsilon => Some(pos),
            TransKind::Assert(a) => {
                if Tnfa::assert_holds(*a, hay, pos, opts.notbol, opts.noteol) {
                    Some(pos)
                } else {
                    None
                }
            }
            TransKind::BackRef(idx) => backref_len(tnfa, &tags, *idx, hay, pos).map(|n| pos + n),
            kind => {
                if pos < hay.len() && tnfa.accepts(kind, hay[pos]) {
                    Some(pos + 1)
                } else {
                    None
                }
            }
        };

        let Some(next_pos) = next_pos else { continue };

        if seen.contains(&(tr.to, next_pos)) {
            continue;
        }

        let undo_mark = undo.len();
        for &t in &tr.tags {
            undo.push((t, tags[t]));
            tags[t] = next_pos as i32;
        }
        seen.push((tr.to, next_pos));
        let seen_mark = seen.len();
        let to = tr.to;
        stack.push(Frame {
            state: to,
            pos: next_pos,
            next_trans: 0,
            undo_mark,
            seen_mark,
        });
    }

    None
}

/// Length consumed by `\idx` at `pos`, or `None` on mismatch. A reference
/// to a group that never participated matches the empty string.
fn backref_len<C: Sym>(
    tnfa: &Tnfa,
    tags: &[i32],
    idx: u8,
    hay: &[C],
    pos: usize,
) -> Option<usize> {
    let (so_tag, eo_tag) = tnfa.submatches[idx as usize];
    let (so, eo) = (tags[so_tag], tags[eo_tag]);
    if so == TAG_UNSET || eo == TAG_UNSET || so == eo {
        return Some(0);
    }
    let (so, eo) = (so as usize, eo as usize);
    let len = eo - so;
    if pos + len > hay.len() {
        return None;
    }
    let matches = (0..len).all(|i| {
        let (a, b) = (hay[so + i], hay[pos + i]);
        if tnfa.icase {
            a.fold_lower() == b.fold_lower()
        } else {
            a == b
        }
    });
    if matches {
        Some(len)
    } else {
        None
    }
}
