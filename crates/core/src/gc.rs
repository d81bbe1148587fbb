//! Generational cycle collector for container values.
//!
//! Maps and arrays are the only values that can participate in reference
//! cycles; each factory call registers the new container in the young
//! generation as a weak handle. A collection pass computes, for every
//! tracked container, how many of its strong references come from inside
//! the tracked set itself; containers with no external references and no
//! path from an externally referenced container are cycle garbage and have
//! their contents cleared, which unwinds the cycle. Survivors promote to
//! the next generation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::value::{Arr, ArrRef, Map, MapRef, RefTarget, Value};

pub(crate) const NUM_GENS: usize = 3;

/// Default young-generation allocation count that triggers an automatic
/// collection. A tuning knob, not a contract.
pub const GC_THRESHOLD: usize = 256;

/// Which generations a collection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcGen {
    /// Generation 0 only.
    Young,
    /// Generations 0 through `n`.
    Gen(usize),
    /// Everything.
    Full,
    /// Young, but only when the pressure threshold was crossed.
    Auto,
}

#[derive(Debug, Clone)]
enum Tracked {
    Map(Weak<RefCell<Map>>),
    Arr(Weak<RefCell<Arr>>),
}

#[derive(Clone)]
enum Strong {
    Map(MapRef),
    Arr(ArrRef),
}

impl Strong {
    fn key(&self) -> usize {
        match self {
            Strong::Map(m) => Rc::as_ptr(m) as usize,
            Strong::Arr(a) => Rc::as_ptr(a) as usize,
        }
    }

    fn strong_count(&self) -> usize {
        match self {
            Strong::Map(m) => Rc::strong_count(m),
            Strong::Arr(a) => Rc::strong_count(a),
        }
    }

    fn downgrade(&self) -> Tracked {
        match self {
            Strong::Map(m) => Tracked::Map(Rc::downgrade(m)),
            Strong::Arr(a) => Tracked::Arr(Rc::downgrade(a)),
        }
    }

    /// Visit the container keys of every directly held child value.
    fn for_each_child(&self, mut f: impl FnMut(usize)) {
        let visit = |v: &Value, f: &mut dyn FnMut(usize)| {
            match v {
                Value::Map(m) => f(Rc::as_ptr(m) as usize),
                Value::Arr(a) => f(Rc::as_ptr(a) as usize),
                Value::Ref(r) => match &**r {
                    RefTarget::MapCell(m, _) => f(Rc::as_ptr(m) as usize),
                    RefTarget::ArrCell(a, _) => f(Rc::as_ptr(a) as usize),
                    _ => {}
                },
                _ => {}
            }
        };
        match self {
            Strong::Map(m) => {
                for v in m.borrow().entries.values() {
                    visit(v, &mut f);
                }
            }
            Strong::Arr(a) => {
                for v in a.borrow().slots.iter().flatten() {
                    visit(v, &mut f);
                }
            }
        }
    }

    fn clear(&self) {
        match self {
            Strong::Map(m) => m.borrow_mut().entries.clear(),
            Strong::Arr(a) => a.borrow_mut().slots.clear(),
        }
    }
}

/// Collection outcome, mostly for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub scanned: usize,
    pub freed: usize,
    pub promoted: usize,
}

pub struct GcRegistry {
    gens: RefCell<[Vec<Tracked>; NUM_GENS]>,
    threshold: Cell<usize>,
    pressure: Cell<usize>,
}

impl GcRegistry {
    pub fn new() -> GcRegistry {
        GcRegistry {
            gens: RefCell::new(std::array::from_fn(|_| Vec::new())),
            threshold: Cell::new(GC_THRESHOLD),
            pressure: Cell::new(0),
        }
    }

    pub(crate) fn register_map(&self, m: &MapRef) {
        self.gens.borrow_mut()[0].push(Tracked::Map(Rc::downgrade(m)));
        self.pressure.set(self.pressure.get() + 1);
    }

    pub(crate) fn register_arr(&self, a: &ArrRef) {
        self.gens.borrow_mut()[0].push(Tracked::Arr(Rc::downgrade(a)));
        self.pressure.set(self.pressure.get() + 1);
    }

    pub fn set_threshold(&self, n: usize) {
        self.threshold.set(n.max(1));
    }

    pub fn should_collect(&self) -> bool {
        self.pressure.get() >= self.threshold.get()
    }

    pub fn collect_gen(&self, gen: GcGen) -> GcStats {
        let upto = match gen {
            GcGen::Young => 0,
            GcGen::Gen(n) => n.min(NUM_GENS - 1),
            GcGen::Full => NUM_GENS - 1,
            GcGen::Auto => {
                if !self.should_collect() {
                    return GcStats::default();
                }
                0
            }
        };
        self.collect(upto)
    }

    fn collect(&self, upto: usize) -> GcStats {
        // gather the live containers of the covered generations; stale
        // weak handles fall away here
        let mut alive: Vec<Strong> = Vec::new();
        {
            let mut gens = self.gens.borrow_mut();
            for gen in gens.iter_mut().take(upto + 1) {
                for tracked in gen.drain(..) {
                    match tracked {
                        Tracked::Map(w) => {
                            if let Some(m) = w.upgrade() {
                                alive.push(Strong::Map(m));
                            }
                        }
                        Tracked::Arr(w) => {
                            if let Some(a) = w.upgrade() {
                                alive.push(Strong::Arr(a));
                            }
                        }
                    }
                }
            }
        }

        let index: HashMap<usize, usize> = alive
            .iter()
            .enumerate()
            .map(|(i, s)| (s.key(), i))
            .collect();

        // count internal references and record the edge list
        let mut internal = vec![0usize; alive.len()];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); alive.len()];
        for (i, s) in alive.iter().enumerate() {
            s.for_each_child(|key| {
                if let Some(&j) = index.get(&key) {
                    internal[j] += 1;
                    edges[i].push(j);
                }
            });
        }

        // external = strong count minus internal minus our own handle;
        // externally referenced containers are the roots
        let mut reachable = vec![false; alive.len()];
        let mut work: Vec<usize> = Vec::new();
        for (i, s) in alive.iter().enumerate() {
            if s.strong_count() > internal[i] + 1 {
                reachable[i] = true;
                work.push(i);
            }
        }
        while let Some(i) = work.pop() {
            for &j in &edges[i] {
                if !reachable[j] {
                    reachable[j] = true;
                    work.push(j);
                }
            }
        }

        let mut stats = GcStats {
            scanned: alive.len(),
            ..Default::default()
        };
        let promote_to = (upto + 1).min(NUM_GENS - 1);
        {
            let mut gens = self.gens.borrow_mut();
            for (i, s) in alive.iter().enumerate() {
                if reachable[i] {
                    gens[promote_to].push(s.downgrade());
                    stats.promoted += 1;
                } else {
                    // breaking the cycle: dropping the contents drops the
                    // mutual strong references
                    s.clear();
                    stats.freed += 1;
                }
            }
        }
        drop(alive);

        self.pressure.set(0);
        tracing::debug!(
            scanned = stats.scanned,
            freed = stats.freed,
            promoted = stats.promoted,
            "gc pass"
        );
        stats
    }
}

impl Default for GcRegistry {
    fn default() -> GcRegistry {
        GcRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Heap, Value};
    use std::rc::Rc;

    #[test]
    fn acyclic_survivors_promote() {
        let heap = Heap::new();
        let m = heap.make_map();
        let stats = heap.gc(GcGen::Full);
        assert_eq!(stats.freed, 0);
        assert_eq!(stats.promoted, 1);
        drop(m);
    }

    #[test]
    fn simple_cycle_is_freed() {
        let heap = Heap::new();
        let a = heap.make_map();
        let b = heap.make_map();
        if let (Value::Map(ma), Value::Map(mb)) = (&a, &b) {
            ma.borrow_mut().entries.insert("peer".into(), b.clone());
            mb.borrow_mut().entries.insert("peer".into(), a.clone());
        }
        // while the bindings exist both maps are externally referenced
        let stats = heap.gc(GcGen::Full);
        assert_eq!(stats.freed, 0);

        let (wa, wb) = match (&a, &b) {
            (Value::Map(ma), Value::Map(mb)) => (Rc::downgrade(ma), Rc::downgrade(mb)),
            _ => unreachable!(),
        };
        drop(a);
        drop(b);
        // the cycle keeps both alive until a collection breaks it
        assert!(wa.upgrade().is_some());
        let stats = heap.gc(GcGen::Full);
        assert_eq!(stats.freed, 2);
        assert!(wa.upgrade().is_none());
        assert!(wb.upgrade().is_none());
    }

    #[test]
    fn reachable_member_of_cycle_survives() {
        let heap = Heap::new();
        let a = heap.make_map();
        let b = heap.make_map();
        if let (Value::Map(ma), Value::Map(mb)) = (&a, &b) {
            ma.borrow_mut().entries.insert("peer".into(), b.clone());
            mb.borrow_mut().entries.insert("peer".into(), a.clone());
        }
        drop(b);
        // `a` is still bound, so the whole cycle is reachable
        let stats = heap.gc(GcGen::Full);
        assert_eq!(stats.freed, 0);
        assert_eq!(stats.promoted, 2);
        if let Value::Map(ma) = &a {
            assert!(ma.borrow().entries.contains_key("peer"));
        }
    }

    #[test]
    fn self_cycle_through_array() {
        let heap = Heap::new();
        let arr = heap.make_arr(4);
        if let Value::Arr(r) = &arr {
            let clone = arr.clone();
            r.borrow_mut().set(0, clone);
        }
        let w = match &arr {
            Value::Arr(r) => Rc::downgrade(r),
            _ => unreachable!(),
        };
        drop(arr);
        assert!(w.upgrade().is_some());
        let stats = heap.gc(GcGen::Young);
        assert_eq!(stats.freed, 1);
        assert!(w.upgrade().is_none());
    }

    #[test]
    fn auto_collect_honors_threshold() {
        let heap = Heap::new();
        heap.set_gc_threshold(4);
        assert!(heap.maybe_collect().is_none());
        let kept: Vec<Value> = (0..4).map(|_| heap.make_map()).collect();
        let stats = heap.maybe_collect().expect("pressure crossed");
        assert_eq!(stats.scanned, 4);
        assert_eq!(stats.freed, 0);
        drop(kept);
    }

    #[test]
    fn full_gc_keeps_rooted_values_alive() {
        let heap = Heap::new();
        let root = heap.make_map();
        let child = heap.make_map();
        if let (Value::Map(r), Value::Map(_)) = (&root, &child) {
            r.borrow_mut().entries.insert("c".into(), child.clone());
        }
        drop(child);
        heap.gc(GcGen::Full);
        if let Value::Map(r) = &root {
            let held = r.borrow();
            let v = held.entries.get("c").unwrap();
            match v {
                Value::Map(c) => assert!(Rc::strong_count(c) >= 1),
                _ => unreachable!(),
            }
        }
    }
}
