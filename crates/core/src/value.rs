//! The tagged value system.
//!
//! A [`Value`] is a small tagged enum; heap payloads sit behind `Rc`, so a
//! binding is a strong-count increment and a drop is the matching
//! decrement. Containers (maps and arrays) additionally register with the
//! per-heap cycle collector (see [`crate::gc`]).
//!
//! Canonical nil, integer, char, and byte-char values are plain copies;
//! the empty string is the one shared singleton a [`Heap`] keeps.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use hawk_regex::{CompileOpts, Regex};

use crate::error::{ErrorKind, HawkError};
use crate::gc::{GcGen, GcRegistry, GcStats};
use crate::num::{self, Num, NumStrHint, ScanOpts};

/// String payload: text plus the numeric-string hint set when the value
/// came from record input or field splitting.
#[derive(Debug)]
pub struct Str {
    pub text: String,
    pub hint: NumStrHint,
}

/// Byte-string payload, distinct from [`Str`].
#[derive(Debug)]
pub struct Mbs {
    pub bytes: Vec<u8>,
    pub hint: NumStrHint,
}

/// Compiled regex payload: the source text plus both compilations.
#[derive(Debug)]
pub struct Rex {
    pub source: String,
    pub cased: Regex,
    pub folded: Regex,
}

impl Rex {
    /// Pick the compilation matching the current `IGNORECASE` setting.
    pub fn select(&self, ignorecase: bool) -> &Regex {
        if ignorecase {
            &self.folded
        } else {
            &self.cased
        }
    }
}

/// A function-reference payload. The body lives in the parsed program's
/// function table; values only carry the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunRef {
    pub name: String,
    pub arity: usize,
}

/// String-keyed container.
#[derive(Debug, Default)]
pub struct Map {
    pub entries: HashMap<String, Value>,
}

/// Dense integer-indexed container; deleted slots become holes.
#[derive(Debug, Default)]
pub struct Arr {
    pub slots: Vec<Option<Value>>,
}

impl Arr {
    /// Store at `idx`, growing with holes as needed.
    pub fn set(&mut self, idx: usize, val: Value) {
        if idx >= self.slots.len() {
            self.slots.resize_with(idx + 1, || None);
        }
        self.slots[idx] = Some(val);
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.slots.get(idx).and_then(|s| s.as_ref())
    }
}

pub type MapRef = Rc<RefCell<Map>>;
pub type ArrRef = Rc<RefCell<Arr>>;

/// Where a reference value points. Never surfaces to user scripts.
#[derive(Debug, Clone)]
pub enum RefTarget {
    Named(String),
    Global(usize),
    Local(usize),
    Arg(usize),
    MapCell(MapRef, String),
    ArrCell(ArrRef, usize),
    Field(usize),
}

/// A tagged value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Char(char),
    ByteChar(u8),
    Int(i64),
    Flt(f64),
    Str(Rc<Str>),
    Mbs(Rc<Mbs>),
    Rex(Rc<Rex>),
    Map(MapRef),
    Arr(ArrRef),
    Fun(Rc<FunRef>),
    Ref(Rc<RefTarget>),
}

/// Number formats in force, taken from `CONVFMT`/`OFMT`.
#[derive(Debug, Clone)]
pub struct NumFmts {
    pub convfmt: String,
    pub ofmt: String,
}

impl Default for NumFmts {
    fn default() -> NumFmts {
        NumFmts {
            convfmt: "%.6g".to_string(),
            ofmt: "%.6g".to_string(),
        }
    }
}

/// Which format applies when stringifying a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrCtx {
    /// Ordinary conversion, `CONVFMT`.
    Convert,
    /// Print context, `OFMT`.
    Print,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Char(_) => "char",
            Value::ByteChar(_) => "bchr",
            Value::Int(_) => "int",
            Value::Flt(_) => "flt",
            Value::Str(_) => "str",
            Value::Mbs(_) => "mbs",
            Value::Rex(_) => "rex",
            Value::Map(_) => "map",
            Value::Arr(_) => "arr",
            Value::Fun(_) => "fun",
            Value::Ref(_) => "ref",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Convert to a number. Strings convert by their longest numeric
    /// prefix, short-circuiting through the numeric-string hint when one
    /// was recorded. Containers and references do not convert.
    pub fn to_num(&self, strip_spaces: bool) -> Result<Num, HawkError> {
        let opts = ScanOpts {
            strip_spaces,
            prefixes: true,
        };
        match self {
            Value::Nil => Ok(Num::Int(0)),
            Value::Int(v) => Ok(Num::Int(*v)),
            Value::Flt(v) => Ok(Num::Flt(*v)),
            Value::Char(c) => Ok(Num::Int(*c as i64)),
            Value::ByteChar(b) => Ok(Num::Int(*b as i64)),
            Value::Str(s) => Ok(str_to_num(&s.text, s.hint, opts)),
            Value::Mbs(m) => {
                let text: String = m.bytes.iter().map(|&b| b as char).collect();
                Ok(str_to_num(&text, m.hint, opts))
            }
            other => Err(HawkError::with_msg(
                ErrorKind::Invalid,
                format!("'{}' not convertible to number", other.type_name()),
            )),
        }
    }

    /// Truth value. Numeric-hinted strings compare numerically; other
    /// strings are true when non-empty.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Char(c) => *c != '\0',
            Value::ByteChar(b) => *b != 0,
            Value::Int(v) => *v != 0,
            Value::Flt(v) => *v != 0.0,
            Value::Str(s) => match s.hint {
                NumStrHint::None => !s.text.is_empty(),
                hint => {
                    let opts = ScanOpts {
                        strip_spaces: true,
                        prefixes: false,
                    };
                    match str_to_num(&s.text, hint, opts) {
                        Num::Int(v) => v != 0,
                        Num::Flt(v) => v != 0.0,
                    }
                }
            },
            Value::Mbs(m) => !m.bytes.is_empty(),
            Value::Rex(_) | Value::Fun(_) | Value::Ref(_) => true,
            Value::Map(m) => !m.borrow().entries.is_empty(),
            Value::Arr(a) => a.borrow().slots.iter().any(|s| s.is_some()),
        }
    }

    /// Render to text. Borrows where the payload already is text; floats
    /// format with `CONVFMT` or, in print context, `OFMT`.
    pub fn to_text<'a>(&'a self, fmts: &NumFmts, ctx: StrCtx) -> Result<Cow<'a, str>, HawkError> {
        Ok(match self {
            Value::Nil => Cow::Borrowed(""),
            Value::Char(c) => Cow::Owned(c.to_string()),
            Value::ByteChar(b) => Cow::Owned((*b as char).to_string()),
            Value::Int(v) => Cow::Owned(v.to_string()),
            Value::Flt(v) => {
                let fmt = match ctx {
                    StrCtx::Convert => &fmts.convfmt,
                    StrCtx::Print => &fmts.ofmt,
                };
                Cow::Owned(num::format_float(fmt, *v))
            }
            Value::Str(s) => Cow::Borrowed(s.text.as_str()),
            Value::Mbs(m) => Cow::Owned(m.bytes.iter().map(|&b| b as char).collect()),
            Value::Rex(r) => Cow::Borrowed(r.source.as_str()),
            Value::Fun(f) => Cow::Borrowed(f.name.as_str()),
            other => {
                return Err(HawkError::with_msg(
                    ErrorKind::Invalid,
                    format!("'{}' not convertible to string", other.type_name()),
                ))
            }
        })
    }

    /// Append the text rendering to `out` without an intermediate
    /// allocation for the borrowable cases.
    pub fn append_text(
        &self,
        fmts: &NumFmts,
        ctx: StrCtx,
        out: &mut String,
    ) -> Result<(), HawkError> {
        out.push_str(&self.to_text(fmts, ctx)?);
        Ok(())
    }

    /// Identity-aware hash: scalars hash by content, heap containers by
    /// address.
    pub fn hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        std::mem::discriminant(self).hash(&mut h);
        match self {
            Value::Nil => {}
            Value::Char(c) => c.hash(&mut h),
            Value::ByteChar(b) => b.hash(&mut h),
            Value::Int(v) => v.hash(&mut h),
            Value::Flt(v) => v.to_bits().hash(&mut h),
            Value::Str(s) => s.text.hash(&mut h),
            Value::Mbs(m) => m.bytes.hash(&mut h),
            Value::Rex(r) => (Rc::as_ptr(r) as usize).hash(&mut h),
            Value::Map(m) => (Rc::as_ptr(m) as usize).hash(&mut h),
            Value::Arr(a) => (Rc::as_ptr(a) as usize).hash(&mut h),
            Value::Fun(f) => f.name.hash(&mut h),
            Value::Ref(r) => (Rc::as_ptr(r) as usize).hash(&mut h),
        }
        h.finish()
    }
}

fn str_to_num(text: &str, hint: NumStrHint, opts: ScanOpts) -> Num {
    match hint {
        NumStrHint::Int | NumStrHint::Flt => {
            // a recorded hint guarantees the scan succeeds
            num::scan_num(
                text,
                ScanOpts {
                    strip_spaces: true,
                    prefixes: false,
                },
            )
            .unwrap_or(Num::Int(0))
        }
        NumStrHint::None => scan_prefix(text, opts),
    }
}

/// AWK-style coercion: the longest numeric prefix, zero when there is
/// none.
fn scan_prefix(text: &str, opts: ScanOpts) -> Num {
    let t = if opts.strip_spaces {
        text.trim_start()
    } else {
        text
    };
    let bytes = t.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut float = false;
    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac = end + 1;
        while frac < bytes.len() && bytes[frac].is_ascii_digit() {
            frac += 1;
        }
        if frac > end + 1 || end > digits_start {
            float = true;
            end = frac;
        }
    }
    if end > digits_start && end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut e = end + 1;
        if e < bytes.len() && (bytes[e] == b'+' || bytes[e] == b'-') {
            e += 1;
        }
        let e_digits = e;
        while e < bytes.len() && bytes[e].is_ascii_digit() {
            e += 1;
        }
        if e > e_digits {
            float = true;
            end = e;
        }
    }
    if end == digits_start {
        return Num::Int(0);
    }
    let slice = &t[..end];
    if float {
        Num::Flt(slice.parse().unwrap_or(0.0))
    } else {
        match slice.parse::<i64>() {
            Ok(v) => Num::Int(v),
            Err(_) => Num::Flt(slice.parse().unwrap_or(0.0)),
        }
    }
}

/// Per-runtime-context allocator front: value factories plus the cycle
/// collector registry.
pub struct Heap {
    gc: GcRegistry,
    empty_str: Rc<Str>,
}

impl Default for Heap {
    fn default() -> Heap {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Heap {
        Heap {
            gc: GcRegistry::new(),
            empty_str: Rc::new(Str {
                text: String::new(),
                hint: NumStrHint::None,
            }),
        }
    }

    pub fn make_nil(&self) -> Value {
        Value::Nil
    }

    pub fn make_int(&self, v: i64) -> Value {
        Value::Int(v)
    }

    pub fn make_flt(&self, v: f64) -> Value {
        Value::Flt(v)
    }

    pub fn make_char(&self, c: char) -> Value {
        Value::Char(c)
    }

    pub fn make_byte_char(&self, b: u8) -> Value {
        Value::ByteChar(b)
    }

    pub fn make_str(&self, text: impl Into<String>) -> Value {
        let text = text.into();
        if text.is_empty() {
            return Value::Str(Rc::clone(&self.empty_str));
        }
        Value::Str(Rc::new(Str {
            text,
            hint: NumStrHint::None,
        }))
    }

    /// A string carrying its numeric-string hint; used for record input
    /// and field splits.
    pub fn make_nstr(&self, text: impl Into<String>) -> Value {
        let text = text.into();
        if text.is_empty() {
            return Value::Str(Rc::clone(&self.empty_str));
        }
        let hint = num::numeric_str_hint(&text);
        Value::Str(Rc::new(Str { text, hint }))
    }

    /// Either a numeric value or a hinted string, depending on whether the
    /// text scans cleanly as a number.
    pub fn make_num_or_str(&self, text: &str) -> Value {
        match num::numeric_str_hint(text) {
            NumStrHint::Int | NumStrHint::Flt => {
                match num::scan_num(
                    text,
                    ScanOpts {
                        strip_spaces: true,
                        prefixes: false,
                    },
                ) {
                    Some(Num::Int(v)) => Value::Int(v),
                    Some(Num::Flt(v)) => Value::Flt(v),
                    None => self.make_nstr(text.to_string()),
                }
            }
            NumStrHint::None => self.make_str(text.to_string()),
        }
    }

    pub fn make_mbs(&self, bytes: impl Into<Vec<u8>>) -> Value {
        Value::Mbs(Rc::new(Mbs {
            bytes: bytes.into(),
            hint: NumStrHint::None,
        }))
    }

    pub fn make_map(&self) -> Value {
        let m: MapRef = Rc::new(RefCell::new(Map::default()));
        self.gc.register_map(&m);
        Value::Map(m)
    }

    pub fn make_arr(&self, initial_capacity: usize) -> Value {
        let a: ArrRef = Rc::new(RefCell::new(Arr {
            slots: Vec::with_capacity(initial_capacity),
        }));
        self.gc.register_arr(&a);
        Value::Arr(a)
    }

    /// Compile `pattern` into both a case-sensitive and a case-insensitive
    /// TNFA.
    pub fn make_rex(&self, pattern: &str, bounds: bool) -> Result<Value, HawkError> {
        let cased = Regex::compile(
            pattern,
            CompileOpts {
                icase: false,
                bounds,
            },
        )?;
        let folded = Regex::compile(pattern, CompileOpts { icase: true, bounds })?;
        Ok(Value::Rex(Rc::new(Rex {
            source: pattern.to_string(),
            cased,
            folded,
        })))
    }

    pub fn make_fun(&self, name: impl Into<String>, arity: usize) -> Value {
        Value::Fun(Rc::new(FunRef {
            name: name.into(),
            arity,
        }))
    }

    pub fn make_ref(&self, target: RefTarget) -> Value {
        Value::Ref(Rc::new(target))
    }

    /// The shared empty-string singleton.
    pub fn empty_str(&self) -> Value {
        Value::Str(Rc::clone(&self.empty_str))
    }

    /// Return a uniquely-owned copy when the payload is shared, the value
    /// itself otherwise. Containers copy one level deep and register with
    /// the collector.
    pub fn clone_if_shared(&self, val: &Value) -> Value {
        match val {
            Value::Str(s) if Rc::strong_count(s) > 1 && !s.text.is_empty() => {
                Value::Str(Rc::new(Str {
                    text: s.text.clone(),
                    hint: s.hint,
                }))
            }
            Value::Mbs(m) if Rc::strong_count(m) > 1 => Value::Mbs(Rc::new(Mbs {
                bytes: m.bytes.clone(),
                hint: m.hint,
            })),
            Value::Map(m) if Rc::strong_count(m) > 1 => {
                let copy: MapRef = Rc::new(RefCell::new(Map {
                    entries: m.borrow().entries.clone(),
                }));
                self.gc.register_map(&copy);
                Value::Map(copy)
            }
            Value::Arr(a) if Rc::strong_count(a) > 1 => {
                let copy: ArrRef = Rc::new(RefCell::new(Arr {
                    slots: a.borrow().slots.clone(),
                }));
                self.gc.register_arr(&copy);
                Value::Arr(copy)
            }
            other => other.clone(),
        }
    }

    /// Run the cycle collector over the requested generation span.
    pub fn gc(&self, gen: GcGen) -> GcStats {
        self.gc.collect_gen(gen)
    }

    /// Collect the young generation if the allocation pressure crossed
    /// the threshold.
    pub fn maybe_collect(&self) -> Option<GcStats> {
        if self.gc.should_collect() {
            Some(self.gc.collect_gen(GcGen::Young))
        } else {
            None
        }
    }

    pub fn set_gc_threshold(&self, n: usize) {
        self.gc.set_threshold(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_and_scalars() {
        let heap = Heap::new();
        assert!(heap.make_nil().is_nil());
        assert!(!heap.make_nil().to_bool());
        assert_eq!(heap.make_int(3).to_num(false).unwrap(), Num::Int(3));
        assert_eq!(heap.make_char('A').to_num(false).unwrap(), Num::Int(65));
    }

    #[test]
    fn empty_string_is_shared() {
        let heap = Heap::new();
        let a = heap.make_str("");
        let b = heap.make_str("");
        match (&a, &b) {
            (Value::Str(x), Value::Str(y)) => assert!(Rc::ptr_eq(x, y)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn refcount_pairs_cancel() {
        let heap = Heap::new();
        let v = heap.make_str("payload");
        let Value::Str(rc) = &v else { unreachable!() };
        let before = Rc::strong_count(rc);
        let a = v.clone();
        let b = v.clone();
        assert_eq!(Rc::strong_count(rc), before + 2);
        drop(a);
        drop(b);
        assert_eq!(Rc::strong_count(rc), before);
    }

    #[test]
    fn numeric_string_hint_short_circuits() {
        let heap = Heap::new();
        let v = heap.make_nstr(" 42 ");
        assert_eq!(v.to_num(false).unwrap(), Num::Int(42));
        assert!(v.to_bool());
        let zero = heap.make_nstr("0");
        assert!(!zero.to_bool());
        // unhinted non-numeric text is truthy by length
        let s = heap.make_str("0 but text");
        assert!(s.to_bool());
    }

    #[test]
    fn prefix_coercion() {
        let heap = Heap::new();
        assert_eq!(
            heap.make_str("12abc").to_num(false).unwrap(),
            Num::Int(12)
        );
        assert_eq!(
            heap.make_str("3.5rest").to_num(false).unwrap(),
            Num::Flt(3.5)
        );
        assert_eq!(heap.make_str("abc").to_num(false).unwrap(), Num::Int(0));
        assert_eq!(
            heap.make_str("  7").to_num(true).unwrap(),
            Num::Int(7)
        );
    }

    #[test]
    fn num_or_str_factory() {
        let heap = Heap::new();
        assert!(matches!(heap.make_num_or_str("10"), Value::Int(10)));
        assert!(matches!(heap.make_num_or_str("1.5"), Value::Flt(_)));
        assert!(matches!(heap.make_num_or_str("ten"), Value::Str(_)));
    }

    #[test]
    fn to_text_modes() {
        let heap = Heap::new();
        let fmts = NumFmts {
            convfmt: "%.6g".into(),
            ofmt: "%.2f".into(),
        };
        let f = heap.make_flt(3.14159);
        assert_eq!(f.to_text(&fmts, StrCtx::Convert).unwrap(), "3.14159");
        assert_eq!(f.to_text(&fmts, StrCtx::Print).unwrap(), "3.14");
        assert_eq!(heap.make_int(14).to_text(&fmts, StrCtx::Convert).unwrap(), "14");
        assert_eq!(heap.make_nil().to_text(&fmts, StrCtx::Convert).unwrap(), "");
    }

    #[test]
    fn containers_reject_string_conversion() {
        let heap = Heap::new();
        let m = heap.make_map();
        assert_eq!(
            m.to_text(&NumFmts::default(), StrCtx::Convert).unwrap_err().kind,
            ErrorKind::Invalid
        );
    }

    #[test]
    fn val_to_num_of_val_to_str_round_trips() {
        let heap = Heap::new();
        let fmts = NumFmts::default();
        for n in [-5i64, 0, 7, 123456789] {
            let s = heap.make_int(n).to_text(&fmts, StrCtx::Convert).unwrap().into_owned();
            assert_eq!(heap.make_str(s).to_num(false).unwrap(), Num::Int(n));
        }
        for f in [0.5f64, -12.25] {
            let s = heap.make_flt(f).to_text(&fmts, StrCtx::Convert).unwrap().into_owned();
            assert_eq!(heap.make_str(s).to_num(false).unwrap(), Num::Flt(f));
        }
    }

    #[test]
    fn clone_if_shared_unshares_containers() {
        let heap = Heap::new();
        let m = heap.make_map();
        if let Value::Map(r) = &m {
            r.borrow_mut().entries.insert("k".into(), Value::Int(1));
        }
        let alias = m.clone();
        let copy = heap.clone_if_shared(&alias);
        match (&m, &copy) {
            (Value::Map(a), Value::Map(b)) => {
                assert!(!Rc::ptr_eq(a, b));
                b.borrow_mut().entries.insert("k".into(), Value::Int(2));
                assert!(matches!(a.borrow().entries["k"], Value::Int(1)));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn hash_distinguishes_payloads() {
        let heap = Heap::new();
        assert_ne!(heap.make_int(1).hash(), heap.make_int(2).hash());
        assert_eq!(
            heap.make_str("ab").hash(),
            heap.make_str("ab").hash()
        );
        assert_ne!(heap.make_map().hash(), heap.make_map().hash());
    }

    #[test]
    fn rex_value_carries_both_compilations() {
        let heap = Heap::new();
        let v = heap.make_rex("ab+", true).unwrap();
        let Value::Rex(rex) = &v else { unreachable!() };
        assert!(rex.select(false).exec_str("xabb", Default::default()).is_some());
        assert!(rex.select(true).exec_str("xABB", Default::default()).is_some());
        assert!(rex.select(false).exec_str("xABB", Default::default()).is_none());
    }
}
