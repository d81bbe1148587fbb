//! Hawk Runtime: the per-execution context and the record-I/O engine.
//!
//! An [`Rtx`] is opened over a parsed program. It owns the global slot
//! vector, the current input record with its field slots, the value heap,
//! and the chain of open I/O streams. The evaluator (an external
//! collaborator) drives it; everything here is also directly usable by
//! embedders, which is how the tests exercise it.

mod rec;
mod rio;

pub use rio::{CloseMode, OpenMode, RioArg, RioHandler, RioKind, RwcMode};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hawk_core::{
    ErrorKind, ErrorState, GcGen, GcStats, HawkError, Heap, Num, NumFmts, Rex, StrCtx, Trait,
    Value,
};
use hawk_compiler::{GblId, Hawk, Program, NUM_BUILTIN_GLOBALS};

use rio::RioSys;

/// Runtime context over a parsed program.
pub struct Rtx<'h> {
    hawk: &'h Hawk,
    program: &'h Program,
    heap: Heap,
    globals: Vec<Value>,
    pub(crate) inrec: InRec,
    pub(crate) rio: RioSys,
    /// Compiled separator caches, keyed by source text.
    pub(crate) rs_rex: RefCell<Option<(String, Rc<Rex>)>>,
    pub(crate) fs_rex: RefCell<Option<(String, Rc<Rex>)>>,
    errs: ErrorState,
    halt: Arc<AtomicBool>,
    stack_limit: usize,
}

/// The current input record and its decomposition.
#[derive(Default)]
pub(crate) struct InRec {
    /// Canonical `$0` text.
    pub line: String,
    /// `$0` as a value.
    pub d0: Value,
    /// `$1..$NF`.
    pub fields: Vec<Value>,
}

impl<'h> std::fmt::Debug for Rtx<'h> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rtx").finish_non_exhaustive()
    }
}

impl<'h> Rtx<'h> {
    /// Open a runtime context; the interpreter must hold a parsed
    /// program.
    pub fn new(hawk: &'h Hawk) -> Result<Rtx<'h>, HawkError> {
        let program = hawk.program().ok_or_else(|| {
            HawkError::with_msg(ErrorKind::Perm, "no parsed program to run")
        })?;
        let heap = Heap::new();
        let nglobals = program.globals.len().max(NUM_BUILTIN_GLOBALS);
        let mut globals = vec![Value::Nil; nglobals];
        globals[GblId::Convfmt as usize] = heap.make_str("%.6g");
        globals[GblId::Ofmt as usize] = heap.make_str("%.6g");
        globals[GblId::Subsep as usize] = heap.make_str("\u{1c}");
        globals[GblId::Nf as usize] = Value::Int(0);
        globals[GblId::Nr as usize] = Value::Int(0);
        globals[GblId::Fnr as usize] = Value::Int(0);
        globals[GblId::Ignorecase as usize] = Value::Int(0);
        globals[GblId::Rstart as usize] = Value::Int(0);
        globals[GblId::Rlength as usize] = Value::Int(-1);
        globals[GblId::Numstrdetect as usize] = Value::Int(
            hawk.opts().traits.contains(Trait::NUM_STR_DETECT) as i64,
        );
        Ok(Rtx {
            hawk,
            program,
            heap,
            globals,
            inrec: InRec::default(),
            rio: RioSys::default(),
            rs_rex: RefCell::new(None),
            fs_rex: RefCell::new(None),
            errs: ErrorState::default(),
            halt: hawk.halt_flag(),
            stack_limit: program
                .rtx_stack_limit
                .unwrap_or(hawk.opts().rtx_stack_limit),
        })
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn hawk(&self) -> &Hawk {
        self.hawk
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn stack_limit(&self) -> usize {
        self.stack_limit
    }

    pub fn last_error(&self) -> Option<&HawkError> {
        self.errs.last()
    }

    pub(crate) fn set_error(&mut self, err: HawkError) {
        self.errs.set(err);
    }

    /// Poll the embedder-settable halt flag; called at I/O boundaries.
    pub fn check_halt(&self) -> Result<(), HawkError> {
        if self.halt.load(Ordering::Relaxed) {
            Err(HawkError::new(ErrorKind::RuntimeHalted))
        } else {
            Ok(())
        }
    }

    /// Run the cycle collector.
    pub fn gc(&self, gen: GcGen) -> GcStats {
        self.heap.gc(gen)
    }

    // ------------------------------------------------------------------
    // globals

    pub fn gbl(&self, idx: usize) -> &Value {
        &self.globals[idx]
    }

    pub fn gbl_by_id(&self, id: GblId) -> &Value {
        &self.globals[id as usize]
    }

    pub(crate) fn set_gbl_raw(&mut self, idx: usize, val: Value) {
        self.globals[idx] = val;
    }

    /// Store a global. Assigning `NF` adjusts the field vector and
    /// rebuilds `$0` so the record invariant holds.
    pub fn set_gbl(&mut self, idx: usize, val: Value) -> Result<(), HawkError> {
        if idx == GblId::Nf as usize {
            let want = match val.to_num(true)? {
                Num::Int(v) => v.max(0) as usize,
                Num::Flt(v) => v.max(0.0) as usize,
            };
            self.globals[idx] = Value::Int(want as i64);
            let have = self.inrec.fields.len();
            if want < have {
                self.truncate_fields(want)?;
            } else if want > have {
                self.set_field(want, "", false)?;
            }
            return Ok(());
        }
        self.globals[idx] = val;
        Ok(())
    }

    pub fn set_gbl_by_id(&mut self, id: GblId, val: Value) -> Result<(), HawkError> {
        self.set_gbl(id as usize, val)
    }

    /// The `CONVFMT`/`OFMT` pair currently in force.
    pub fn num_fmts(&self) -> NumFmts {
        let mut fmts = NumFmts::default();
        if let Ok(s) = self.globals[GblId::Convfmt as usize].to_text(&fmts.clone(), StrCtx::Convert)
        {
            if !s.is_empty() {
                fmts.convfmt = s.into_owned();
            }
        }
        if let Ok(s) = self.globals[GblId::Ofmt as usize].to_text(&fmts.clone(), StrCtx::Convert) {
            if !s.is_empty() {
                fmts.ofmt = s.into_owned();
            }
        }
        fmts
    }

    pub fn ignorecase(&self) -> bool {
        self.globals[GblId::Ignorecase as usize].to_bool()
    }

    /// Resolve a string-ish global: `None` when nil.
    pub(crate) fn gbl_text(&self, id: GblId) -> Result<Option<String>, HawkError> {
        match &self.globals[id as usize] {
            Value::Nil => Ok(None),
            v => Ok(Some(
                v.to_text(&self.num_fmts(), StrCtx::Convert)?.into_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawk_compiler::StringSource;

    fn rtx_for(src: &str) -> Hawk {
        let mut hawk = Hawk::new();
        let mut io = StringSource::new(src);
        hawk.parse(&mut io).unwrap();
        hawk
    }

    #[test]
    fn rtx_requires_a_parsed_program() {
        let hawk = Hawk::new();
        assert_eq!(Rtx::new(&hawk).unwrap_err().kind, ErrorKind::Perm);
    }

    #[test]
    fn globals_start_with_defaults() {
        let hawk = rtx_for("BEGIN { }");
        let rtx = Rtx::new(&hawk).unwrap();
        let fmts = rtx.num_fmts();
        assert_eq!(fmts.convfmt, "%.6g");
        assert!(matches!(rtx.gbl_by_id(GblId::Nf), Value::Int(0)));
        assert!(rtx.gbl_by_id(GblId::Rs).is_nil());
        assert!(!rtx.ignorecase());
    }

    #[test]
    fn halt_flag_unwinds() {
        let hawk = rtx_for("BEGIN { }");
        let rtx = Rtx::new(&hawk).unwrap();
        assert!(rtx.check_halt().is_ok());
        hawk.halt_flag().store(true, Ordering::Relaxed);
        assert_eq!(
            rtx.check_halt().unwrap_err().kind,
            ErrorKind::RuntimeHalted
        );
    }

    #[test]
    fn stack_limit_comes_from_pragma_or_options() {
        let hawk = rtx_for("@pragma stack_limit 4096;\nBEGIN { }");
        let rtx = Rtx::new(&hawk).unwrap();
        assert_eq!(rtx.stack_limit(), 4096);

        let hawk = rtx_for("BEGIN { }");
        let rtx = Rtx::new(&hawk).unwrap();
        assert_eq!(rtx.stack_limit(), hawk.opts().rtx_stack_limit);
    }

    #[test]
    fn shared_program_supports_many_contexts() {
        let hawk = rtx_for("BEGIN { }");
        let a = Rtx::new(&hawk).unwrap();
        let b = Rtx::new(&hawk).unwrap();
        assert!(std::ptr::eq(a.program(), b.program()));
    }
}
