//! The interpreter handle.
//!
//! A [`Hawk`] owns everything that survives across parses: option bits,
//! the intrinsic-function registry, the global-variable sequence, the
//! last-error slot, and the parsed program tree. Runtime contexts are
//! spawned from the parsed program by the runtime crate.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use hawk_core::{ErrorKind, ErrorState, HawkError, Options, Prim};

use crate::ast::Program;
use crate::globals::{builtin_global, BUILTIN_GLOBALS, NUM_BUILTIN_GLOBALS};
use crate::parser::Parser;
use crate::source::SourceIo;

/// Shape of an intrinsic (built-in) function, registered before `parse`.
#[derive(Debug, Clone)]
pub struct IntrinsicSpec {
    pub min_args: usize,
    pub max_args: usize,
    /// Per-argument kinds: `v` value, `r` reference (requires an lvalue),
    /// `x` regex-or-value. The last character repeats for trailing
    /// arguments; `None` means all-value.
    pub arg_spec: Option<String>,
}

impl IntrinsicSpec {
    pub fn new(min_args: usize, max_args: usize, arg_spec: Option<&str>) -> IntrinsicSpec {
        IntrinsicSpec {
            min_args,
            max_args,
            arg_spec: arg_spec.map(str::to_string),
        }
    }

    /// Kind letter governing the `i`-th argument.
    pub fn arg_kind(&self, i: usize) -> char {
        match &self.arg_spec {
            None => 'v',
            Some(spec) => spec
                .chars()
                .nth(i)
                .or_else(|| spec.chars().last())
                .unwrap_or('v'),
        }
    }
}

/// The interpreter handle.
pub struct Hawk {
    opts: Options,
    prim: Prim,
    errs: ErrorState,
    intrinsics: HashMap<String, Rc<IntrinsicSpec>>,
    /// Global names by slot; built-ins first. Survives across parses so
    /// embedder registrations stay stable.
    globals: Vec<String>,
    program: Option<Program>,
    parsed: bool,
    halt: Arc<AtomicBool>,
}

impl std::fmt::Debug for Hawk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hawk").finish_non_exhaustive()
    }
}

impl Default for Hawk {
    fn default() -> Hawk {
        Hawk::new()
    }
}

impl Hawk {
    pub fn new() -> Hawk {
        Hawk::with_options(Options::default())
    }

    pub fn with_options(opts: Options) -> Hawk {
        Hawk {
            opts,
            prim: Prim::default(),
            errs: ErrorState::default(),
            intrinsics: HashMap::new(),
            globals: BUILTIN_GLOBALS.iter().map(|s| s.to_string()).collect(),
            program: None,
            parsed: false,
            halt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn opts(&self) -> &Options {
        &self.opts
    }

    pub fn opts_mut(&mut self) -> &mut Options {
        &mut self.opts
    }

    pub fn prim(&self) -> &Prim {
        &self.prim
    }

    pub fn set_prim(&mut self, prim: Prim) {
        self.prim = prim;
    }

    /// The halt flag polled at statement and I/O boundaries. Settable
    /// from a signal handler through the shared `Arc`.
    pub fn halt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halt)
    }

    pub fn last_error(&self) -> Option<&HawkError> {
        self.errs.last()
    }

    pub fn backup_errmsg(&mut self) -> Option<String> {
        self.errs.backup_errmsg().map(str::to_string)
    }

    /// Register an embedder global. Only valid before the first parse.
    pub fn add_global(&mut self, name: &str) -> Result<usize, HawkError> {
        if self.parsed {
            return Err(HawkError::with_msg(
                ErrorKind::Perm,
                "global registration after parse",
            ));
        }
        if builtin_global(name).is_some() || self.globals.iter().any(|g| g == name) {
            return Err(HawkError::with_msg(
                ErrorKind::Exist,
                format!("duplicate global '{}'", name),
            ));
        }
        self.globals.push(name.to_string());
        Ok(self.globals.len() - 1)
    }

    pub fn find_global(&self, name: &str) -> Option<usize> {
        self.globals.iter().position(|g| g == name)
    }

    /// Blank out an embedder global. The slot survives so later indices
    /// stay valid; built-ins cannot be deleted.
    pub fn delete_global(&mut self, name: &str) -> Result<(), HawkError> {
        if self.parsed {
            return Err(HawkError::with_msg(
                ErrorKind::Perm,
                "global deletion after parse",
            ));
        }
        let slot = self
            .find_global(name)
            .ok_or_else(|| HawkError::with_msg(ErrorKind::NoEnt, format!("no global '{}'", name)))?;
        if slot < NUM_BUILTIN_GLOBALS {
            return Err(HawkError::with_msg(
                ErrorKind::Perm,
                format!("global '{}' is built in", name),
            ));
        }
        self.globals[slot].clear();
        Ok(())
    }

    /// Pre-register a built-in function, bound at parse time.
    pub fn add_intrinsic(
        &mut self,
        name: &str,
        spec: IntrinsicSpec,
    ) -> Result<Rc<IntrinsicSpec>, HawkError> {
        if self.intrinsics.contains_key(name) {
            return Err(HawkError::with_msg(
                ErrorKind::Exist,
                format!("duplicate intrinsic '{}'", name),
            ));
        }
        let spec = Rc::new(spec);
        self.intrinsics.insert(name.to_string(), Rc::clone(&spec));
        Ok(spec)
    }

    pub fn find_intrinsic(&self, name: &str) -> Option<&Rc<IntrinsicSpec>> {
        self.intrinsics.get(name)
    }

    pub(crate) fn intrinsics(&self) -> &HashMap<String, Rc<IntrinsicSpec>> {
        &self.intrinsics
    }

    pub(crate) fn globals(&self) -> &[String] {
        &self.globals
    }

    /// Parse a script supplied through the source-I/O callback. On
    /// success the program tree is owned by the handle; on failure no
    /// partial tree is retained and the pre-parse tables stay intact.
    pub fn parse(&mut self, io: &mut dyn SourceIo) -> Result<&Program, HawkError> {
        self.errs.clear();
        match Parser::run(self, io) {
            Ok(program) => {
                tracing::debug!(
                    funs = program.funs.len(),
                    globals = program.globals.len(),
                    chain = program.chain.len(),
                    "parse complete"
                );
                self.globals = program.globals.clone();
                self.program = Some(program);
                self.parsed = true;
                Ok(self.program.as_ref().expect("program just stored"))
            }
            Err(e) => {
                self.program = None;
                self.errs.set(e.clone());
                Err(e)
            }
        }
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Drop the parsed program and parse-time state, keeping options,
    /// intrinsics, and embedder globals.
    pub fn clear(&mut self) {
        self.program = None;
        self.parsed = false;
        self.errs.clear();
        self.halt
            .store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_globals_preseeded() {
        let hawk = Hawk::new();
        assert_eq!(hawk.find_global("FS"), Some(3));
        assert_eq!(hawk.find_global("SUBSEP"), Some(NUM_BUILTIN_GLOBALS - 1));
    }

    #[test]
    fn add_and_delete_globals() {
        let mut hawk = Hawk::new();
        let slot = hawk.add_global("MYVAR").unwrap();
        assert_eq!(slot, NUM_BUILTIN_GLOBALS);
        assert_eq!(
            hawk.add_global("MYVAR").unwrap_err().kind,
            ErrorKind::Exist
        );
        assert_eq!(hawk.add_global("FS").unwrap_err().kind, ErrorKind::Exist);
        assert_eq!(
            hawk.delete_global("FS").unwrap_err().kind,
            ErrorKind::Perm
        );
        hawk.delete_global("MYVAR").unwrap();
        assert_eq!(hawk.find_global("MYVAR"), None);
    }

    #[test]
    fn intrinsic_spec_kinds() {
        let spec = IntrinsicSpec::new(1, 3, Some("rvx"));
        assert_eq!(spec.arg_kind(0), 'r');
        assert_eq!(spec.arg_kind(1), 'v');
        assert_eq!(spec.arg_kind(2), 'x');
        // the last letter repeats past the spec string
        assert_eq!(spec.arg_kind(7), 'x');
        let plain = IntrinsicSpec::new(0, 2, None);
        assert_eq!(plain.arg_kind(1), 'v');
    }

    #[test]
    fn duplicate_intrinsic_rejected() {
        let mut hawk = Hawk::new();
        hawk.add_intrinsic("length", IntrinsicSpec::new(0, 1, None))
            .unwrap();
        assert_eq!(
            hawk.add_intrinsic("length", IntrinsicSpec::new(0, 1, None))
                .unwrap_err()
                .kind,
            ErrorKind::Exist
        );
    }
}
