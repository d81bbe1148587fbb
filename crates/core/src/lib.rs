//! Hawk Core: the value system and shared types of the Hawk interpreter.
//!
//! This crate provides everything the parser, the regex bindings, and the
//! record-I/O engine agree on:
//!
//! - `value`: the tagged [`Value`] enum, the [`Heap`] factories, and
//!   string/number coercion
//! - `gc`: the generational cycle collector for container values
//! - `error`: the shared error taxonomy with source locations
//! - `options`: trait bits and interpreter tunables
//! - `num`: strict numeric scanning and `CONVFMT`-style float formatting
//!
//! Reference counting is `Rc`: binding a value clones the handle, dropping
//! it releases. The cycle collector only ever sees maps and arrays, the
//! two variants that can close a reference cycle.

pub mod error;
pub mod gc;
pub mod num;
pub mod options;
pub mod value;

pub use error::{ErrorKind, ErrorState, HawkError, Loc};
pub use gc::{GcGen, GcStats, GC_THRESHOLD};
pub use num::{Num, NumStrHint};
pub use options::{Options, Trait};
pub use value::{
    Arr, ArrRef, FunRef, Heap, Map, MapRef, Mbs, NumFmts, RefTarget, Rex, Str, StrCtx, Value,
};

/// Embedder-supplied primitive operations the core cannot assume.
///
/// `pow` and `fmod` are mandatory; the module hooks and the log writer are
/// optional.
pub struct Prim {
    pub pow: fn(f64, f64) -> f64,
    pub fmod: fn(f64, f64) -> f64,
    pub log_write: Option<Box<dyn Fn(u32, &str)>>,
}

impl Default for Prim {
    fn default() -> Prim {
        Prim {
            pow: |x, y| x.powf(y),
            fmod: |x, y| x % y,
            log_write: None,
        }
    }
}

impl std::fmt::Debug for Prim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prim")
            .field("log_write", &self.log_write.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prims() {
        let prim = Prim::default();
        assert_eq!((prim.pow)(2.0, 10.0), 1024.0);
        assert_eq!((prim.fmod)(7.5, 2.0), 1.5);
    }
}
