//! Interpreter option bits and tunables.

use bitflags::bitflags;

bitflags! {
    /// Behavior traits, settable on the interpreter handle before parsing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Trait: u32 {
        /// Allow undeclared variables.
        const IMPLICIT = 1 << 0;
        /// Allow multiline string and regex literals.
        const MULTILINE_STR = 1 << 1;
        /// Enable `nextofile` and `OFILENAME`.
        const NEXTOFILE = 1 << 2;
        /// Enable `getline`, `print`, `printf`, `close`, `fflush`,
        /// piping, and file redirection.
        const RIO = 1 << 3;
        /// Enable the two-way pipe when `RIO` is on.
        const RW_PIPE = 1 << 4;
        /// A newline can terminate a statement.
        const NEWLINE = 1 << 5;
        /// Drop empty fields produced when a regex field separator
        /// matches all-space runs at the record edges.
        const STRIP_REC_SPC = 1 << 6;
        /// Strip leading spaces when converting a string to a number.
        const STRIP_STR_SPC = 1 << 7;
        /// Concatenate adjacent expressions by juxtaposition; with this
        /// off, only `%%` concatenates.
        const BLANK_CONCAT = 1 << 8;
        /// CR + LF line terminators.
        const CRLF = 1 << 10;
        /// Flexible map handling (scalar overwrite without delete).
        const FLEX_MAP = 1 << 11;
        /// Allow `BEGIN`, `END`, and pattern-action blocks.
        const PABLOCK = 1 << 12;
        /// Allow `{n,m}` bounds in regular expressions.
        const REX_BOUND = 1 << 13;
        /// Numeric comparison when a numeric-looking string meets a number.
        const NCMP_ON_STR = 1 << 14;
        /// Parameter and local names may not shadow the owning function.
        const STRICT_NAMING = 1 << 15;
        /// Fault-tolerant mode: print/printf failures behave like getline.
        const TOLERANT = 1 << 17;
        /// Detect numeric strings on input and convert automatically.
        const NUM_STR_DETECT = 1 << 18;
    }
}

impl Trait {
    /// Classic AWK compatibility bundle.
    pub const CLASSIC: Trait = Trait::IMPLICIT
        .union(Trait::RIO)
        .union(Trait::NEWLINE)
        .union(Trait::BLANK_CONCAT)
        .union(Trait::PABLOCK)
        .union(Trait::STRIP_STR_SPC)
        .union(Trait::STRICT_NAMING)
        .union(Trait::NUM_STR_DETECT);

    /// The classic bundle plus the modern extensions.
    pub const MODERN: Trait = Trait::CLASSIC
        .union(Trait::FLEX_MAP)
        .union(Trait::REX_BOUND)
        .union(Trait::RW_PIPE)
        .union(Trait::TOLERANT)
        .union(Trait::NEXTOFILE);
}

/// Per-category nesting depth limits. Zero means unlimited.
#[derive(Debug, Clone, Copy)]
pub struct Depths {
    pub include: usize,
    pub block_parse: usize,
    pub block_run: usize,
    pub expr_parse: usize,
    pub expr_run: usize,
    pub rex_build: usize,
    pub rex_match: usize,
}

impl Default for Depths {
    fn default() -> Depths {
        Depths {
            include: 32,
            block_parse: 64,
            block_run: 0,
            expr_parse: 128,
            expr_run: 0,
            rex_build: 0,
            rex_match: 0,
        }
    }
}

/// Bounds for the runtime stack limit as clamped by `@pragma stack_limit`.
pub const STACK_LIMIT_MIN: usize = 512;
pub const STACK_LIMIT_MAX: usize = i32::MAX as usize;
pub const STACK_LIMIT_DEFAULT: usize = 5120;

/// Everything configurable on an interpreter handle.
#[derive(Debug, Clone)]
pub struct Options {
    pub traits: Trait,
    /// Module name decoration for the loader glue.
    pub mod_prefix: Option<String>,
    pub mod_postfix: Option<String>,
    /// Search directories for `@include` targets.
    pub include_dirs: Vec<String>,
    pub depths: Depths,
    pub rtx_stack_limit: usize,
    pub log_mask: u32,
    pub log_maxcapa: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            traits: Trait::MODERN,
            mod_prefix: None,
            mod_postfix: None,
            include_dirs: Vec::new(),
            depths: Depths::default(),
            rtx_stack_limit: STACK_LIMIT_DEFAULT,
            log_mask: u32::MAX,
            log_maxcapa: 0,
        }
    }
}

/// Clamp a requested stack limit into the permitted range.
pub fn clamp_stack_limit(n: usize) -> usize {
    n.clamp(STACK_LIMIT_MIN, STACK_LIMIT_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_is_subset_of_modern() {
        assert!(Trait::MODERN.contains(Trait::CLASSIC));
        assert!(Trait::MODERN.contains(Trait::REX_BOUND));
        assert!(!Trait::CLASSIC.contains(Trait::TOLERANT));
    }

    #[test]
    fn stack_limit_clamps() {
        assert_eq!(clamp_stack_limit(0), STACK_LIMIT_MIN);
        assert_eq!(clamp_stack_limit(4096), 4096);
        assert_eq!(clamp_stack_limit(usize::MAX), STACK_LIMIT_MAX);
    }
}
