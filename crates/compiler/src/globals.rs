//! Built-in global variables.
//!
//! These occupy the first slots of the global table in a fixed order;
//! embedder-registered globals follow. The indices are part of the public
//! contract between the parser and the runtime.

/// Slot indices of the built-in globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum GblId {
    Convfmt = 0,
    Filename,
    Fnr,
    Fs,
    Ignorecase,
    Nf,
    Nr,
    Numstrdetect,
    Ofilename,
    Ofmt,
    Ofs,
    Ors,
    Rlength,
    Rs,
    Rstart,
    Scriptname,
    Striprecspc,
    Stripstrspc,
    Subsep,
}

/// Names in slot order.
pub const BUILTIN_GLOBALS: &[&str] = &[
    "CONVFMT",
    "FILENAME",
    "FNR",
    "FS",
    "IGNORECASE",
    "NF",
    "NR",
    "NUMSTRDETECT",
    "OFILENAME",
    "OFMT",
    "OFS",
    "ORS",
    "RLENGTH",
    "RS",
    "RSTART",
    "SCRIPTNAME",
    "STRIPRECSPC",
    "STRIPSTRSPC",
    "SUBSEP",
];

/// Number of built-in global slots.
pub const NUM_BUILTIN_GLOBALS: usize = BUILTIN_GLOBALS.len();

/// Find a built-in global slot by name.
pub fn builtin_global(name: &str) -> Option<usize> {
    BUILTIN_GLOBALS.iter().position(|&g| g == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_stable() {
        assert_eq!(GblId::Convfmt as usize, 0);
        assert_eq!(builtin_global("FS"), Some(GblId::Fs as usize));
        assert_eq!(builtin_global("RS"), Some(GblId::Rs as usize));
        assert_eq!(builtin_global("SUBSEP"), Some(NUM_BUILTIN_GLOBALS - 1));
        assert_eq!(builtin_global("NOPE"), None);
    }
}
