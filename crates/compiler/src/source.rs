//! Source input for the parser.
//!
//! Script text reaches the parser through a [`SourceIo`] callback with
//! `Open`/`Read`/`Close` commands over a [`SourceArg`] block. The
//! [`SourceReader`] layers the `@include` stack, location tracking, and
//! the `@include_once` identity history on top of the callback.

use std::collections::HashMap;
use std::rc::Rc;

use hawk_core::{ErrorKind, HawkError, Loc};

/// Per-stream block passed to every [`SourceIo`] call.
#[derive(Debug, Default)]
pub struct SourceArg {
    /// Stream name; `None` is the main script.
    pub name: Option<Rc<str>>,
    /// Resolved path, filled by `open`.
    pub path: Option<String>,
    /// Content identity used by `@include_once`; when the opener leaves it
    /// empty the resolved name stands in.
    pub unique_id: Option<String>,
    /// Opener-owned slot.
    pub handle: usize,
    /// Path of the including source, for relative resolution.
    pub prev_path: Option<String>,
}

/// The source-I/O callback.
pub trait SourceIo {
    fn open(&mut self, arg: &mut SourceArg) -> Result<(), HawkError>;
    /// Fill `buf`, returning the number of characters produced; zero
    /// means end of stream.
    fn read(&mut self, arg: &mut SourceArg, buf: &mut [char]) -> Result<usize, HawkError>;
    fn close(&mut self, arg: &mut SourceArg) -> Result<(), HawkError>;
}

const READ_CHUNK: usize = 512;

struct OpenSource {
    arg: SourceArg,
    buf: Vec<char>,
    pos: usize,
    eof: bool,
    line: u32,
    colm: u32,
    /// LIFO pushback; the lexer needs up to two slots.
    pending: Vec<char>,
}

/// Character supply with include nesting.
pub(crate) struct SourceReader<'io> {
    io: &'io mut dyn SourceIo,
    stack: Vec<OpenSource>,
    depth_limit: usize,
    once_history: Vec<String>,
    /// Includes popped since the parser last asked; drives per-file
    /// pragma scoping.
    popped: usize,
}

impl<'io> SourceReader<'io> {
    /// Open the main script.
    pub fn new(io: &'io mut dyn SourceIo, depth_limit: usize) -> Result<SourceReader<'io>, HawkError> {
        let mut arg = SourceArg::default();
        io.open(&mut arg)?;
        Ok(SourceReader {
            io,
            stack: vec![OpenSource {
                arg,
                buf: Vec::new(),
                pos: 0,
                eof: false,
                line: 1,
                colm: 1,
                pending: Vec::new(),
            }],
            depth_limit,
            once_history: Vec::new(),
            popped: 0,
        })
    }

    /// Number of include pops since the last call.
    pub fn take_popped(&mut self) -> usize {
        std::mem::take(&mut self.popped)
    }

    /// Location of the next character to be read.
    pub fn loc(&self) -> Loc {
        match self.stack.last() {
            Some(src) => Loc {
                file: src.arg.name.clone(),
                line: src.line,
                colm: src.colm,
            },
            None => Loc::default(),
        }
    }

    /// Next character, crossing include boundaries transparently.
    pub fn get(&mut self) -> Result<Option<char>, HawkError> {
        loop {
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };
            if let Some(c) = top.pending.pop() {
                advance_loc(top, c);
                return Ok(Some(c));
            }
            if top.pos >= top.buf.len() {
                if !top.eof {
                    top.buf.resize(READ_CHUNK, '\0');
                    let n = self.io.read(&mut top.arg, &mut top.buf)?;
                    top.buf.truncate(n);
                    top.pos = 0;
                    if n == 0 {
                        top.eof = true;
                    }
                }
                if top.eof {
                    // an included file ran out; fall back to the includer
                    let mut done = self.stack.pop().expect("source stack not empty");
                    self.io.close(&mut done.arg)?;
                    if self.stack.is_empty() {
                        return Ok(None);
                    }
                    self.popped += 1;
                    continue;
                }
            }
            let c = top.buf[top.pos];
            top.pos += 1;
            advance_loc(top, c);
            return Ok(Some(c));
        }
    }

    /// Push one character back.
    pub fn unget(&mut self, c: char) {
        if let Some(top) = self.stack.last_mut() {
            top.pending.push(c);
            if top.colm > 1 {
                top.colm -= 1;
            }
        }
    }

    /// Open an include target. Returns `false` when an `@include_once`
    /// target was already seen and is skipped.
    pub fn push_include(&mut self, name: &str, once: bool, loc: &Loc) -> Result<bool, HawkError> {
        if self.depth_limit > 0 && self.stack.len() > self.depth_limit {
            return Err(HawkError::new(ErrorKind::InclNest).at(loc.clone()));
        }
        let mut arg = SourceArg {
            name: Some(Rc::from(name)),
            prev_path: self.stack.last().and_then(|s| s.arg.path.clone()),
            ..Default::default()
        };
        self.io.open(&mut arg)?;
        let id = arg
            .unique_id
            .clone()
            .or_else(|| arg.path.clone())
            .unwrap_or_else(|| name.to_string());
        if once && self.once_history.iter().any(|seen| *seen == id) {
            self.io.close(&mut arg)?;
            return Ok(false);
        }
        self.once_history.push(id);
        self.stack.push(OpenSource {
            arg,
            buf: Vec::new(),
            pos: 0,
            eof: false,
            line: 1,
            colm: 1,
            pending: Vec::new(),
        });
        Ok(true)
    }

    /// Close anything still open (normally just the main script).
    pub fn finish(&mut self) -> Result<(), HawkError> {
        while let Some(mut src) = self.stack.pop() {
            self.io.close(&mut src.arg)?;
        }
        Ok(())
    }
}

fn advance_loc(src: &mut OpenSource, c: char) {
    if c == '\n' {
        src.line += 1;
        src.colm = 1;
    } else {
        src.colm += 1;
    }
}

/// In-memory source: a main script plus named include texts. The unique
/// id of an include is its name, so identical names dedupe under
/// `@include_once`.
pub struct StringSource {
    main: String,
    includes: HashMap<String, String>,
    streams: Vec<Option<(Vec<char>, usize)>>,
}

impl StringSource {
    pub fn new(main: impl Into<String>) -> StringSource {
        StringSource {
            main: main.into(),
            includes: HashMap::new(),
            streams: Vec::new(),
        }
    }

    pub fn with_include(mut self, name: impl Into<String>, text: impl Into<String>) -> StringSource {
        self.includes.insert(name.into(), text.into());
        self
    }
}

impl SourceIo for StringSource {
    fn open(&mut self, arg: &mut SourceArg) -> Result<(), HawkError> {
        let text = match &arg.name {
            None => self.main.clone(),
            Some(name) => self
                .includes
                .get(name.as_ref())
                .cloned()
                .ok_or_else(|| {
                    HawkError::with_msg(
                        ErrorKind::Open,
                        format!("cannot open include '{}'", name),
                    )
                })?,
        };
        if let Some(name) = &arg.name {
            arg.unique_id = Some(name.to_string());
        }
        arg.handle = self.streams.len();
        self.streams.push(Some((text.chars().collect(), 0)));
        Ok(())
    }

    fn read(&mut self, arg: &mut SourceArg, buf: &mut [char]) -> Result<usize, HawkError> {
        let slot = self
            .streams
            .get_mut(arg.handle)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| HawkError::new(ErrorKind::Read))?;
        let (chars, pos) = slot;
        let n = buf.len().min(chars.len() - *pos);
        buf[..n].copy_from_slice(&chars[*pos..*pos + n]);
        *pos += n;
        Ok(n)
    }

    fn close(&mut self, arg: &mut SourceArg) -> Result<(), HawkError> {
        if let Some(slot) = self.streams.get_mut(arg.handle) {
            *slot = None;
        }
        Ok(())
    }
}

/// Filesystem source. Includes resolve against the including file's
/// directory first, then each configured include directory; the unique id
/// is the canonicalized path.
pub struct FileSource {
    main_path: String,
    include_dirs: Vec<String>,
    streams: Vec<Option<(Vec<char>, usize)>>,
}

impl FileSource {
    pub fn new(main_path: impl Into<String>, include_dirs: Vec<String>) -> FileSource {
        FileSource {
            main_path: main_path.into(),
            include_dirs,
            streams: Vec::new(),
        }
    }

    fn resolve(&self, name: &str, prev_path: Option<&str>) -> Option<std::path::PathBuf> {
        let cand = std::path::Path::new(name);
        if cand.is_absolute() {
            return cand.exists().then(|| cand.to_path_buf());
        }
        if let Some(prev) = prev_path {
            if let Some(dir) = std::path::Path::new(prev).parent() {
                let p = dir.join(name);
                if p.exists() {
                    return Some(p);
                }
            }
        }
        for dir in &self.include_dirs {
            let p = std::path::Path::new(dir).join(name);
            if p.exists() {
                return Some(p);
            }
        }
        cand.exists().then(|| cand.to_path_buf())
    }
}

impl SourceIo for FileSource {
    fn open(&mut self, arg: &mut SourceArg) -> Result<(), HawkError> {
        let path = match &arg.name {
            None => std::path::PathBuf::from(&self.main_path),
            Some(name) => self
                .resolve(name, arg.prev_path.as_deref())
                .ok_or_else(|| {
                    HawkError::with_msg(
                        ErrorKind::Open,
                        format!("cannot open include '{}'", name),
                    )
                })?,
        };
        let text = std::fs::read_to_string(&path).map_err(|e| {
            HawkError::with_msg(ErrorKind::Open, format!("{}: {}", path.display(), e))
        })?;
        arg.unique_id = std::fs::canonicalize(&path)
            .ok()
            .map(|p| p.display().to_string());
        arg.path = Some(path.display().to_string());
        arg.handle = self.streams.len();
        self.streams.push(Some((text.chars().collect(), 0)));
        Ok(())
    }

    fn read(&mut self, arg: &mut SourceArg, buf: &mut [char]) -> Result<usize, HawkError> {
        let slot = self
            .streams
            .get_mut(arg.handle)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| HawkError::new(ErrorKind::Read))?;
        let (chars, pos) = slot;
        let n = buf.len().min(chars.len() - *pos);
        buf[..n].copy_from_slice(&chars[*pos..*pos + n]);
        *pos += n;
        Ok(n)
    }

    fn close(&mut self, arg: &mut SourceArg) -> Result<(), HawkError> {
        if let Some(slot) = self.streams.get_mut(arg.handle) {
            *slot = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(reader: &mut SourceReader<'_>) -> String {
        let mut out = String::new();
        while let Some(c) = reader.get().unwrap() {
            out.push(c);
        }
        out
    }

    #[test]
    fn reads_main_and_tracks_location() {
        let mut io = StringSource::new("ab\ncd");
        let mut r = SourceReader::new(&mut io, 8).unwrap();
        assert_eq!(r.loc().line, 1);
        assert_eq!(r.get().unwrap(), Some('a'));
        assert_eq!(r.get().unwrap(), Some('b'));
        assert_eq!(r.get().unwrap(), Some('\n'));
        assert_eq!(r.loc().line, 2);
        assert_eq!(drain(&mut r), "cd");
    }

    #[test]
    fn unget_replays() {
        let mut io = StringSource::new("xy");
        let mut r = SourceReader::new(&mut io, 8).unwrap();
        let c = r.get().unwrap().unwrap();
        r.unget(c);
        assert_eq!(drain(&mut r), "xy");
    }

    #[test]
    fn include_nests_and_returns() {
        let mut io = StringSource::new("A;B").with_include("inc", "12");
        let mut r = SourceReader::new(&mut io, 8).unwrap();
        assert_eq!(r.get().unwrap(), Some('A'));
        assert_eq!(r.get().unwrap(), Some(';'));
        assert!(r.push_include("inc", false, &Loc::default()).unwrap());
        assert_eq!(r.get().unwrap(), Some('1'));
        assert_eq!(r.get().unwrap(), Some('2'));
        // include exhausted, back to the main script
        assert_eq!(r.get().unwrap(), Some('B'));
        assert_eq!(r.get().unwrap(), None);
    }

    #[test]
    fn include_once_skips_duplicates() {
        let mut io = StringSource::new("").with_include("inc", "z");
        let mut r = SourceReader::new(&mut io, 8).unwrap();
        assert!(r.push_include("inc", true, &Loc::default()).unwrap());
        assert_eq!(r.get().unwrap(), Some('z'));
        assert!(!r.push_include("inc", true, &Loc::default()).unwrap());
    }

    #[test]
    fn include_depth_is_limited() {
        let mut io = StringSource::new("").with_include("a", "");
        let mut r = SourceReader::new(&mut io, 1).unwrap();
        assert!(r.push_include("a", false, &Loc::default()).is_ok());
        let err = r.push_include("a", false, &Loc::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InclNest);
    }

    #[test]
    fn missing_include_is_open_error() {
        let mut io = StringSource::new("");
        let mut r = SourceReader::new(&mut io, 4).unwrap();
        let err = r.push_include("nope", false, &Loc::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Open);
    }
}
