//! Stream chain and record reading/writing.
//!
//! Named streams live on a chain owned by the runtime context; all actual
//! I/O goes through an embedder-supplied [`RioHandler`] per stream kind
//! (pipe, file, console). Record separation follows `RS`: nil splits on
//! newline, the empty string on blank lines, a single character exactly,
//! and anything longer is a regex under the longest-match rule, where a
//! match touching the end of the scan buffer is deferred until more input
//! (or end of stream) settles it.

use std::rc::Rc;

use hawk_compiler::ast::{InType, OutType};
use hawk_compiler::GblId;
use hawk_core::{ErrorKind, HawkError, Rex, StrCtx, Trait, Value};
use hawk_regex::ExecOpts;

use crate::Rtx;

const RIO_CHUNK: usize = 2048;

/// Stream kinds, one handler slot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RioKind {
    Pipe = 0,
    File = 1,
    Console = 2,
}

/// How a stream was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
    ReadWrite,
}

/// Close directive passed to the handler for read-write streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwcMode {
    Full,
    Read,
    Write,
}

/// Which side `close(name, "r"/"w")` asks to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    Read,
    Write,
}

#[derive(Debug, Default)]
pub struct InState {
    pub(crate) buf: Vec<char>,
    pub(crate) bbuf: Vec<u8>,
    pub(crate) pos: usize,
    pub eof: bool,
    pub eos: bool,
    /// Locked on first read: `Some(true)` byte mode, `Some(false)` text.
    pub(crate) byte_mode: Option<bool>,
}

#[derive(Debug, Default)]
pub struct OutState {
    pub eof: bool,
    pub eos: bool,
}

/// Per-stream block handed to every handler call.
#[derive(Debug)]
pub struct RioArg {
    pub name: String,
    /// Handler-owned slot.
    pub handle: usize,
    pub kind: RioKind,
    pub mode: OpenMode,
    /// Directive for the next close call.
    pub rwc_mode: RwcMode,
    pub(crate) rwc_state: Option<CloseMode>,
    pub(crate) mask_read: bool,
    pub(crate) mask_write: bool,
    pub(crate) in_: InState,
    pub(crate) out: OutState,
}

impl RioArg {
    fn new(name: &str, kind: RioKind, mode: OpenMode, mask_read: bool, mask_write: bool) -> RioArg {
        RioArg {
            name: name.to_string(),
            handle: 0,
            kind,
            mode,
            rwc_mode: RwcMode::Full,
            rwc_state: None,
            mask_read,
            mask_write,
            in_: InState::default(),
            out: OutState::default(),
        }
    }
}

/// The record-I/O callback for one stream kind.
pub trait RioHandler {
    fn open(&mut self, arg: &mut RioArg) -> Result<(), HawkError>;
    fn close(&mut self, arg: &mut RioArg) -> Result<(), HawkError>;

    /// Fill `buf`; zero means end of file.
    fn read(&mut self, _arg: &mut RioArg, _buf: &mut [char]) -> Result<usize, HawkError> {
        Ok(0)
    }

    fn read_bytes(&mut self, _arg: &mut RioArg, _buf: &mut [u8]) -> Result<usize, HawkError> {
        Ok(0)
    }

    /// Consume a prefix of `data`, returning its length in bytes (on a
    /// char boundary); zero means the stream can take no more.
    fn write(&mut self, _arg: &mut RioArg, _data: &str) -> Result<usize, HawkError> {
        Err(HawkError::with_msg(ErrorKind::Write, "stream not writable"))
    }

    fn write_bytes(&mut self, _arg: &mut RioArg, _data: &[u8]) -> Result<usize, HawkError> {
        Err(HawkError::with_msg(ErrorKind::Write, "stream not writable"))
    }

    fn flush(&mut self, _arg: &mut RioArg) -> Result<(), HawkError> {
        Ok(())
    }

    /// Move to the next sibling stream; `false` means none is left.
    fn next(&mut self, _arg: &mut RioArg) -> Result<bool, HawkError> {
        Ok(false)
    }
}

#[derive(Default)]
pub(crate) struct RioSys {
    pub handlers: [Option<Box<dyn RioHandler>>; 3],
    pub chain: Vec<RioArg>,
}

fn in_props(t: InType) -> (RioKind, OpenMode, bool) {
    match t {
        InType::Pipe => (RioKind::Pipe, OpenMode::Read, false),
        InType::RwPipe => (RioKind::Pipe, OpenMode::ReadWrite, true),
        InType::File => (RioKind::File, OpenMode::Read, false),
        InType::Console => (RioKind::Console, OpenMode::Read, false),
    }
}

fn out_props(t: OutType) -> (RioKind, OpenMode, bool) {
    match t {
        OutType::Pipe => (RioKind::Pipe, OpenMode::Write, false),
        OutType::RwPipe => (RioKind::Pipe, OpenMode::ReadWrite, true),
        OutType::File => (RioKind::File, OpenMode::Write, false),
        OutType::ApFile => (RioKind::File, OpenMode::Append, false),
        OutType::Console => (RioKind::Console, OpenMode::Write, false),
    }
}

impl<'h> Rtx<'h> {
    /// Keep the last failure available through the error accessor.
    fn remember<T>(&mut self, r: Result<T, HawkError>) -> Result<T, HawkError> {
        if let Err(e) = &r {
            self.set_error(e.clone());
        }
        r
    }

    /// Install the handler for one stream kind.
    pub fn set_rio_handler(&mut self, kind: RioKind, handler: Box<dyn RioHandler>) {
        self.rio.handlers[kind as usize] = Some(handler);
    }

    fn take_handler(&mut self, kind: RioKind) -> Result<Box<dyn RioHandler>, HawkError> {
        self.rio.handlers[kind as usize]
            .take()
            .ok_or_else(|| HawkError::new(ErrorKind::IoUser))
    }

    fn put_handler(&mut self, kind: RioKind, handler: Box<dyn RioHandler>) {
        self.rio.handlers[kind as usize] = Some(handler);
    }

    /// Find the chain entry for `(kind, masks, name)`, opening a fresh
    /// stream when none exists.
    fn find_rio(
        &mut self,
        h: &mut dyn RioHandler,
        kind: RioKind,
        mode: OpenMode,
        mask_read: bool,
        mask_write: bool,
        name: &str,
        byte_if_new: bool,
    ) -> Result<usize, HawkError> {
        if let Some(i) = self.rio.chain.iter().position(|p| {
            p.kind == kind
                && p.mask_read == mask_read
                && p.mask_write == mask_write
                && p.name == name
        }) {
            return Ok(i);
        }
        let mut arg = RioArg::new(name, kind, mode, mask_read, mask_write);
        if byte_if_new {
            arg.in_.byte_mode = Some(true);
        }
        h.open(&mut arg)?;
        self.rio.chain.push(arg);
        Ok(self.rio.chain.len() - 1)
    }

    fn mixed_mode_err(&self, name: &str) -> HawkError {
        if name.is_empty() {
            HawkError::with_msg(ErrorKind::Perm, "disallowed mixed mode input")
        } else {
            HawkError::with_msg(
                ErrorKind::Perm,
                format!("disallowed mixed mode input on {}", name),
            )
        }
    }

    /// Compile (and cache) the record separator as a regex.
    fn rs_regex(&self, src: &str) -> Result<Rc<Rex>, HawkError> {
        {
            let cache = self.rs_rex.borrow();
            if let Some((s, r)) = &*cache {
                if s == src {
                    return Ok(Rc::clone(r));
                }
            }
        }
        let bounds = self.hawk.opts().traits.contains(Trait::REX_BOUND);
        let Value::Rex(rex) = self.heap().make_rex(src, bounds)? else {
            unreachable!("make_rex returns a regex value");
        };
        *self.rs_rex.borrow_mut() = Some((src.to_string(), Rc::clone(&rex)));
        Ok(rex)
    }

    // ------------------------------------------------------------------
    // record reading

    /// Read one record from the named stream into `out`. Returns `false`
    /// at end of stream with no record.
    pub fn read_record(
        &mut self,
        in_type: InType,
        name: &str,
        out: &mut String,
    ) -> Result<bool, HawkError> {
        self.check_halt()?;
        let (kind, mode, rdwr) = in_props(in_type);
        let mut handler = self.take_handler(kind)?;
        let r = self.read_record_inner(&mut *handler, kind, mode, rdwr, name, out);
        self.put_handler(kind, handler);
        self.remember(r)
    }

    fn read_record_inner(
        &mut self,
        h: &mut dyn RioHandler,
        kind: RioKind,
        mode: OpenMode,
        rdwr: bool,
        name: &str,
        out: &mut String,
    ) -> Result<bool, HawkError> {
        let idx = self.find_rio(h, kind, mode, true, rdwr, name, false)?;
        if self.rio.chain[idx].in_.eos {
            return Ok(false);
        }
        match self.rio.chain[idx].in_.byte_mode {
            Some(true) => return Err(self.mixed_mode_err(name)),
            _ => self.rio.chain[idx].in_.byte_mode = Some(false),
        }

        let rrs = self.gbl_text(GblId::Rs)?;
        let rs_chars: Vec<char> = rrs.as_deref().unwrap_or("").chars().collect();
        let crlf = self.hawk.opts().traits.contains(Trait::CRLF);

        let mut rec: Vec<char> = Vec::new();
        let mut ret = true;
        let mut line_len = 0usize;
        let mut c = '\0';
        let mut pc;

        'outer: loop {
            if self.rio.chain[idx].in_.pos >= self.rio.chain[idx].in_.buf.len() {
                if self.rio.chain[idx].in_.eof {
                    if rec.is_empty() {
                        ret = false;
                    }
                    break;
                }
                let mut chunk = vec!['\0'; RIO_CHUNK];
                let n = h.read(&mut self.rio.chain[idx], &mut chunk)?;
                if n == 0 {
                    self.rio.chain[idx].in_.eof = true;
                    if rec.is_empty() {
                        ret = false;
                    } else if rrs.as_deref() == Some("") {
                        // drop the line terminator of the last record line
                        if rec.last() == Some(&'\n') {
                            rec.pop();
                            if crlf && rec.last() == Some(&'\r') {
                                rec.pop();
                            }
                        }
                    } else if rs_chars.len() >= 2 {
                        // a match deferred at the buffer end is final now
                        self.cut_long_rs(&mut rec, idx, rrs.as_deref().unwrap_or(""))?;
                    }
                    break;
                }
                chunk.truncate(n);
                let st = &mut self.rio.chain[idx].in_;
                st.buf = chunk;
                st.pos = 0;
            }

            if rrs.is_none() {
                // default: newline-separated, CR before LF stripped
                let st = &mut self.rio.chain[idx].in_;
                let start = st.pos;
                let mut end = st.pos;
                let mut found = false;
                while st.pos < st.buf.len() {
                    pc = c;
                    c = st.buf[st.pos];
                    st.pos += 1;
                    end = st.pos;
                    if c == '\n' {
                        end -= 1;
                        if pc == '\r' {
                            if end > start {
                                end -= 1;
                            } else if rec.last() == Some(&'\r') {
                                // CR arrived with the previous chunk
                                rec.pop();
                            }
                        }
                        found = true;
                        break;
                    }
                }
                rec.extend_from_slice(&st.buf[start..end]);
                if found {
                    break 'outer;
                }
            } else if rs_chars.is_empty() {
                // paragraph mode: a blank line separates records
                let mut done = false;
                loop {
                    let st = &mut self.rio.chain[idx].in_;
                    if st.pos >= st.buf.len() {
                        break;
                    }
                    pc = c;
                    c = st.buf[st.pos];
                    st.pos += 1;
                    if c == '\n' {
                        if pc == '\r' && !rec.is_empty() {
                            line_len = line_len.saturating_sub(1);
                            // in CRLF mode the CR stays until the blank
                            // line is confirmed
                            if !crlf {
                                rec.pop();
                            }
                        }
                        if line_len == 0 {
                            if crlf && rec.last() == Some(&'\r') {
                                rec.pop();
                            }
                            if rec.is_empty() {
                                // leading blank lines before the record
                                continue;
                            }
                            rec.pop(); // the terminator of the last line
                            if crlf && rec.last() == Some(&'\r') {
                                rec.pop();
                            }
                            done = true;
                            break;
                        }
                        line_len = 0;
                        rec.push(c);
                    } else {
                        line_len += 1;
                        rec.push(c);
                    }
                }
                if done {
                    break 'outer;
                }
            } else if rs_chars.len() == 1 {
                let rs0 = rs_chars[0];
                let st = &mut self.rio.chain[idx].in_;
                let start = st.pos;
                let mut end = st.pos;
                let mut found = false;
                while st.pos < st.buf.len() {
                    c = st.buf[st.pos];
                    st.pos += 1;
                    end = st.pos;
                    if c == rs0 {
                        end -= 1;
                        found = true;
                        break;
                    }
                }
                rec.extend_from_slice(&st.buf[start..end]);
                if found {
                    break 'outer;
                }
            } else {
                // multi-character RS: longest match over the record buffer
                let st = &mut self.rio.chain[idx].in_;
                let pos = st.pos;
                rec.extend_from_slice(&st.buf[pos..]);
                st.pos = st.buf.len();
                if self.cut_long_rs(&mut rec, idx, rrs.as_deref().unwrap_or(""))? {
                    break 'outer;
                }
            }
        }

        tracing::trace!(name, len = rec.len(), eof = !ret, "record read");
        out.clear();
        out.extend(rec.iter());
        Ok(ret)
    }

    /// Cut the record at a regex `RS` match. A match ending exactly at
    /// the end of the buffer is not yet the longest match unless the
    /// stream hit EOF; characters beyond the separator go back to the
    /// read buffer.
    fn cut_long_rs(
        &mut self,
        rec: &mut Vec<char>,
        idx: usize,
        rs_src: &str,
    ) -> Result<bool, HawkError> {
        let rex = self.rs_regex(rs_src)?;
        let re = rex.select(self.ignorecase());
        let Some(caps) = re.exec(rec.as_slice(), ExecOpts::default()) else {
            return Ok(false);
        };
        let (so, eo) = caps.whole();
        let st = &mut self.rio.chain[idx].in_;
        if st.eof {
            rec.truncate(so);
            Ok(true)
        } else if eo < rec.len() {
            let extra = rec.len() - eo;
            rec.truncate(so);
            st.pos = st.pos.saturating_sub(extra);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Byte-mode record reading; the same separator rules over octets.
    pub fn read_bytes_record(
        &mut self,
        in_type: InType,
        name: &str,
        out: &mut Vec<u8>,
    ) -> Result<bool, HawkError> {
        self.check_halt()?;
        let (kind, mode, rdwr) = in_props(in_type);
        let mut handler = self.take_handler(kind)?;
        let r = self.read_bytes_inner(&mut *handler, kind, mode, rdwr, name, out);
        self.put_handler(kind, handler);
        self.remember(r)
    }

    fn read_bytes_inner(
        &mut self,
        h: &mut dyn RioHandler,
        kind: RioKind,
        mode: OpenMode,
        rdwr: bool,
        name: &str,
        out: &mut Vec<u8>,
    ) -> Result<bool, HawkError> {
        let idx = self.find_rio(h, kind, mode, true, rdwr, name, true)?;
        if self.rio.chain[idx].in_.eos {
            return Ok(false);
        }
        match self.rio.chain[idx].in_.byte_mode {
            Some(false) => return Err(self.mixed_mode_err(name)),
            _ => self.rio.chain[idx].in_.byte_mode = Some(true),
        }

        let rrs = self.gbl_text(GblId::Rs)?;
        let rs_bytes: Vec<u8> = rrs.as_deref().unwrap_or("").bytes().collect();
        let crlf = self.hawk.opts().traits.contains(Trait::CRLF);

        let mut rec: Vec<u8> = Vec::new();
        let mut ret = true;
        let mut line_len = 0usize;
        let mut c = 0u8;
        let mut pc;

        'outer: loop {
            if self.rio.chain[idx].in_.pos >= self.rio.chain[idx].in_.bbuf.len() {
                if self.rio.chain[idx].in_.eof {
                    if rec.is_empty() {
                        ret = false;
                    }
                    break;
                }
                let mut chunk = vec![0u8; RIO_CHUNK];
                let n = h.read_bytes(&mut self.rio.chain[idx], &mut chunk)?;
                if n == 0 {
                    self.rio.chain[idx].in_.eof = true;
                    if rec.is_empty() {
                        ret = false;
                    } else if rrs.as_deref() == Some("") {
                        if rec.last() == Some(&b'\n') {
                            rec.pop();
                            if crlf && rec.last() == Some(&b'\r') {
                                rec.pop();
                            }
                        }
                    } else if rs_bytes.len() >= 2 {
                        self.cut_long_brs(&mut rec, idx, rrs.as_deref().unwrap_or(""))?;
                    }
                    break;
                }
                chunk.truncate(n);
                let st = &mut self.rio.chain[idx].in_;
                st.bbuf = chunk;
                st.pos = 0;
            }

            if rrs.is_none() {
                let st = &mut self.rio.chain[idx].in_;
                let start = st.pos;
                let mut end = st.pos;
                let mut found = false;
                while st.pos < st.bbuf.len() {
                    pc = c;
                    c = st.bbuf[st.pos];
                    st.pos += 1;
                    end = st.pos;
                    if c == b'\n' {
                        end -= 1;
                        if pc == b'\r' {
                            if end > start {
                                end -= 1;
                            } else if rec.last() == Some(&b'\r') {
                                rec.pop();
                            }
                        }
                        found = true;
                        break;
                    }
                }
                rec.extend_from_slice(&st.bbuf[start..end]);
                if found {
                    break 'outer;
                }
            } else if rs_bytes.is_empty() {
                let mut done = false;
                loop {
                    let st = &mut self.rio.chain[idx].in_;
                    if st.pos >= st.bbuf.len() {
                        break;
                    }
                    pc = c;
                    c = st.bbuf[st.pos];
                    st.pos += 1;
                    if c == b'\n' {
                        if pc == b'\r' && !rec.is_empty() {
                            line_len = line_len.saturating_sub(1);
                            if !crlf {
                                rec.pop();
                            }
                        }
                        if line_len == 0 {
                            if crlf && rec.last() == Some(&b'\r') {
                                rec.pop();
                            }
                            if rec.is_empty() {
                                continue;
                            }
                            rec.pop();
                            if crlf && rec.last() == Some(&b'\r') {
                                rec.pop();
                            }
                            done = true;
                            break;
                        }
                        line_len = 0;
                        rec.push(c);
                    } else {
                        line_len += 1;
                        rec.push(c);
                    }
                }
                if done {
                    break 'outer;
                }
            } else if rs_bytes.len() == 1 {
                let rs0 = rs_bytes[0];
                let st = &mut self.rio.chain[idx].in_;
                let start = st.pos;
                let mut end = st.pos;
                let mut found = false;
                while st.pos < st.bbuf.len() {
                    c = st.bbuf[st.pos];
                    st.pos += 1;
                    end = st.pos;
                    if c == rs0 {
                        end -= 1;
                        found = true;
                        break;
                    }
                }
                rec.extend_from_slice(&st.bbuf[start..end]);
                if found {
                    break 'outer;
                }
            } else {
                let st = &mut self.rio.chain[idx].in_;
                let pos = st.pos;
                rec.extend_from_slice(&st.bbuf[pos..]);
                st.pos = st.bbuf.len();
                if self.cut_long_brs(&mut rec, idx, rrs.as_deref().unwrap_or(""))? {
                    break 'outer;
                }
            }
        }

        out.clear();
        out.extend_from_slice(&rec);
        Ok(ret)
    }

    fn cut_long_brs(
        &mut self,
        rec: &mut Vec<u8>,
        idx: usize,
        rs_src: &str,
    ) -> Result<bool, HawkError> {
        let rex = self.rs_regex(rs_src)?;
        let re = rex.select(self.ignorecase());
        let Some(caps) = re.exec(rec.as_slice(), ExecOpts::default()) else {
            return Ok(false);
        };
        let (so, eo) = caps.whole();
        let st = &mut self.rio.chain[idx].in_;
        if st.eof {
            rec.truncate(so);
            Ok(true)
        } else if eo < rec.len() {
            let extra = rec.len() - eo;
            rec.truncate(so);
            st.pos = st.pos.saturating_sub(extra);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ------------------------------------------------------------------
    // writing

    fn prepare_write(
        &mut self,
        h: &mut dyn RioHandler,
        out_type: OutType,
        name: &str,
    ) -> Result<Option<usize>, HawkError> {
        let (kind, mode, rdwr) = out_props(out_type);
        let idx = self.find_rio(h, kind, mode, rdwr, true, name, false)?;
        let arg = &self.rio.chain[idx];
        if arg.out.eos || arg.out.eof {
            return Ok(None);
        }
        Ok(Some(idx))
    }

    /// Write text to the named stream. `Ok(false)` reports an
    /// end-of-file stream without raising an error, matching getline's
    /// soft-failure shape under the tolerant trait.
    pub fn write_io_text(
        &mut self,
        out_type: OutType,
        name: &str,
        text: &str,
    ) -> Result<bool, HawkError> {
        self.check_halt()?;
        let (kind, _, _) = out_props(out_type);
        let mut handler = self.take_handler(kind)?;
        let r = self.write_text_inner(&mut *handler, out_type, name, text);
        self.put_handler(kind, handler);
        self.remember(r)
    }

    fn write_text_inner(
        &mut self,
        h: &mut dyn RioHandler,
        out_type: OutType,
        name: &str,
        text: &str,
    ) -> Result<bool, HawkError> {
        let Some(idx) = self.prepare_write(h, out_type, name)? else {
            return Ok(false);
        };
        let mut data = text;
        while !data.is_empty() {
            let n = h.write(&mut self.rio.chain[idx], data)?;
            if n == 0 {
                self.rio.chain[idx].out.eof = true;
                return Ok(false);
            }
            data = &data[n.min(data.len())..];
        }
        Ok(true)
    }

    pub fn write_io_bytes(
        &mut self,
        out_type: OutType,
        name: &str,
        bytes: &[u8],
    ) -> Result<bool, HawkError> {
        self.check_halt()?;
        let (kind, _, _) = out_props(out_type);
        let mut handler = self.take_handler(kind)?;
        let r = self.write_bytes_inner(&mut *handler, out_type, name, bytes);
        self.put_handler(kind, handler);
        self.remember(r)
    }

    fn write_bytes_inner(
        &mut self,
        h: &mut dyn RioHandler,
        out_type: OutType,
        name: &str,
        bytes: &[u8],
    ) -> Result<bool, HawkError> {
        let Some(idx) = self.prepare_write(h, out_type, name)? else {
            return Ok(false);
        };
        let mut data = bytes;
        while !data.is_empty() {
            let n = h.write_bytes(&mut self.rio.chain[idx], data)?;
            if n == 0 {
                self.rio.chain[idx].out.eof = true;
                return Ok(false);
            }
            data = &data[n.min(data.len())..];
        }
        Ok(true)
    }

    /// Write a value, dispatching on its type: chars and strings write
    /// their contents, byte values write bytes, and anything else
    /// stringifies with print-context formatting.
    pub fn write_io_value(
        &mut self,
        out_type: OutType,
        name: &str,
        val: &Value,
    ) -> Result<bool, HawkError> {
        match val {
            Value::Char(c) => self.write_io_text(out_type, name, &c.to_string()),
            Value::Str(s) => {
                let text = s.text.clone();
                self.write_io_text(out_type, name, &text)
            }
            Value::ByteChar(b) => self.write_io_bytes(out_type, name, &[*b]),
            Value::Mbs(m) => {
                let bytes = m.bytes.clone();
                self.write_io_bytes(out_type, name, &bytes)
            }
            other => {
                let text = other
                    .to_text(&self.num_fmts(), StrCtx::Print)?
                    .into_owned();
                self.write_io_text(out_type, name, &text)
            }
        }
    }

    // ------------------------------------------------------------------
    // flush / next / close

    /// Flush matching output streams; `None` flushes them all. Reports
    /// `IoNameNotFound` when nothing matched.
    pub fn flush_io(&mut self, out_type: OutType, name: Option<&str>) -> Result<(), HawkError> {
        let (kind, mode, rdwr) = out_props(out_type);
        let mut handler = self.take_handler(kind)?;
        let mut flushed = false;
        let mut result = Ok(());
        for i in 0..self.rio.chain.len() {
            let matches = {
                let p = &self.rio.chain[i];
                p.kind == kind
                    && p.mask_write
                    && p.mask_read == rdwr
                    && p.mode == mode
                    && name.map_or(true, |n| p.name == n)
            };
            if matches {
                if let Err(e) = handler.flush(&mut self.rio.chain[i]) {
                    result = Err(e);
                    break;
                }
                flushed = true;
            }
        }
        self.put_handler(kind, handler);
        result?;
        if flushed {
            Ok(())
        } else {
            Err(HawkError::new(ErrorKind::IoNameNotFound))
        }
    }

    /// Ask the handler for the next sibling input stream (console file
    /// rotation). Success clears EOF and the read buffer.
    pub fn next_io_read(&mut self, in_type: InType, name: &str) -> Result<bool, HawkError> {
        self.check_halt()?;
        let (kind, _, rdwr) = in_props(in_type);
        let mut handler = self.take_handler(kind)?;
        let r = (|| {
            let Some(i) = self.rio.chain.iter().position(|p| {
                p.kind == kind && p.mask_read && p.mask_write == rdwr && p.name == name
            }) else {
                return Err(HawkError::new(ErrorKind::Intern));
            };
            if self.rio.chain[i].in_.eos {
                return Ok(false);
            }
            if !handler.next(&mut self.rio.chain[i])? {
                self.rio.chain[i].in_.eos = true;
                return Ok(false);
            }
            let st = &mut self.rio.chain[i].in_;
            st.eof = false;
            st.pos = 0;
            st.buf.clear();
            st.bbuf.clear();
            Ok(true)
        })();
        self.put_handler(kind, handler);
        r
    }

    pub fn next_io_write(&mut self, out_type: OutType, name: &str) -> Result<bool, HawkError> {
        self.check_halt()?;
        let (kind, _, rdwr) = out_props(out_type);
        let mut handler = self.take_handler(kind)?;
        let r = (|| {
            let Some(i) = self.rio.chain.iter().position(|p| {
                p.kind == kind && p.mask_write && p.mask_read == rdwr && p.name == name
            }) else {
                return Err(HawkError::new(ErrorKind::Intern));
            };
            if self.rio.chain[i].out.eos {
                return Ok(false);
            }
            if !handler.next(&mut self.rio.chain[i])? {
                self.rio.chain[i].out.eos = true;
                return Ok(false);
            }
            self.rio.chain[i].out.eof = false;
            Ok(true)
        })();
        self.put_handler(kind, handler);
        r
    }

    /// Close the first stream with the given name. For a read-write
    /// stream, `mode` closes one end; the chain entry stays until both
    /// ends are gone.
    pub fn close_io(&mut self, name: &str, mode: Option<CloseMode>) -> Result<(), HawkError> {
        let Some(i) = self.rio.chain.iter().position(|p| match mode {
            None => p.name == name,
            Some(CloseMode::Read) => p.name == name && p.mask_read,
            Some(CloseMode::Write) => p.name == name && p.mask_write,
        }) else {
            return Err(HawkError::new(ErrorKind::IoNameNotFound));
        };

        let rdwr = self.rio.chain[i].mask_read && self.rio.chain[i].mask_write;
        let rwc_mode = match mode {
            Some(CloseMode::Read) if rdwr && self.rio.chain[i].rwc_state != Some(CloseMode::Write) => {
                RwcMode::Read
            }
            Some(CloseMode::Write) if rdwr && self.rio.chain[i].rwc_state != Some(CloseMode::Read) => {
                RwcMode::Write
            }
            _ => RwcMode::Full,
        };

        let kind = self.rio.chain[i].kind;
        let mut handler = self.take_handler(kind)?;
        self.rio.chain[i].rwc_mode = rwc_mode;
        let closed = handler.close(&mut self.rio.chain[i]);
        self.put_handler(kind, handler);
        closed.map_err(|e| {
            if e.kind == ErrorKind::IoImpl {
                e
            } else {
                HawkError::with_msg(ErrorKind::IoImpl, e.to_string())
            }
        })?;

        if rdwr && rwc_mode != RwcMode::Full && self.rio.chain[i].rwc_state.is_none() {
            // one end closed; remember which and keep the entry
            self.rio.chain[i].rwc_state = Some(match rwc_mode {
                RwcMode::Read => CloseMode::Read,
                _ => CloseMode::Write,
            });
            return Ok(());
        }

        self.rio.chain.remove(i);
        Ok(())
    }

    /// Flush every writable stream, ignoring per-stream failures.
    pub fn flush_all_ios(&mut self) {
        for k in [RioKind::Pipe, RioKind::File, RioKind::Console] {
            if let Ok(mut handler) = self.take_handler(k) {
                for i in 0..self.rio.chain.len() {
                    if self.rio.chain[i].kind == k && self.rio.chain[i].mask_write {
                        let _ = handler.flush(&mut self.rio.chain[i]);
                    }
                }
                self.put_handler(k, handler);
            }
        }
    }

    /// Close everything left on the chain.
    pub fn clear_all_ios(&mut self) {
        while let Some(mut arg) = self.rio.chain.pop() {
            let kind = arg.kind;
            if let Ok(mut handler) = self.take_handler(kind) {
                arg.rwc_mode = RwcMode::Full;
                let _ = handler.close(&mut arg);
                self.put_handler(kind, handler);
            }
        }
    }

    /// Open stream count, mostly for tests and diagnostics.
    pub fn open_stream_count(&self) -> usize {
        self.rio.chain.len()
    }
}

impl<'h> Drop for Rtx<'h> {
    fn drop(&mut self) {
        self.clear_all_ios();
    }
}
