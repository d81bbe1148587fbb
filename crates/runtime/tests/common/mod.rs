//! Shared test doubles: an in-memory record-I/O handler and a context
//! builder.

use std::cell::RefCell;
use std::rc::Rc;

use hawk_compiler::{Hawk, StringSource};
use hawk_core::HawkError;
use hawk_runtime::{RioArg, RioHandler, RwcMode};

/// Everything the handler observed, inspectable after the fact.
#[derive(Default)]
pub struct IoLog {
    pub opens: usize,
    pub closes: usize,
    pub close_modes: Vec<RwcMode>,
    pub written: String,
    pub written_bytes: Vec<u8>,
    pub flushes: usize,
}

/// In-memory handler: serves `inputs` sequentially (one per `next`
/// rotation) and captures writes.
pub struct MemIo {
    inputs: Vec<String>,
    cur: usize,
    pos: usize,
    /// Max units per read, to exercise chunk boundaries.
    chunk: usize,
    pub log: Rc<RefCell<IoLog>>,
}

impl MemIo {
    pub fn new(inputs: &[&str]) -> (MemIo, Rc<RefCell<IoLog>>) {
        let log = Rc::new(RefCell::new(IoLog::default()));
        (
            MemIo {
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                cur: 0,
                pos: 0,
                chunk: usize::MAX,
                log: Rc::clone(&log),
            },
            log,
        )
    }

    pub fn chunked(inputs: &[&str], chunk: usize) -> (MemIo, Rc<RefCell<IoLog>>) {
        let (mut io, log) = MemIo::new(inputs);
        io.chunk = chunk;
        (io, log)
    }

    fn cur_chars(&self) -> Vec<char> {
        self.inputs
            .get(self.cur)
            .map(|s| s.chars().collect())
            .unwrap_or_default()
    }
}

impl RioHandler for MemIo {
    fn open(&mut self, _arg: &mut RioArg) -> Result<(), HawkError> {
        self.log.borrow_mut().opens += 1;
        Ok(())
    }

    fn close(&mut self, arg: &mut RioArg) -> Result<(), HawkError> {
        let mut log = self.log.borrow_mut();
        log.closes += 1;
        log.close_modes.push(arg.rwc_mode);
        Ok(())
    }

    fn read(&mut self, _arg: &mut RioArg, buf: &mut [char]) -> Result<usize, HawkError> {
        let chars = self.cur_chars();
        let n = buf.len().min(self.chunk).min(chars.len() - self.pos.min(chars.len()));
        buf[..n].copy_from_slice(&chars[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn read_bytes(&mut self, _arg: &mut RioArg, buf: &mut [u8]) -> Result<usize, HawkError> {
        let bytes: Vec<u8> = self
            .inputs
            .get(self.cur)
            .map(|s| s.bytes().collect())
            .unwrap_or_default();
        let n = buf.len().min(self.chunk).min(bytes.len() - self.pos.min(bytes.len()));
        buf[..n].copy_from_slice(&bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, _arg: &mut RioArg, data: &str) -> Result<usize, HawkError> {
        self.log.borrow_mut().written.push_str(data);
        Ok(data.len())
    }

    fn write_bytes(&mut self, _arg: &mut RioArg, data: &[u8]) -> Result<usize, HawkError> {
        self.log.borrow_mut().written_bytes.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self, _arg: &mut RioArg) -> Result<(), HawkError> {
        self.log.borrow_mut().flushes += 1;
        Ok(())
    }

    fn next(&mut self, _arg: &mut RioArg) -> Result<bool, HawkError> {
        if self.cur + 1 < self.inputs.len() {
            self.cur += 1;
            self.pos = 0;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// An interpreter with an empty parsed program, ready for a context.
/// Also wires up tracing so `RUST_LOG` works when debugging a test.
pub fn hawk_with_program() -> Hawk {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let mut hawk = Hawk::new();
    let mut io = StringSource::new("BEGIN { }\n");
    hawk.parse(&mut io).expect("trivial program parses");
    hawk
}
