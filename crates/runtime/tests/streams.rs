//! Stream chain behavior: writing, flushing, closing, rotation.

mod common;

use common::{hawk_with_program, MemIo};
use hawk_compiler::ast::{InType, OutType};
use hawk_core::{ErrorKind, Value};
use hawk_runtime::{CloseMode, Rtx, RioKind, RwcMode};

#[test]
fn write_text_reaches_the_handler() {
    let hawk = hawk_with_program();
    let (io, log) = MemIo::new(&[]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::File, Box::new(io));
    assert!(rtx.write_io_text(OutType::File, "out.txt", "hello ").unwrap());
    assert!(rtx.write_io_text(OutType::File, "out.txt", "world").unwrap());
    assert_eq!(log.borrow().written, "hello world");
    // one stream, opened once
    assert_eq!(log.borrow().opens, 1);
    assert_eq!(rtx.open_stream_count(), 1);
}

#[test]
fn write_value_dispatches_on_type() {
    let hawk = hawk_with_program();
    let (io, log) = MemIo::new(&[]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));

    rtx.write_io_value(OutType::Console, "", &Value::Int(14)).unwrap();
    rtx.write_io_value(OutType::Console, "", &rtx.heap().make_str("|")).unwrap();
    rtx.write_io_value(OutType::Console, "", &Value::Char('x')).unwrap();
    assert_eq!(log.borrow().written, "14|x");

    rtx.write_io_value(OutType::Console, "", &Value::ByteChar(b'!')).unwrap();
    rtx.write_io_value(OutType::Console, "", &rtx.heap().make_mbs(b"ab".to_vec()))
        .unwrap();
    assert_eq!(log.borrow().written_bytes, b"!ab");
}

#[test]
fn floats_print_with_ofmt() {
    let hawk = hawk_with_program();
    let (io, log) = MemIo::new(&[]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));
    rtx.set_gbl_by_id(hawk_compiler::GblId::Ofmt, rtx.heap().make_str("%.2f"))
        .unwrap();
    rtx.write_io_value(OutType::Console, "", &Value::Flt(3.14159)).unwrap();
    assert_eq!(log.borrow().written, "3.14");
}

#[test]
fn flush_named_and_all() {
    let hawk = hawk_with_program();
    let (io, log) = MemIo::new(&[]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::File, Box::new(io));
    rtx.write_io_text(OutType::File, "a.txt", "x").unwrap();
    rtx.write_io_text(OutType::File, "b.txt", "y").unwrap();

    rtx.flush_io(OutType::File, Some("a.txt")).unwrap();
    assert_eq!(log.borrow().flushes, 1);
    rtx.flush_io(OutType::File, None).unwrap();
    assert_eq!(log.borrow().flushes, 3);

    let err = rtx.flush_io(OutType::File, Some("zzz")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IoNameNotFound);
}

#[test]
fn every_open_gets_exactly_one_close() {
    let hawk = hawk_with_program();
    let (io, log) = MemIo::new(&["data\n"]);
    {
        let mut rtx = Rtx::new(&hawk).unwrap();
        rtx.set_rio_handler(RioKind::File, Box::new(io));
        let mut buf = String::new();
        rtx.read_record(InType::File, "in.txt", &mut buf).unwrap();
        rtx.close_io("in.txt", None).unwrap();
        assert_eq!(log.borrow().closes, 1);
        // a second close finds nothing
        assert_eq!(
            rtx.close_io("in.txt", None).unwrap_err().kind,
            ErrorKind::IoNameNotFound
        );
    }
    let log = log.borrow();
    assert_eq!(log.opens, 1);
    assert_eq!(log.closes, 1);
}

#[test]
fn dropping_the_context_closes_leftover_streams() {
    let hawk = hawk_with_program();
    let (io, log) = MemIo::new(&[]);
    {
        let mut rtx = Rtx::new(&hawk).unwrap();
        rtx.set_rio_handler(RioKind::File, Box::new(io));
        rtx.write_io_text(OutType::File, "out.txt", "x").unwrap();
        assert_eq!(log.borrow().closes, 0);
    }
    assert_eq!(log.borrow().closes, 1);
}

#[test]
fn two_way_pipe_closes_in_halves() {
    let hawk = hawk_with_program();
    let (io, log) = MemIo::new(&["reply\n"]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Pipe, Box::new(io));

    // open through a read on the two-way pipe
    let mut buf = String::new();
    rtx.read_record(InType::RwPipe, "cmd", &mut buf).unwrap();
    assert_eq!(buf, "reply");

    // closing the write end keeps the stream for reading
    rtx.close_io("cmd", Some(CloseMode::Write)).unwrap();
    assert_eq!(rtx.open_stream_count(), 1);
    assert_eq!(log.borrow().close_modes, vec![RwcMode::Write]);

    // closing the read end finishes it off
    rtx.close_io("cmd", Some(CloseMode::Read)).unwrap();
    assert_eq!(rtx.open_stream_count(), 0);
    assert_eq!(log.borrow().closes, 2);
    assert_eq!(
        log.borrow().close_modes,
        vec![RwcMode::Write, RwcMode::Full]
    );
}

#[test]
fn next_input_rotates_console_files() {
    let hawk = hawk_with_program();
    let (io, _) = MemIo::new(&["a1\na2\n", "b1\n"]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));

    let mut records = Vec::new();
    let mut buf = String::new();
    loop {
        if rtx.read_record(InType::Console, "", &mut buf).unwrap() {
            records.push(buf.clone());
            continue;
        }
        // end of the current file: rotate or finish
        if !rtx.next_io_read(InType::Console, "").unwrap() {
            break;
        }
    }
    assert_eq!(records, vec!["a1", "a2", "b1"]);

    // the chain entry survives rotation but is exhausted now
    assert!(!rtx.next_io_read(InType::Console, "").unwrap());
}

#[test]
fn append_and_truncate_share_one_stream_per_name() {
    let hawk = hawk_with_program();
    let (io, log) = MemIo::new(&[]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::File, Box::new(io));
    rtx.write_io_text(OutType::ApFile, "t.log", "one").unwrap();
    // `>` after `>>` reuses the open handle
    rtx.write_io_text(OutType::File, "t.log", "two").unwrap();
    assert_eq!(log.borrow().opens, 1);
    assert_eq!(log.borrow().written, "onetwo");
}

#[test]
fn halted_context_refuses_io() {
    let hawk = hawk_with_program();
    let (io, _) = MemIo::new(&["x\n"]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));
    hawk.halt_flag().store(true, std::sync::atomic::Ordering::Relaxed);
    let mut buf = String::new();
    let err = rtx.read_record(InType::Console, "", &mut buf).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeHalted);
}
