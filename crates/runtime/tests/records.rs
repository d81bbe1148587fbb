//! Record separation across the RS kinds.

mod common;

use common::{hawk_with_program, MemIo};
use hawk_compiler::ast::InType;
use hawk_compiler::GblId;
use hawk_core::{ErrorKind, Value};
use hawk_regex::{CompileOpts, Regex};
use hawk_runtime::{Rtx, RioKind};

fn read_all(rtx: &mut Rtx<'_>) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    while rtx
        .read_record(InType::Console, "", &mut buf)
        .expect("read_record")
    {
        out.push(buf.clone());
    }
    out
}

fn console_rtx<'h>(hawk: &'h hawk_compiler::Hawk, input: &str) -> Rtx<'h> {
    let (io, _) = MemIo::new(&[input]);
    let mut rtx = Rtx::new(hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));
    rtx
}

#[test]
fn default_rs_splits_on_newline() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "one\ntwo\nthree");
    assert_eq!(read_all(&mut rtx), vec!["one", "two", "three"]);
}

#[test]
fn default_rs_strips_cr_before_lf() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "a\r\nb\r\nc");
    assert_eq!(read_all(&mut rtx), vec!["a", "b", "c"]);
}

#[test]
fn cr_split_across_chunks_is_still_stripped() {
    let hawk = hawk_with_program();
    // chunk size 2 puts the CR and LF of "ab\r\ncd" in different reads
    let (io, _) = MemIo::chunked(&["ab\r\ncd"], 2);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));
    assert_eq!(read_all(&mut rtx), vec!["ab", "cd"]);
}

#[test]
fn single_char_rs() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "aXbXc");
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str("X")).unwrap();
    assert_eq!(read_all(&mut rtx), vec!["a", "b", "c"]);
}

#[test]
fn regex_rs_takes_the_longest_match() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "aXYYYbXYc");
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str("XY+")).unwrap();
    assert_eq!(read_all(&mut rtx), vec!["a", "b", "c"]);
}

#[test]
fn regex_rs_defers_matches_touching_the_chunk_end() {
    let hawk = hawk_with_program();
    // tiny chunks force the separator to arrive piecewise
    let (io, _) = MemIo::chunked(&["aXYYYbXYc"], 2);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str("XY+")).unwrap();
    assert_eq!(read_all(&mut rtx), vec!["a", "b", "c"]);
}

#[test]
fn records_never_contain_the_separator() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "aXYYYbXYcXYYd");
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str("XY+")).unwrap();
    let re = Regex::compile("XY+", CompileOpts::default()).unwrap();
    for rec in read_all(&mut rtx) {
        assert!(
            re.exec_str(&rec, Default::default()).is_none(),
            "record {:?} contains the separator",
            rec
        );
    }
}

#[test]
fn paragraph_mode_splits_on_blank_lines() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "a\nb\n\nc\nd\n");
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str("")).unwrap();
    assert_eq!(read_all(&mut rtx), vec!["a\nb", "c\nd"]);
}

#[test]
fn paragraph_mode_skips_leading_blank_lines() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "\n\n\nfirst\n\nsecond\n");
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str("")).unwrap();
    assert_eq!(read_all(&mut rtx), vec!["first", "second"]);
}

#[test]
fn paragraph_mode_collapses_multiple_blank_lines() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "a\n\n\n\nb\n");
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str("")).unwrap();
    assert_eq!(read_all(&mut rtx), vec!["a", "b"]);
}

#[test]
fn eof_with_no_record_reports_end() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "");
    let mut buf = String::new();
    assert!(!rtx.read_record(InType::Console, "", &mut buf).unwrap());
    // a later read keeps reporting end of stream
    assert!(!rtx.read_record(InType::Console, "", &mut buf).unwrap());
}

#[test]
fn byte_records_split_like_text() {
    let hawk = hawk_with_program();
    let (io, _) = MemIo::new(&["x1\nx2\nx3"]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));
    let mut buf = Vec::new();
    let mut records = Vec::new();
    while rtx.read_bytes_record(InType::Console, "", &mut buf).unwrap() {
        records.push(buf.clone());
    }
    assert_eq!(records, vec![b"x1".to_vec(), b"x2".to_vec(), b"x3".to_vec()]);
}

#[test]
fn byte_regex_rs() {
    let hawk = hawk_with_program();
    let (io, _) = MemIo::new(&["aXYYbXYc"]);
    let mut rtx = Rtx::new(&hawk).unwrap();
    rtx.set_rio_handler(RioKind::Console, Box::new(io));
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str("XY+")).unwrap();
    let mut buf = Vec::new();
    let mut records = Vec::new();
    while rtx.read_bytes_record(InType::Console, "", &mut buf).unwrap() {
        records.push(String::from_utf8(buf.clone()).unwrap());
    }
    assert_eq!(records, vec!["a", "b", "c"]);
}

#[test]
fn streams_lock_to_their_first_mode() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "line\nrest\n");
    let mut buf = String::new();
    assert!(rtx.read_record(InType::Console, "", &mut buf).unwrap());
    let mut bbuf = Vec::new();
    let err = rtx
        .read_bytes_record(InType::Console, "", &mut bbuf)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Perm);
}

#[test]
fn missing_handler_is_an_iouser_error() {
    let hawk = hawk_with_program();
    let mut rtx = Rtx::new(&hawk).unwrap();
    let mut buf = String::new();
    let err = rtx.read_record(InType::Console, "", &mut buf).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IoUser);
}

#[test]
fn rs_change_between_reads_is_honored() {
    let hawk = hawk_with_program();
    let mut rtx = console_rtx(&hawk, "a;b\nc");
    rtx.set_gbl_by_id(GblId::Rs, rtx.heap().make_str(";")).unwrap();
    let mut buf = String::new();
    assert!(rtx.read_record(InType::Console, "", &mut buf).unwrap());
    assert_eq!(buf, "a");
    rtx.set_gbl_by_id(GblId::Rs, Value::Nil).unwrap();
    assert!(rtx.read_record(InType::Console, "", &mut buf).unwrap());
    assert_eq!(buf, "b");
    assert!(rtx.read_record(InType::Console, "", &mut buf).unwrap());
    assert_eq!(buf, "c");
}
