//! Record composition and decomposition.
//!
//! `$0` and the field vector move in lockstep: writing `$0` re-splits it
//! by `FS`, writing `$n` rebuilds `$0` by joining the fields with `OFS`,
//! and `NF` follows both. Splitting honours the `FS` kinds: nil or a
//! single space splits on whitespace runs, an empty string makes every
//! character a field, a single character splits exactly, a five-character
//! `?LRTE` value applies quoted fielding, and anything else is a regex.

use std::rc::Rc;

use hawk_compiler::GblId;
use hawk_core::{ErrorKind, HawkError, Rex, StrCtx, Trait, Value};
use hawk_regex::ExecOpts;

use crate::Rtx;

impl<'h> Rtx<'h> {
    /// Current `$0` text.
    pub fn record(&self) -> &str {
        &self.inrec.line
    }

    /// Current `$0` as a value.
    pub fn record_value(&self) -> &Value {
        &self.inrec.d0
    }

    /// Number of fields, `NF`.
    pub fn field_count(&self) -> usize {
        self.inrec.fields.len()
    }

    /// `$idx`; index 0 is the whole record, out-of-range fields are nil.
    pub fn field(&self, idx: usize) -> Value {
        if idx == 0 {
            return self.inrec.d0.clone();
        }
        self.inrec
            .fields
            .get(idx - 1)
            .cloned()
            .unwrap_or(Value::Nil)
    }

    /// Replace the whole record and split it into fields.
    pub fn set_record(&mut self, text: &str, prefer_number: bool) -> Result<(), HawkError> {
        self.clear_record(false)?;
        self.inrec.line = text.to_string();
        if let Err(e) = self.split_record(prefer_number) {
            let _ = self.clear_record(false);
            return Err(e);
        }
        self.inrec.d0 = if prefer_number {
            self.heap().make_num_or_str(text)
        } else {
            self.heap().make_nstr(text)
        };
        Ok(())
    }

    /// Assign a field. Index 0 replaces `$0` and re-splits; a positive
    /// index replaces `$n`, growing the field vector with empty strings
    /// when `n > NF`, and recomposes `$0`.
    pub fn set_field(
        &mut self,
        idx: usize,
        text: &str,
        prefer_number: bool,
    ) -> Result<(), HawkError> {
        if idx == 0 {
            return self.set_record(text, prefer_number);
        }
        self.recomp_fields(idx, text, prefer_number)?;
        self.inrec.d0 = self.heap().make_str(self.inrec.line.clone());
        Ok(())
    }

    /// Drop fields beyond `n` and rebuild `$0` from the survivors.
    pub fn truncate_fields(&mut self, n: usize) -> Result<(), HawkError> {
        let nflds = self.inrec.fields.len();
        if n > nflds {
            return Err(HawkError::with_msg(
                ErrorKind::Invalid,
                "cannot truncate to more fields than exist",
            ));
        }
        let ofs = self.ofs_text()?;
        let fmts = self.num_fmts();
        let mut line = String::new();
        for (i, f) in self.inrec.fields[..n].iter().enumerate() {
            if i > 0 {
                line.push_str(&ofs);
            }
            line.push_str(&f.to_text(&fmts, StrCtx::Convert)?);
        }
        self.inrec.fields.truncate(n);
        self.inrec.d0 = self.heap().make_str(line.clone());
        self.inrec.line = line;
        self.set_gbl_raw(GblId::Nf as usize, Value::Int(n as i64));
        Ok(())
    }

    /// Reset the record state; `NF` becomes zero.
    pub fn clear_record(&mut self, keep_line: bool) -> Result<(), HawkError> {
        self.inrec.d0 = Value::Nil;
        self.inrec.fields.clear();
        if !keep_line {
            self.inrec.line.clear();
        }
        self.set_gbl_raw(GblId::Nf as usize, Value::Int(0));
        Ok(())
    }

    // ------------------------------------------------------------------
    // splitting

    fn split_record(&mut self, prefer_number: bool) -> Result<(), HawkError> {
        debug_assert!(self.inrec.fields.is_empty());
        if self.inrec.line.is_empty() {
            self.set_gbl_raw(GblId::Nf as usize, Value::Int(0));
            return Ok(());
        }

        let fs = self.gbl_text(GblId::Fs)?;
        let chars: Vec<char> = self.inrec.line.chars().collect();

        let texts: Vec<String> = match fs.as_deref() {
            Some(s) if s.len() == 5 && s.starts_with('?') => {
                let spec: Vec<char> = s.chars().collect();
                split_fielding(&chars, spec[1], spec[2], spec[3], spec[4])
            }
            None | Some(" ") => split_default(&chars),
            Some("") => chars.iter().map(|c| c.to_string()).collect(),
            Some(s) if s.chars().count() == 1 => {
                let d = s.chars().next().expect("one char");
                if d.is_whitespace() {
                    split_default(&chars)
                } else {
                    split_char(&chars, d)
                }
            }
            Some(s) => {
                let rex = self.fs_regex(s)?;
                self.split_by_regex(&rex, &chars)?
            }
        };

        let n = texts.len();
        self.inrec.fields = texts
            .into_iter()
            .map(|t| {
                if prefer_number {
                    self.heap().make_num_or_str(&t)
                } else {
                    self.heap().make_str(t)
                }
            })
            .collect();
        self.set_gbl_raw(GblId::Nf as usize, Value::Int(n as i64));
        Ok(())
    }

    fn fs_regex(&self, src: &str) -> Result<Rc<Rex>, HawkError> {
        {
            let cache = self.fs_rex.borrow();
            if let Some((s, r)) = &*cache {
                if s == src {
                    return Ok(Rc::clone(r));
                }
            }
        }
        let bounds = self.hawk().opts().traits.contains(Trait::REX_BOUND);
        let Value::Rex(rex) = self.heap().make_rex(src, bounds)? else {
            unreachable!("make_rex returns a regex value");
        };
        *self.fs_rex.borrow_mut() = Some((src.to_string(), Rc::clone(&rex)));
        Ok(rex)
    }

    /// Regex field splitting. Empty edge fields produced by an all-space
    /// separator match are dropped when record-space stripping is in
    /// force.
    fn split_by_regex(&self, rex: &Rc<Rex>, chars: &[char]) -> Result<Vec<String>, HawkError> {
        let re = rex.select(self.ignorecase());
        let mut fields: Vec<(usize, usize)> = Vec::new();
        let mut seps: Vec<(usize, usize)> = Vec::new();
        let mut start = 0usize;
        let mut pos = 0usize;
        while pos <= chars.len() {
            let opts = ExecOpts {
                notbol: pos > 0,
                ..Default::default()
            };
            let Some(caps) = re.exec(&chars[pos..], opts) else {
                break;
            };
            let (so, eo) = caps.whole();
            if eo == so {
                // a zero-width separator cannot split anything
                pos += so + 1;
                continue;
            }
            fields.push((start, pos + so));
            seps.push((pos + so, pos + eo));
            start = pos + eo;
            pos = start;
        }
        fields.push((start, chars.len()));

        if self.strip_rec_spc() {
            let all_space =
                |&(s, e): &(usize, usize)| chars[s..e].iter().all(|c| c.is_whitespace());
            if fields.len() > 1 && fields[0].0 == fields[0].1 && seps.first().is_some_and(|s| all_space(s))
            {
                fields.remove(0);
            }
            if fields.len() > 1
                && fields.last().map_or(false, |&(s, e)| s == e)
                && seps.last().is_some_and(|s| all_space(s))
            {
                fields.pop();
            }
        }

        Ok(fields
            .iter()
            .map(|&(s, e)| chars[s..e].iter().collect())
            .collect())
    }

    /// The `STRIPRECSPC` global overrides the trait bit when set to a
    /// number.
    fn strip_rec_spc(&self) -> bool {
        match self.gbl_by_id(GblId::Striprecspc) {
            Value::Nil => self.hawk().opts().traits.contains(Trait::STRIP_REC_SPC),
            v => match v.to_num(true) {
                Ok(n) => n.as_f64() > 0.0,
                Err(_) => false,
            },
        }
    }

    fn ofs_text(&self) -> Result<String, HawkError> {
        Ok(self.gbl_text(GblId::Ofs)?.unwrap_or_else(|| " ".to_string()))
    }

    /// Rebuild the record around an assignment to `$lv`.
    fn recomp_fields(
        &mut self,
        lv: usize,
        text: &str,
        prefer_number: bool,
    ) -> Result<(), HawkError> {
        debug_assert!(lv > 0);
        let ofs = self.ofs_text()?;
        let fmts = self.num_fmts();
        let nflds = self.inrec.fields.len();
        let max = lv.max(nflds);

        let mut fields = std::mem::take(&mut self.inrec.fields);
        let mut line = String::new();
        let mut result = Ok(());
        for i in 0..max {
            if i > 0 {
                line.push_str(&ofs);
            }
            if i == lv - 1 {
                line.push_str(text);
                let v = if prefer_number {
                    self.heap().make_num_or_str(text)
                } else {
                    self.heap().make_str(text)
                };
                if i < nflds {
                    fields[i] = v;
                } else {
                    fields.push(v);
                }
            } else if i >= nflds {
                fields.push(self.heap().empty_str());
            } else {
                match fields[i].to_text(&fmts, StrCtx::Convert) {
                    Ok(t) => line.push_str(&t),
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
        }
        self.inrec.fields = fields;
        result?;
        self.inrec.line = line;
        self.set_gbl_raw(GblId::Nf as usize, Value::Int(max as i64));
        Ok(())
    }
}

/// Whitespace-run splitting with leading and trailing runs stripped.
fn split_default(chars: &[char]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for &c in chars {
        if c.is_whitespace() {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
        } else {
            cur.push(c);
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

/// Strict single-character splitting; empty fields survive.
fn split_char(chars: &[char], d: char) -> Vec<String> {
    let mut out = vec![String::new()];
    for &c in chars {
        if c == d {
            out.push(String::new());
        } else {
            out.last_mut().expect("non-empty").push(c);
        }
    }
    out
}

/// Quoted fielding for the `?LRTE` separator: `l`/`r` quote a field,
/// `t` terminates one, and `e` escapes the next character.
fn split_fielding(chars: &[char], l: char, r: char, t: char, e: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == e && i + 1 < chars.len() {
            cur.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if quoted {
            if c == r {
                quoted = false;
            } else {
                cur.push(c);
            }
        } else if c == l {
            quoted = true;
        } else if c == t {
            out.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
        i += 1;
    }
    out.push(cur);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_split_strips_edges() {
        let chars: Vec<char> = "  ab  cd \t ef ".chars().collect();
        assert_eq!(split_default(&chars), vec!["ab", "cd", "ef"]);
        assert!(split_default(&[]).is_empty());
    }

    #[test]
    fn char_split_keeps_empties() {
        let chars: Vec<char> = "a::b:".chars().collect();
        assert_eq!(split_char(&chars, ':'), vec!["a", "", "b", ""]);
    }

    #[test]
    fn fielding_handles_quotes_and_escapes() {
        let chars: Vec<char> = "[a|b]|c\\|d|e".chars().collect();
        assert_eq!(
            split_fielding(&chars, '[', ']', '|', '\\'),
            vec!["a|b", "c|d", "e"]
        );
    }

    #[test]
    fn fielding_without_quotes() {
        let chars: Vec<char> = "x|y||z".chars().collect();
        assert_eq!(
            split_fielding(&chars, '"', '"', '|', '\\'),
            vec!["x", "y", "", "z"]
        );
    }
}
