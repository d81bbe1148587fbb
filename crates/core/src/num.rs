//! String-to-number scanning and number-to-string formatting.
//!
//! The scanner is strict: the whole input must be consumed for a
//! conversion to succeed. Formatting implements the printf `g`/`f`/`e`
//! conversions needed by `CONVFMT`/`OFMT`.

/// Result of a numeric conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Flt(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(v) => v as f64,
            Num::Flt(v) => v,
        }
    }
}

/// Scanner behavior knobs.
#[derive(Debug, Clone, Copy)]
pub struct ScanOpts {
    /// Permit surrounding whitespace.
    pub strip_spaces: bool,
    /// Recognise `0x`/`0b`/leading-zero octal integer prefixes.
    pub prefixes: bool,
}

/// Scan `s` as an integer or float. Returns `None` unless the entire
/// string (modulo permitted whitespace) is numeric.
pub fn scan_num(s: &str, opts: ScanOpts) -> Option<Num> {
    let t = if opts.strip_spaces { s.trim() } else { s };
    if t.is_empty() {
        return None;
    }
    let (neg, body) = match t.as_bytes()[0] {
        b'-' => (true, &t[1..]),
        b'+' => (false, &t[1..]),
        _ => (false, t),
    };
    if body.is_empty() {
        return None;
    }

    if opts.prefixes {
        if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            return radix_int(hex, 16, neg);
        }
        if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
            return radix_int(bin, 2, neg);
        }
        if body.len() > 1
            && body.starts_with('0')
            && body.bytes().all(|b| b.is_ascii_digit())
        {
            return radix_int(&body[1..], 8, neg);
        }
    }

    let is_float = body.contains(['.', 'e', 'E']);
    if is_float {
        let v: f64 = t.parse().ok()?;
        Some(Num::Flt(v))
    } else {
        radix_int(body, 10, neg)
    }
}

fn radix_int(digits: &str, radix: u32, neg: bool) -> Option<Num> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    match i64::from_str_radix(digits, radix) {
        Ok(v) => Some(Num::Int(if neg { -v } else { v })),
        // out of the i64 range: degrade to float
        Err(_) => {
            let mut acc = 0.0f64;
            for c in digits.chars() {
                acc = acc * radix as f64 + c.to_digit(radix).unwrap() as f64;
            }
            Some(Num::Flt(if neg { -acc } else { acc }))
        }
    }
}

/// The two-bit numeric-string hint carried by string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumStrHint {
    #[default]
    None,
    Int,
    Flt,
}

/// Classify `s` as a POSIX numeric string: optional surrounding blanks,
/// sign, digits, optional fraction and exponent. Hex and octal prefixes do
/// not count here.
pub fn numeric_str_hint(s: &str) -> NumStrHint {
    let t = s.trim_matches([' ', '\t']);
    let mut chars = t.chars().peekable();
    if matches!(chars.peek(), Some('+') | Some('-')) {
        chars.next();
    }
    let mut digits = 0usize;
    let mut dot = false;
    let mut exp = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            digits += 1;
            chars.next();
        } else if c == '.' && !dot && !exp {
            dot = true;
            chars.next();
        } else if (c == 'e' || c == 'E') && digits > 0 && !exp {
            exp = true;
            chars.next();
            if matches!(chars.peek(), Some('+') | Some('-')) {
                chars.next();
            }
            let mut exp_digits = 0;
            while matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                chars.next();
                exp_digits += 1;
            }
            if exp_digits == 0 {
                return NumStrHint::None;
            }
        } else {
            return NumStrHint::None;
        }
    }
    if digits == 0 {
        NumStrHint::None
    } else if dot || exp {
        NumStrHint::Flt
    } else {
        NumStrHint::Int
    }
}

/// Format a float per a `CONVFMT`/`OFMT`-style specification. Only the
/// `%.Ng`, `%.Nf`, and `%.Ne` shapes (and their upper-case variants) are
/// recognised; anything else falls back to `%.6g`.
pub fn format_float(fmt: &str, v: f64) -> String {
    let (prec, conv) = parse_spec(fmt).unwrap_or((6, 'g'));
    match conv {
        'f' => format!("{:.*}", prec, v),
        'e' => format_e(v, prec),
        'E' => format_e(v, prec).to_uppercase(),
        'G' => format_g(v, prec).to_uppercase(),
        _ => format_g(v, prec),
    }
}

fn parse_spec(fmt: &str) -> Option<(usize, char)> {
    let rest = fmt.strip_prefix('%')?;
    let conv = rest.chars().last()?;
    if !matches!(conv, 'g' | 'G' | 'f' | 'e' | 'E') {
        return None;
    }
    let middle = &rest[..rest.len() - 1];
    if middle.is_empty() {
        return Some((6, conv));
    }
    let prec_str = middle.strip_prefix('.')?;
    let prec: usize = if prec_str.is_empty() {
        0
    } else {
        prec_str.parse().ok()?
    };
    Some((prec.min(64), conv))
}

fn format_e(v: f64, prec: usize) -> String {
    normalize_exp(&format!("{:.*e}", prec, v))
}

/// C-style `%g`: pick fixed or exponential form by magnitude and strip
/// insignificant zeros.
fn format_g(v: f64, prec: usize) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let prec = prec.max(1);
    // exponent after rounding to `prec` significant digits
    let probe = format!("{:.*e}", prec - 1, v.abs());
    let exp: i32 = probe
        .split('e')
        .nth(1)
        .and_then(|e| e.parse().ok())
        .unwrap_or(0);
    if exp < -4 || exp >= prec as i32 {
        let s = format!("{:.*e}", prec - 1, v);
        let (mant, tail) = s.split_once('e').expect("exponent form");
        normalize_exp(&format!("{}e{}", strip_zeros(mant), tail))
    } else {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        strip_zeros(&format!("{:.*}", decimals, v))
    }
}

fn strip_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Rust renders `1.5e2`; C renders `1.5e+02`.
fn normalize_exp(s: &str) -> String {
    match s.split_once(['e', 'E']) {
        Some((mant, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp.trim_start_matches('+')),
            };
            format!("{}e{}{:0>2}", mant, sign, digits)
        }
        None => s.to_string(),
    }
}
