//! Signal Names
//!
//! Expansion of the signal syntax used on wires, ports and terminals into one
//! name per bit:
//!
//! - `a, b, c`: comma separated list
//! - `5'4`: numeric constant, expanded MSB first into `vdd`/`gnd`
//! - `clk#3`: replication
//! - `d[7:0]`, `d[0:7:2]`: iteration, ascending or descending
//!
//! Anything else is a simple name and is lowercased.

use thiserror::Error;

/// Widest bus a single signal string may expand to.
pub const MAX_SIGNAL_WIDTH: usize = 1 << 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("Signal '{signal}' expands to more than {limit} bits")]
    TooWide { signal: String, limit: usize },
}

fn check_width(signal: &str, width: Option<u128>) -> Result<(), SignalError> {
    match width {
        Some(w) if w <= MAX_SIGNAL_WIDTH as u128 => Ok(()),
        _ => Err(SignalError::TooWide {
            signal: signal.to_string(),
            limit: MAX_SIGNAL_WIDTH,
        }),
    }
}

/// Expand a signal string into its per-bit names.
pub fn parse_signal(s: &str) -> Result<Vec<String>, SignalError> {
    let mut result = Vec::new();
    for sig in s.split(',') {
        let bits = parse_sig(sig.trim())?;
        check_width(s, Some(result.len() as u128 + bits.len() as u128))?;
        result.extend(bits);
    }
    Ok(result)
}

fn parse_sig(sig: &str) -> Result<Vec<String>, SignalError> {
    if let Some((value, size)) = parse_numeric_constant(sig) {
        check_width(sig, Some(u128::from(size)))?;
        return Ok(constant_bits(value, size));
    }

    // sig#count
    if let Some(pos) = sig.rfind('#') {
        let count = sig[pos + 1..].trim_start();
        if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) {
            let Ok(n) = count.parse::<usize>() else {
                return Ok(vec![sig.to_string()]);
            };
            let expansion = parse_sig(sig[..pos].trim())?;
            check_width(sig, (expansion.len() as u128).checked_mul(n as u128))?;
            return Ok(expansion.iter().cycle().take(expansion.len() * n).cloned().collect());
        }
    }

    // sig[start:stop] or sig[start:stop:step]
    if let Some((base, start, stop, step)) = parse_iteration(sig) {
        let expansion = parse_sig(base.trim())?;
        if expansion.is_empty() {
            return Ok(expansion);
        }
        let (start, stop) = (i128::from(start), i128::from(stop));
        let step = step
            .map(|s| i128::from(s).abs())
            .filter(|s| *s != 0)
            .unwrap_or(1);
        let count = (stop - start).abs() / step + 1;
        check_width(sig, (count as u128).checked_mul(expansion.len() as u128))?;
        let step = if stop < start { -step } else { step };
        let mut result = Vec::new();
        for k in 0..count {
            let index = start + k * step;
            for name in &expansion {
                result.push(format!("{}[{}]", name, index));
            }
        }
        return Ok(result);
    }

    if sig.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![sig.to_lowercase()])
    }
}

/// Split `base[start:stop(:step)]` into its parts.
fn parse_iteration(sig: &str) -> Option<(&str, i64, i64, Option<i64>)> {
    let body = sig.strip_suffix(']')?;
    let open = body.rfind('[')?;
    let fields: Vec<&str> = body[open + 1..].split(':').map(str::trim).collect();
    if fields.len() < 2 || fields.len() > 3 {
        return None;
    }
    let start = parse_signed_decimal(fields[0])?;
    let stop = parse_signed_decimal(fields[1])?;
    let step = match fields.get(2) {
        Some(f) => Some(parse_signed_decimal(f)?),
        None => None,
    };
    Some((&body[..open], start, stop, step))
}

fn parse_signed_decimal(s: &str) -> Option<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// `number'size`, where number is decimal, `0x` hex, `0b` binary or
/// leading-zero octal with an optional sign, and size is a positive decimal.
fn parse_numeric_constant(sig: &str) -> Option<(i64, u32)> {
    let (number, size) = sig.split_once('\'')?;
    if size.is_empty() || size.starts_with('0') || !size.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = parse_integer(number)?;
    let size: u32 = size.parse().ok()?;
    Some((value, size))
}

/// Bits of `value`, MSB first, sign-extended past bit 63.
fn constant_bits(value: i64, size: u32) -> Vec<String> {
    (0..size)
        .rev()
        .map(|i| {
            let bit = if (value >> i.min(63)) & 1 != 0 { "vdd" } else { "gnd" };
            bit.to_string()
        })
        .collect()
}

/// Integer literal with optional sign: `0x1f`, `0b101`, `017`, `42`.
pub fn parse_integer(s: &str) -> Option<i64> {
    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (digits, radix) = if let Some(hex) = body.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(bin) = body.strip_prefix("0b") {
        (bin, 2)
    } else if body.len() > 1 && body.starts_with('0') {
        (&body[1..], 8)
    } else {
        (body, 10)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Component and module names: empty, or `[A-Za-z_/][A-Za-z_/0-9]*`.
pub fn validate_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => true,
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '/' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
        }
        Some(_) => false,
    }
}

/// Comma separated list where each entry is a well-formed signal or a
/// numeric constant. The empty string is accepted.
pub fn validate_signal(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    name.split(',').map(str::trim).all(|n| {
        is_valid_signal(n) || parse_numeric_constant(n).is_some()
    })
}

fn is_valid_signal(s: &str) -> bool {
    let bytes = s.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return false,
    }
    let mut i = 1;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphanumeric() || b == b'_' {
            i += 1;
        } else if b == b'[' {
            let Some(close) = s[i..].find(']') else {
                return false;
            };
            let inner = &s[i + 1..i + close];
            let fields: Vec<&str> = inner.split(':').collect();
            if fields.len() > 3
                || fields
                    .iter()
                    .any(|f| f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()))
            {
                return false;
            }
            i += close + 1;
        } else if b == b'#' {
            let count = &s[i + 1..];
            return !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit());
        } else {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simple_and_list() {
        assert_eq!(parse_signal("A").unwrap(), names(&["a"]));
        assert_eq!(parse_signal("a, B ,c").unwrap(), names(&["a", "b", "c"]));
        assert!(parse_signal("").unwrap().is_empty());
    }

    #[test]
    fn test_iteration() {
        assert_eq!(parse_signal("d[3:0]").unwrap(), names(&["d[3]", "d[2]", "d[1]", "d[0]"]));
        assert_eq!(parse_signal("d[0:4:2]").unwrap(), names(&["d[0]", "d[2]", "d[4]"]));
        assert_eq!(parse_signal("d[4:0:2]").unwrap(), names(&["d[4]", "d[2]", "d[0]"]));
        assert_eq!(parse_signal("x[2:2]").unwrap(), names(&["x[2]"]));
        // single index is just a name
        assert_eq!(parse_signal("X[3]").unwrap(), names(&["x[3]"]));
    }

    #[test]
    fn test_nested_iteration() {
        assert_eq!(
            parse_signal("m[1:0][0:1]").unwrap(),
            names(&["m[1][0]", "m[0][0]", "m[1][1]", "m[0][1]"])
        );
    }

    #[test]
    fn test_replication() {
        assert_eq!(parse_signal("clk#3").unwrap(), names(&["clk", "clk", "clk"]));
        assert_eq!(parse_signal("a[1:0]#2").unwrap(), names(&["a[1]", "a[0]", "a[1]", "a[0]"]));
    }

    #[test]
    fn test_numeric_constants() {
        assert_eq!(parse_signal("5'4").unwrap(), names(&["gnd", "vdd", "gnd", "vdd"]));
        assert_eq!(parse_signal("0x3'3").unwrap(), names(&["gnd", "vdd", "vdd"]));
        assert_eq!(parse_signal("0b10'2").unwrap(), names(&["vdd", "gnd"]));
        assert_eq!(parse_signal("07'3").unwrap(), names(&["vdd", "vdd", "vdd"]));
        assert_eq!(parse_signal("-1'2").unwrap(), names(&["vdd", "vdd"]));
    }

    #[test]
    fn test_extreme_indices_do_not_overflow() {
        assert_eq!(
            parse_signal("d[9223372036854775807:9223372036854775807]").unwrap(),
            names(&["d[9223372036854775807]"])
        );
        assert_eq!(parse_signal("d[0:1:-9223372036854775808]").unwrap(), names(&["d[0]"]));
        assert_eq!(
            parse_signal("d[-9223372036854775808:-9223372036854775807]").unwrap(),
            names(&["d[-9223372036854775808]", "d[-9223372036854775807]"])
        );
    }

    #[test]
    fn test_oversized_expansions_are_rejected() {
        let too_wide = |s: &str| matches!(parse_signal(s), Err(SignalError::TooWide { .. }));
        assert!(too_wide("d[0:9223372036854775807]"));
        assert!(too_wide("clk#100000"));
        assert!(too_wide("a[255:0]#1000"));
        assert!(too_wide("1'4000000000"));
        assert!(too_wide("d[0:65535], e"));
        assert!(parse_signal("[0:9223372036854775807]").unwrap().is_empty());
        assert_eq!(parse_signal("d[0:65535]").unwrap().len(), MAX_SIGNAL_WIDTH);
        assert_eq!(
            parse_signal("x#99999999999999999999999").unwrap(),
            names(&["x#99999999999999999999999"])
        );
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-0x10"), Some(-16));
        assert_eq!(parse_integer("010"), Some(8));
        assert_eq!(parse_integer("0"), Some(0));
        assert_eq!(parse_integer("09"), None);
        assert_eq!(parse_integer("abc"), None);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name(""));
        assert!(validate_name("/gates/nand2"));
        assert!(validate_name("_u1"));
        assert!(!validate_name("1abc"));
        assert!(!validate_name("a b"));
    }

    #[test]
    fn test_validate_signal() {
        assert!(validate_signal(""));
        assert!(validate_signal("a, b[3:0], clk#2"));
        assert!(validate_signal("d[0:7:2]"));
        assert!(validate_signal("3'4"));
        assert!(!validate_signal("3a"));
        assert!(!validate_signal("a[x]"));
        assert!(!validate_signal("a#"));
    }
}
