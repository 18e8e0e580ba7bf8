//! Small utility helpers used across modules.

/// Slice of `text` from the first `{` to the last `}` inclusive.
/// The generator prints progress lines around its JSON payload, so the object is located
/// by its outermost braces rather than by parsing the whole stream.
pub fn extract_json_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  if end < start {
    return None;
  }
  Some(&text[start..=end])
}

/// Format with `digits` significant digits, switching to exponent notation for very
/// large or small magnitudes (same convention as JavaScript's `toPrecision`).
pub fn format_significant(value: f64, digits: usize) -> String {
  if !value.is_finite() {
    return value.to_string();
  }
  let digits = digits.max(1);
  // Round first through exponent notation so carries (9.9996 -> 1.000e1) settle the exponent.
  let sci = format!("{:.*e}", digits - 1, value);
  let exp: i32 = sci
    .rsplit_once('e')
    .and_then(|(_, e)| e.parse().ok())
    .unwrap_or(0);

  if exp < -6 || exp >= digits as i32 {
    let (mantissa, _) = sci.split_once('e').unwrap_or((sci.as_str(), ""));
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{}", exp.abs())
  } else {
    let decimals = (digits as i32 - 1 - exp).max(0) as usize;
    format!("{:.*}", decimals, value)
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge process output.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
