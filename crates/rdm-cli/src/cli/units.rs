//! Human byte sizes on the command line: `4096`, `512K`, `4M`, `1.5G`.

/// Parse a byte count with an optional binary suffix (K, M, G; optional trailing `B` or `iB`).
pub fn parse_size(s: &str) -> Result<u64, String> {
    let t = s.trim();
    let lower = t.to_ascii_lowercase();
    let digits = lower
        .trim_end_matches("ib")
        .trim_end_matches('b')
        .trim_end();
    let (number, shift) = match digits.chars().last() {
        Some('k') => (&digits[..digits.len() - 1], 10),
        Some('m') => (&digits[..digits.len() - 1], 20),
        Some('g') => (&digits[..digits.len() - 1], 30),
        _ => (digits, 0),
    };
    let number = number.trim();
    if number.is_empty() {
        return Err(format!("invalid size `{}`", s));
    }
    if let Ok(n) = number.parse::<u64>() {
        return n
            .checked_mul(1u64 << shift)
            .ok_or_else(|| format!("size `{}` is too large", s));
    }
    match number.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 => Ok((f * (1u64 << shift) as f64) as u64),
        _ => Err(format!("invalid size `{}`", s)),
    }
}
