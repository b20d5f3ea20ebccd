//! Digit decomposition of attested values.
//!
//! Digits are ordered most-significant first. The same order is used for the
//! announcement nonces, the attestation signatures and the published values,
//! so `values[i]` is always signed with the nonce at `nonces[i]`.

/// Decompose `value` into `length` base-`base` digits, most significant first.
///
/// Short results are left-padded with `"0"`. Values wider than `length`
/// digits are not truncated; callers clamp with [`max_value`] first.
pub fn decompose(value: u64, base: u16, length: usize) -> Vec<String> {
    let base = u64::from(base.max(2));
    let mut digits = Vec::with_capacity(length);
    let mut rest = value;
    while rest > 0 {
        digits.push((rest % base).to_string());
        rest /= base;
    }
    while digits.len() < length {
        digits.push("0".to_string());
    }
    digits.reverse();
    digits
}

/// Evaluate a most-significant-first digit sequence.
///
/// Returns `None` if a digit is not a number below `base` or the result
/// overflows.
pub fn compose<S: AsRef<str>>(digits: &[S], base: u16) -> Option<u64> {
    let base = u64::from(base);
    digits.iter().try_fold(0u64, |acc, digit| {
        let d: u64 = digit.as_ref().parse().ok()?;
        if d >= base {
            return None;
        }
        acc.checked_mul(base)?.checked_add(d)
    })
}

/// Largest value representable with `nb_digits` digits: `base^nb_digits - 1`.
///
/// Saturates at `u64::MAX`.
pub fn max_value(base: u16, nb_digits: u16) -> u64 {
    u64::from(base)
        .checked_pow(u32::from(nb_digits))
        .map(|n| n.saturating_sub(1))
        .unwrap_or(u64::MAX)
}
