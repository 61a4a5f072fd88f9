// Package ledger bitmask: status bits in the low half, failure code in bits 16..24

pub const PATCH: u32 = 1 << 0;
pub const NOCHECK: u32 = 1 << 1;
pub const OLDCONFIG: u32 = 1 << 2;
pub const QEMU: u32 = 1 << 3;
pub const HASLOG: u32 = 1 << 4;
pub const SKIPPGP: u32 = 1 << 5;
pub const SKIPHASH: u32 = 1 << 6;
pub const TESTING: u32 = 1 << 7;
pub const STAGING: u32 = 1 << 8;
pub const FAIL: u32 = 1 << 15;

pub const ERROR_SHIFT: u32 = 16;
pub const ERROR_MASK: u32 = 0xFF << ERROR_SHIFT;

/// Set on every row touched by a sync pass; rows still lacking it are swept
pub const SYNC_MARK: u32 = 1 << 30;

/// Name to bit table, in display order
pub const BIT_NAMES: &[(&str, u32)] = &[
    ("patch", PATCH),
    ("nocheck", NOCHECK),
    ("oldconfig", OLDCONFIG),
    ("qemu", QEMU),
    ("haslog", HASLOG),
    ("skippgp", SKIPPGP),
    ("skiphash", SKIPHASH),
    ("testing", TESTING),
    ("staging", STAGING),
    ("fail", FAIL),
];

pub fn bit_by_name(name: &str) -> Option<u32> {
    BIT_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, bit)| *bit)
}

/// Parse a comma-separated list of bit names into a mask
///
/// Empty input yields 0. Unknown names are an error naming the offender.
pub fn parse_bits(list: &str) -> Result<u32, String> {
    let mut mask = 0;
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        mask |= bit_by_name(name).ok_or_else(|| format!("Unknown bit name: '{}'", name))?;
    }
    Ok(mask)
}

/// Names of the bits set in a mask, in table order
pub fn bit_names(flags: u32) -> Vec<&'static str> {
    BIT_NAMES
        .iter()
        .filter(|(_, bit)| flags & bit != 0)
        .map(|(name, _)| *name)
        .collect()
}

pub fn error_code(flags: u32) -> u8 {
    ((flags & ERROR_MASK) >> ERROR_SHIFT) as u8
}

pub fn is_failed(flags: u32) -> bool {
    flags & FAIL != 0
}

/// Relative update: `(old | add) & !remove`
///
/// A result without the fail bit never keeps an error code.
pub fn apply(old: u32, add: u32, remove: u32) -> u32 {
    let mut new = (old | add) & !remove;
    if remove & FAIL != 0 || new & FAIL == 0 {
        new &= !ERROR_MASK;
    }
    new
}

/// A pending change to a ledger row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagDelta {
    pub add: u32,
    pub remove: u32,
}

impl FlagDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, bits: u32) -> Self {
        self.add |= bits;
        self.remove &= !bits;
        self
    }

    pub fn clear(mut self, bits: u32) -> Self {
        self.remove |= bits;
        self.add &= !bits;
        self
    }

    /// Mark the row failed with `code`, replacing any earlier code
    pub fn with_failure(self, code: u8) -> Self {
        let code_bits = (code as u32) << ERROR_SHIFT;
        let mut delta = self.set(FAIL | code_bits);
        delta.remove |= ERROR_MASK & !code_bits;
        delta
    }

    /// Clear the fail bit and the error code
    pub fn success(self) -> Self {
        self.clear(FAIL | ERROR_MASK)
    }

    pub fn apply(&self, old: u32) -> u32 {
        apply(old, self.add, self.remove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bits() {
        assert_eq!(parse_bits("patch,nocheck").unwrap(), PATCH | NOCHECK);
        assert_eq!(parse_bits(" qemu , FAIL ").unwrap(), QEMU | FAIL);
        assert_eq!(parse_bits("").unwrap(), 0);
        assert!(parse_bits("patch,bogus").unwrap_err().contains("bogus"));
    }

    #[test]
    fn test_bit_names() {
        assert_eq!(bit_names(PATCH | HASLOG | FAIL | (3 << ERROR_SHIFT)), vec!["patch", "haslog", "fail"]);
        assert!(bit_names(0).is_empty());
    }

    #[test]
    fn test_clearing_fail_clears_code() {
        let old = FAIL | HASLOG | (8 << ERROR_SHIFT);
        let new = apply(old, 0, FAIL);
        assert_eq!(new, HASLOG);
        assert_eq!(error_code(new), 0);
    }

    #[test]
    fn test_code_without_fail_is_dropped() {
        assert_eq!(apply(0, 5 << ERROR_SHIFT, 0), 0);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let once = apply(PATCH | FAIL | (4 << ERROR_SHIFT), QEMU, PATCH);
        let twice = apply(once, QEMU, PATCH);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_with_failure_replaces_code() {
        let old = FAIL | (0x0F << ERROR_SHIFT);
        let new = FlagDelta::new().with_failure(8).apply(old);
        assert!(is_failed(new));
        assert_eq!(error_code(new), 8);
    }

    #[test]
    fn test_success_after_failure() {
        let old = FAIL | PATCH | (3 << ERROR_SHIFT);
        let new = FlagDelta::new().set(HASLOG).success().apply(old);
        assert_eq!(new, PATCH | HASLOG);
    }
}
