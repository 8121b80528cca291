use std::sync::atomic::{AtomicU16, Ordering};

/// A connection's 16-bit permission bitmask. Handler gates read it from
/// the tick thread while user code may query it from anywhere, so all
/// operations are atomic. Bits are only ever set by a successful control
/// handler or by explicit user calls.
pub struct PermissionFlags(AtomicU16);

impl PermissionFlags {
    pub fn new(initial: u16) -> Self {
        Self(AtomicU16::new(initial))
    }

    pub fn load(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }

    /// Whether every bit of `required` is currently set.
    pub fn meets(&self, required: u16) -> bool {
        self.load() & required == required
    }

    pub fn set_bit(&self, bit: u8) {
        if bit < 16 {
            self.0.fetch_or(1 << bit, Ordering::Relaxed);
        }
    }

    pub fn clear_bit(&self, bit: u8) {
        if bit < 16 {
            self.0.fetch_and(!(1 << bit), Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for PermissionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PermissionFlags({:#06x})", self.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_bits() {
        let flags = PermissionFlags::new(0);

        flags.set_bit(0);
        flags.set_bit(3);
        assert_eq!(flags.load(), 0b1001);

        flags.clear_bit(0);
        assert_eq!(flags.load(), 0b1000);

        flags.clear_bit(7);
        assert_eq!(flags.load(), 0b1000);
    }

    #[test]
    fn meets_requires_all_bits() {
        let flags = PermissionFlags::new(0b0101);

        assert!(flags.meets(0));
        assert!(flags.meets(0b0001));
        assert!(flags.meets(0b0101));
        assert!(!flags.meets(0b0111));
        assert!(!flags.meets(0b1000));
    }

    #[test]
    fn out_of_range_bit_is_ignored() {
        let flags = PermissionFlags::new(0);
        flags.set_bit(16);
        flags.set_bit(200);
        assert_eq!(flags.load(), 0);
    }
}
