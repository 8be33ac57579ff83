//! Batches of tree operations that a reservation must cover.

/// The number of record inserts and deletes a caller is about to perform against a tree.
///
/// Each count is independent. The legacy packed form, which carried both counts in one 32-bit
/// word, can be decoded with [`Operations::from_packed`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct Operations {
    /// Number of record inserts.
    pub inserts: u32,
    /// Number of record deletes.
    pub deletes: u32,
}

const PACKED_FIELD_BITS: u32 = 16;
const PACKED_FIELD_MASK: u32 = (1 << PACKED_FIELD_BITS) - 1;

impl Operations {
    pub const fn new(inserts: u32, deletes: u32) -> Self {
        Operations { inserts, deletes }
    }

    /// A batch consisting only of inserts.
    pub const fn inserts(inserts: u32) -> Self {
        Operations::new(inserts, 0)
    }

    /// A batch consisting only of deletes.
    pub const fn deletes(deletes: u32) -> Self {
        Operations::new(0, deletes)
    }

    /// Decode the packed representation: inserts in the low 16 bits, deletes in the high 16.
    pub const fn from_packed(packed: u32) -> Self {
        Operations {
            inserts: packed & PACKED_FIELD_MASK,
            deletes: packed >> PACKED_FIELD_BITS,
        }
    }

    /// Encode into the packed representation.
    ///
    /// Returns `None` if either count does not fit into 16 bits.
    pub const fn to_packed(self) -> Option<u32> {
        if self.inserts > PACKED_FIELD_MASK || self.deletes > PACKED_FIELD_MASK {
            return None;
        }
        Some(self.inserts | (self.deletes << PACKED_FIELD_BITS))
    }

    pub const fn is_empty(&self) -> bool {
        self.inserts == 0 && self.deletes == 0
    }
}

#[cfg(test)]
mod tests {
    use super::Operations;

    #[test]
    fn packed_layout() {
        let ops = Operations::from_packed(0x0003_0007);
        assert_eq!(ops, Operations::new(7, 3));
        assert_eq!(ops.to_packed(), Some(0x0003_0007));
    }

    #[test]
    fn packed_rejects_wide_counts() {
        assert_eq!(Operations::inserts(1 << 16).to_packed(), None);
        assert_eq!(Operations::deletes(1 << 16).to_packed(), None);
        assert_eq!(Operations::new(0xffff, 0xffff).to_packed(), Some(u32::MAX));
    }

    #[test]
    fn empty() {
        assert!(Operations::default().is_empty());
        assert!(!Operations::deletes(1).is_empty());
    }
}
