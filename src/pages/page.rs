use zerocopy::little_endian::U32;
use zerocopy_derive::*;

/// Identifies a logical page in the backing store.
///
/// Page ids are stored little-endian so they can be embedded in on-disk
/// structures as-is.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PageId(U32);

impl PartialOrd for PageId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PageId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.get().cmp(&other.get())
    }
}

impl PageId {
    pub fn new(page_id: u32) -> Self {
        Self(U32::new(page_id))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }

    pub fn set(&mut self, page_id: u32) {
        self.0.set(page_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_id_is_totally_ordered() {
        let mut ids = [PageId::new(7), PageId::new(0), PageId::new(3)];
        ids.sort();
        assert_eq!(ids, [PageId::new(0), PageId::new(3), PageId::new(7)]);
    }
}
