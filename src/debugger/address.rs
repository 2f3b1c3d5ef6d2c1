use std::fmt::{Display, Formatter};

/// Represent an address in a running program.
///
/// The subsystem works on already relocated (virtual address space)
/// addresses only, mapping between object-file and process addresses is the
/// debug-info collaborator's concern.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Default, PartialOrd, Ord)]
pub struct RelocatedAddress(usize);

impl RelocatedAddress {
    #[inline(always)]
    pub fn offset(self, offset: isize) -> RelocatedAddress {
        if offset >= 0 {
            self.0 + offset as usize
        } else {
            self.0 - offset.unsigned_abs()
        }
        .into()
    }

    /// Signed distance to `other`, used for stack offsets of watched
    /// locations.
    #[inline(always)]
    pub fn signed_distance_from(self, other: usize) -> i64 {
        self.0 as i64 - other as i64
    }

    #[inline(always)]
    pub fn as_u64(self) -> u64 {
        u64::from(self)
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        usize::from(self)
    }
}

impl From<usize> for RelocatedAddress {
    fn from(addr: usize) -> Self {
        RelocatedAddress(addr)
    }
}

impl From<u64> for RelocatedAddress {
    fn from(addr: u64) -> Self {
        RelocatedAddress(addr as usize)
    }
}

impl From<RelocatedAddress> for usize {
    fn from(addr: RelocatedAddress) -> Self {
        addr.0
    }
}

impl From<RelocatedAddress> for u64 {
    fn from(addr: RelocatedAddress) -> Self {
        addr.0 as u64
    }
}

impl Display for RelocatedAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#016X}", self.0))
    }
}
