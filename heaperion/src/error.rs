/// Errors that can occur during heap operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// No run of free blocks is long enough
    OutOfMemory,
    /// Alignment larger than a block
    InvalidAlignment,
    /// Zero-sized request, or a request longer than the longest encodable run
    InvalidSize,
    /// Pointer outside of the managed blocks, or not at the start of an allocation
    InvalidPointer,
    /// Pointer designates blocks that are already free
    DoubleFree,
    /// The region cannot hold its own bookkeeping plus one block
    RegionTooSmall,
    /// The allocator has not been given a region yet
    Uninitialized,
}

impl core::fmt::Display for HeapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "Out of memory"),
            Self::InvalidAlignment => write!(f, "Invalid alignment (must not exceed block size)"),
            Self::InvalidSize => write!(f, "Invalid size"),
            Self::InvalidPointer => write!(f, "Invalid pointer"),
            Self::DoubleFree => write!(f, "Double free detected"),
            Self::RegionTooSmall => write!(f, "Memory region too small"),
            Self::Uninitialized => write!(f, "Allocator not initialized"),
        }
    }
}
impl core::error::Error for HeapError {}

pub type Result<T> = core::result::Result<T, HeapError>;
