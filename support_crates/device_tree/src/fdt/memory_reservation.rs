use core::mem;
use thiserror_no_std::Error;

const ENTRY_SIZE: usize = mem::size_of::<u64>() * 2;

/// Physical range that the operating system must leave alone
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct MemoryReservationEntry {
    pub address: u64,
    pub size: u64,
}

impl MemoryReservationEntry {
    pub fn new(address: u64, size: u64) -> Self {
        Self { address, size }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let word = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_be_bytes(raw)
        };
        Self::new(word(0), word(8))
    }

    fn is_terminator(&self) -> bool {
        self.address == 0 && self.size == 0
    }
}

#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
pub enum MemoryReservationFormatError {
    #[error("reservation block does not start on an 8 byte boundary")]
    InvalidAlignment,
    #[error("reservation block cannot hold a single entry")]
    BufferTooSmall,
    #[error("reservation block has no all-zero terminating entry")]
    NoTerminator,
}

/// The list of reserved memory ranges that follows the header.
///
/// The slice ends right after the all-zero terminator, so relocating a blob can copy it as is.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MemoryReservationBlock<'buf> {
    buf: &'buf [u8],
}

impl<'buf> MemoryReservationBlock<'buf> {
    /// `buf` starts at the block and may run past its terminator
    pub(crate) fn from_buffer(buf: &'buf [u8]) -> Result<Self, MemoryReservationFormatError> {
        if buf.as_ptr() as usize % 8 != 0 {
            return Err(MemoryReservationFormatError::InvalidAlignment);
        }
        if buf.len() < ENTRY_SIZE {
            return Err(MemoryReservationFormatError::BufferTooSmall);
        }

        let terminator = buf
            .chunks_exact(ENTRY_SIZE)
            .position(|entry| MemoryReservationEntry::from_bytes(entry).is_terminator())
            .ok_or(MemoryReservationFormatError::NoTerminator)?;

        Ok(Self {
            buf: &buf[..(terminator + 1) * ENTRY_SIZE],
        })
    }

    /// The encoded block including its terminating entry
    pub fn as_bytes(&self) -> &'buf [u8] {
        self.buf
    }

    /// Number of reservations, not counting the terminator
    pub fn len(&self) -> usize {
        self.buf.len() / ENTRY_SIZE - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> impl Iterator<Item = MemoryReservationEntry> + 'buf {
        let count = self.len();
        self.buf
            .chunks_exact(ENTRY_SIZE)
            .take(count)
            .map(MemoryReservationEntry::from_bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    #[repr(C, align(8))]
    struct Block<const N: usize>([u8; N]);

    #[test]
    fn block_stops_after_the_terminator() {
        let mut raw = Block([0xaau8; 64]);
        raw.0[..8].copy_from_slice(&0x8000_0000u64.to_be_bytes());
        raw.0[8..16].copy_from_slice(&0x20_0000u64.to_be_bytes());
        raw.0[16..32].fill(0);

        let block = MemoryReservationBlock::from_buffer(&raw.0).unwrap();
        assert_eq!(block.len(), 1);
        assert_eq!(block.as_bytes(), &raw.0[..32]);
        assert_eq!(
            block.entries().collect::<Vec<_>>(),
            vec![MemoryReservationEntry::new(0x8000_0000, 0x20_0000)]
        )
    }

    #[test]
    fn unterminated_or_short_blocks_are_rejected() {
        let garbage = Block([0xaau8; 32]);
        assert_eq!(
            MemoryReservationBlock::from_buffer(&garbage.0),
            Err(MemoryReservationFormatError::NoTerminator)
        );
        let short = Block([0u8; 8]);
        assert_eq!(
            MemoryReservationBlock::from_buffer(&short.0),
            Err(MemoryReservationFormatError::BufferTooSmall)
        );
    }

    #[test]
    fn lone_terminator_is_an_empty_block() {
        let raw = Block([0u8; 16]);
        let block = MemoryReservationBlock::from_buffer(&raw.0).unwrap();
        assert!(block.is_empty());
        assert_eq!(block.entries().next(), None);
    }
}
