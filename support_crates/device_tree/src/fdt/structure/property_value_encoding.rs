use crate::fdt::NodeProperty;
use core::ffi::CStr;
use thiserror_no_std::Error;

/// Largest `#address-cells`/`#size-cells` value that is accepted
pub const MAX_CELLS: u32 = 4;

const CELL_SIZE: usize = 4;

#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
#[error("property value is not exactly one cell long")]
pub struct InvalidValueLength;

#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
pub enum StringError {
    #[error("string value lacks its NUL terminator")]
    NoNullTerminator,
    #[error("string value is not UTF-8")]
    Utf8Error,
}

fn decode_str(raw: &CStr) -> Result<&str, StringError> {
    raw.to_str().map_err(|_| StringError::Utf8Error)
}

/// A `<u32>` value such as `#address-cells`
impl<'buf> TryFrom<&NodeProperty<'buf>> for u32 {
    type Error = InvalidValueLength;

    fn try_from(property: &NodeProperty<'buf>) -> Result<Self, Self::Error> {
        <[u8; CELL_SIZE]>::try_from(property.value)
            .map(u32::from_be_bytes)
            .map_err(|_| InvalidValueLength)
    }
}

/// A `<string>` value, the terminator must be the last byte
impl<'buf> TryFrom<&NodeProperty<'buf>> for &'buf str {
    type Error = StringError;

    fn try_from(property: &NodeProperty<'buf>) -> Result<Self, Self::Error> {
        CStr::from_bytes_with_nul(property.value)
            .map_err(|_| StringError::NoNullTerminator)
            .and_then(decode_str)
    }
}

/// Read a value spanning `cells` big-endian cells from the front of `value`.
///
/// The first cell is the most significant one. Returns the value together with the bytes following it, or `None`
/// if `value` is too short. Values wider than 64 bit keep only their low 64 bit.
pub fn read_cells(value: &[u8], cells: u32) -> Option<(u64, &[u8])> {
    let len = cells as usize * CELL_SIZE;
    if value.len() < len {
        return None;
    }
    let (head, tail) = value.split_at(len);
    let result = head.chunks_exact(CELL_SIZE).fold(0u64, |acc, cell| {
        (acc << 32) | u64::from(u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
    });
    Some((result, tail))
}

/// Walks the entries of a `<stringlist>` value such as `compatible`.
///
/// Iteration ends at the first malformed entry, [`next_str`](StringListIterator::next_str) reports it instead.
pub struct StringListIterator<'buf> {
    pub(crate) buf: &'buf [u8],
}

impl<'buf> StringListIterator<'buf> {
    pub fn new(buf: &'buf [u8]) -> Self {
        Self { buf }
    }

    /// Consume the next entry. A non UTF-8 entry is skipped over even though it is reported.
    pub fn next_str(&mut self) -> Result<&'buf str, StringError> {
        let entry =
            CStr::from_bytes_until_nul(self.buf).map_err(|_| StringError::NoNullTerminator)?;
        self.buf = &self.buf[entry.to_bytes_with_nul().len()..];
        decode_str(entry)
    }
}

impl<'buf> Iterator for StringListIterator<'buf> {
    type Item = &'buf str;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_str().ok()
    }
}
