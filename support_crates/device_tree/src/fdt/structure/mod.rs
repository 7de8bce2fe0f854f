//! The structure block, a flat token stream encoding the nodes and their properties
//!
//! Everything in this module walks the block one token ("tag") at a time. [`StructureBlock::next_tag`] decodes the
//! token at an offset and returns the offset of the token following it, which is all that lookups and edits need.

use crate::fdt::FdtError;
use core::ffi::CStr;

pub(crate) mod node;
pub(crate) mod property;
pub(crate) mod property_value_encoding;

/// Opens a node, followed by its NUL terminated name padded to the next token
pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
/// Followed by the value length, the name offset into the strings block and the padded value
pub(crate) const FDT_PROP: u32 = 0x3;
/// Padding left by other writers, skipped while walking
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

/// Size and alignment of a token
pub(crate) const TOKEN_SIZE: usize = 4;

/// Size of the FDT_PROP token together with its length and name offset fields
pub(crate) const PROP_HEADER_SIZE: usize = 3 * TOKEN_SIZE;

/// Round `offset` up to the next token boundary
pub(crate) const fn align_to_token(offset: usize) -> usize {
    (offset + TOKEN_SIZE - 1) & !(TOKEN_SIZE - 1)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Tag {
    BeginNode,
    EndNode,
    Prop,
    Nop,
    End,
}

/// The encoded header of a property, pointing into the structure block
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct RawProperty<'buf> {
    pub name_offset: u32,
    pub value: &'buf [u8],
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct StructureBlock<'buf> {
    buf: &'buf [u8],
}

impl<'buf> StructureBlock<'buf> {
    pub(crate) fn from_buffer(buf: &'buf [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn as_bytes(&self) -> &'buf [u8] {
        self.buf
    }

    pub(crate) fn read_u32(&self, offset: usize) -> Result<u32, FdtError> {
        let bytes = self
            .buf
            .get(offset..offset + TOKEN_SIZE)
            .ok_or(FdtError::Truncated)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Decode the token at `offset` and return it together with the offset of the next token
    pub(crate) fn next_tag(&self, offset: usize) -> Result<(Tag, usize), FdtError> {
        if offset % TOKEN_SIZE != 0 {
            return Err(FdtError::BadOffset(offset));
        }

        let (tag, next) = match self.read_u32(offset)? {
            FDT_BEGIN_NODE => {
                let name = self.name_at(offset + TOKEN_SIZE)?;
                (
                    Tag::BeginNode,
                    align_to_token(offset + TOKEN_SIZE + name.len() + 1),
                )
            }
            FDT_PROP => {
                let len = self.read_u32(offset + TOKEN_SIZE)? as usize;
                let end = (offset + PROP_HEADER_SIZE)
                    .checked_add(len)
                    .ok_or(FdtError::Truncated)?;
                (Tag::Prop, align_to_token(end))
            }
            FDT_END_NODE => (Tag::EndNode, offset + TOKEN_SIZE),
            FDT_NOP => (Tag::Nop, offset + TOKEN_SIZE),
            FDT_END => (Tag::End, offset + TOKEN_SIZE),
            token => return Err(FdtError::BadStructure { token, offset }),
        };

        if next > self.buf.len() {
            return Err(FdtError::Truncated);
        }
        Ok((tag, next))
    }

    /// The raw name following a FDT_BEGIN_NODE token, without its terminator
    fn name_at(&self, offset: usize) -> Result<&'buf [u8], FdtError> {
        let rest = self.buf.get(offset..).ok_or(FdtError::Truncated)?;
        CStr::from_bytes_until_nul(rest)
            .map(CStr::to_bytes)
            .map_err(|_| FdtError::Truncated)
    }

    /// Name of the node whose FDT_BEGIN_NODE token is at `offset`
    pub(crate) fn node_name(&self, offset: usize) -> Result<&'buf str, FdtError> {
        let name = self.name_at(offset + TOKEN_SIZE)?;
        core::str::from_utf8(name).map_err(|_| FdtError::BadName)
    }

    /// Decode the property whose FDT_PROP token is at `offset`
    pub(crate) fn property(&self, offset: usize) -> Result<RawProperty<'buf>, FdtError> {
        let len = self.read_u32(offset + TOKEN_SIZE)? as usize;
        let name_offset = self.read_u32(offset + 2 * TOKEN_SIZE)?;
        let start = offset + PROP_HEADER_SIZE;
        let value = start
            .checked_add(len)
            .and_then(|end| self.buf.get(start..end))
            .ok_or(FdtError::Truncated)?;
        Ok(RawProperty { name_offset, value })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokens(words: &[u32]) -> alloc::vec::Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[test]
    fn tags_are_walked_with_padding() {
        // begin "ab", prop len 5, nop, end node, end
        let mut buf = tokens(&[FDT_BEGIN_NODE, u32::from_be_bytes(*b"ab\0\0"), FDT_PROP, 5, 0]);
        buf.extend_from_slice(b"hello\0\0\0");
        buf.extend(tokens(&[FDT_NOP, FDT_END_NODE, FDT_END]));
        let block = StructureBlock::from_buffer(&buf);

        assert_eq!(block.next_tag(0), Ok((Tag::BeginNode, 8)));
        assert_eq!(block.node_name(0), Ok("ab"));
        assert_eq!(block.next_tag(8), Ok((Tag::Prop, 28)));
        assert_eq!(block.property(8).unwrap().value, b"hello");
        assert_eq!(block.next_tag(28), Ok((Tag::Nop, 32)));
        assert_eq!(block.next_tag(32), Ok((Tag::EndNode, 36)));
        assert_eq!(block.next_tag(36), Ok((Tag::End, 40)));
    }

    #[test]
    fn unknown_tokens_and_overlong_values_are_errors() {
        let buf = tokens(&[0x7, FDT_PROP, 0x100, 0]);
        let block = StructureBlock::from_buffer(&buf);
        assert_eq!(
            block.next_tag(0),
            Err(FdtError::BadStructure { token: 7, offset: 0 })
        );
        assert_eq!(block.next_tag(4), Err(FdtError::Truncated));
        assert_eq!(block.next_tag(2), Err(FdtError::BadOffset(2)));
    }

    #[test]
    fn align_to_token_rounds_up() {
        assert_eq!(align_to_token(0), 0);
        assert_eq!(align_to_token(1), 4);
        assert_eq!(align_to_token(4), 4);
        assert_eq!(align_to_token(13), 16);
    }
}
