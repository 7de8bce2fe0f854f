use core::mem;
use thiserror_no_std::Error;

pub(crate) const HEADER_MAGIC: u32 = 0xd00dfeed;

/// Version of the blob format that is written by this library
pub(crate) const FDT_VERSION: u32 = 17;

/// Oldest version that blobs written by this library are backwards compatible with
pub(crate) const FDT_LAST_COMP_VERSION: u32 = 16;

/// Size of an encoded [`FdtHeader`] in bytes
pub const HEADER_SIZE: usize = mem::size_of::<FdtHeader>();

const FIELD_COUNT: usize = HEADER_SIZE / mem::size_of::<u32>();

/// Why a blob header could not be decoded or encoded
#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
pub enum HeaderReadError {
    #[error("blob does not start with 0xd00dfeed")]
    InvalidMagic,
    #[error("buffer is shorter than a blob header")]
    BufferTooSmall,
    /// Carries the `version` and `last_comp_version` fields of the rejected header
    #[error("blob version {0} (compatible down to {1}) cannot be read")]
    UnsupportedVersion(u32, u32),
    #[error("blob does not start on an 8 byte boundary")]
    InvalidAlignment,
}

/// Decoded form of the ten big-endian words that open a flattened device tree.
///
/// See section 5.2 of the devicetree specification for the meaning of each word.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[repr(C)]
pub struct FdtHeader {
    pub magic: u32,
    /// Bytes reserved for the blob, free space after the strings block included
    pub total_size: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub off_mem_rsvmap: u32,
    pub version: u32,
    pub last_comp_version: u32,
    pub boot_cpuid_phys: u32,
    pub size_dt_strings: u32,
    pub size_dt_struct: u32,
}

impl FdtHeader {
    /// Decode the header at the start of `buf`, which must be 8 byte aligned
    pub fn read_from_buffer(buf: &[u8]) -> Result<Self, HeaderReadError> {
        if (buf.as_ptr() as usize) % 8 != 0 {
            return Err(HeaderReadError::InvalidAlignment);
        }
        let raw = buf.get(..HEADER_SIZE).ok_or(HeaderReadError::BufferTooSmall)?;

        let mut fields = [0u32; FIELD_COUNT];
        for (field, bytes) in fields.iter_mut().zip(raw.chunks_exact(mem::size_of::<u32>())) {
            *field = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        let [magic, total_size, off_dt_struct, off_dt_strings, off_mem_rsvmap, version, last_comp_version, boot_cpuid_phys, size_dt_strings, size_dt_struct] =
            fields;

        if magic != HEADER_MAGIC {
            return Err(HeaderReadError::InvalidMagic);
        }
        if version < FDT_LAST_COMP_VERSION || last_comp_version > FDT_VERSION {
            return Err(HeaderReadError::UnsupportedVersion(
                version,
                last_comp_version,
            ));
        }

        Ok(Self {
            magic,
            total_size,
            off_dt_struct,
            off_dt_strings,
            off_mem_rsvmap,
            version,
            last_comp_version,
            boot_cpuid_phys,
            size_dt_strings,
            size_dt_struct,
        })
    }

    /// Decode the header located at `ptr`
    ///
    /// # Safety
    /// [`HEADER_SIZE`] bytes starting at `ptr` must be readable.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self, HeaderReadError> {
        let buf = core::slice::from_raw_parts::<u8>(ptr, HEADER_SIZE);
        Self::read_from_buffer(buf)
    }

    /// Encode this header into the first [`HEADER_SIZE`] bytes of `buf`
    pub fn write_to_buffer(&self, buf: &mut [u8]) -> Result<(), HeaderReadError> {
        let raw = buf
            .get_mut(..HEADER_SIZE)
            .ok_or(HeaderReadError::BufferTooSmall)?;
        for (bytes, field) in raw
            .chunks_exact_mut(mem::size_of::<u32>())
            .zip(self.fields())
        {
            bytes.copy_from_slice(&field.to_be_bytes());
        }
        Ok(())
    }

    fn fields(&self) -> [u32; FIELD_COUNT] {
        [
            self.magic,
            self.total_size,
            self.off_dt_struct,
            self.off_dt_strings,
            self.off_mem_rsvmap,
            self.version,
            self.last_comp_version,
            self.boot_cpuid_phys,
            self.size_dt_strings,
            self.size_dt_struct,
        ]
    }

    /// Offset of the first byte after the strings block
    pub fn used_size(&self) -> usize {
        self.off_dt_strings as usize + self.size_dt_strings as usize
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[repr(C, align(8))]
    struct Words<const N: usize>([u8; N]);

    fn raw_header(version: u8, last_comp_version: u8) -> Words<HEADER_SIZE> {
        let mut words = Words([0u8; HEADER_SIZE]);
        words.0[..4].copy_from_slice(&HEADER_MAGIC.to_be_bytes());
        words.0[23] = version;
        words.0[27] = last_comp_version;
        words
    }

    #[test]
    fn rejects_malformed_headers() {
        let short = Words([0u8; 2]);
        assert_eq!(FdtHeader::read_from_buffer(&short.0), Err(HeaderReadError::BufferTooSmall));

        let blank = Words([0u8; HEADER_SIZE]);
        assert_eq!(FdtHeader::read_from_buffer(&blank.0), Err(HeaderReadError::InvalidMagic));

        let ancient = raw_header(2, 1);
        assert_eq!(
            FdtHeader::read_from_buffer(&ancient.0),
            Err(HeaderReadError::UnsupportedVersion(2, 1))
        );

        let shifted = Words([0u8; HEADER_SIZE + 4]);
        assert_eq!(
            FdtHeader::read_from_buffer(&shifted.0[4..]),
            Err(HeaderReadError::InvalidAlignment)
        );
    }

    #[test]
    fn written_header_reads_back() {
        let header = FdtHeader {
            magic: HEADER_MAGIC,
            total_size: 0x10_0000,
            off_dt_struct: 0x38,
            off_dt_strings: 0x200,
            off_mem_rsvmap: 0x28,
            version: FDT_VERSION,
            last_comp_version: FDT_LAST_COMP_VERSION,
            boot_cpuid_phys: 1,
            size_dt_strings: 0x40,
            size_dt_struct: 0x1c8,
        };
        let mut words = Words([0xffu8; HEADER_SIZE]);
        header.write_to_buffer(&mut words.0).unwrap();

        assert_eq!(words.0[..4], [0xd0, 0x0d, 0xfe, 0xed]);
        assert_eq!(FdtHeader::read_from_buffer(&words.0), Ok(header));
        assert_eq!(header.used_size(), 0x240);
    }

    #[test]
    fn decodes_through_raw_pointer() {
        let words = raw_header(17, 16);
        let header = unsafe { FdtHeader::from_ptr(words.0.as_ptr()) }.unwrap();
        assert_eq!((header.magic, header.version, header.last_comp_version), (HEADER_MAGIC, 17, 16));
    }
}
