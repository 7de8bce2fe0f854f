//! The strings block, a run of NUL terminated property names referenced by offset

use core::ffi::CStr;
use thiserror_no_std::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Strings<'buf> {
    buf: &'buf [u8],
}

#[derive(Debug, Error, Eq, PartialEq, Clone, Copy)]
pub enum StringsError {
    #[error("name offset {0} lies outside the {1} byte strings block")]
    OutOfBounds(usize, usize),
    #[error("name at offset {0} runs off the end of the strings block")]
    Unterminated(usize),
    #[error("name at offset {0} is not UTF-8")]
    InvalidUtf8(usize),
}

impl<'buf> Strings<'buf> {
    pub fn from_buffer(buf: &'buf [u8]) -> Self {
        Self { buf }
    }

    pub fn get_string(&self, offset: usize) -> Result<&'buf CStr, StringsError> {
        let tail = self
            .buf
            .get(offset..)
            .ok_or(StringsError::OutOfBounds(offset, self.buf.len()))?;
        CStr::from_bytes_until_nul(tail).map_err(|_| StringsError::Unterminated(offset))
    }

    pub fn get_str(&self, offset: usize) -> Result<&'buf str, StringsError> {
        self.get_string(offset)?
            .to_str()
            .map_err(|_| StringsError::InvalidUtf8(offset))
    }

    /// Find the offset at which `name` can be read as a complete string.
    ///
    /// The tail of a longer string matches as well, e.g. `"cells"` is found inside `"#address-cells"`.
    pub fn find(&self, name: &str) -> Option<usize> {
        let needle = name.as_bytes();
        self.buf
            .windows(needle.len() + 1)
            .position(|candidate| candidate[needle.len()] == 0 && &candidate[..needle.len()] == needle)
    }

    pub fn as_bytes(&self) -> &'buf [u8] {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::ffi::CString;

    #[test]
    fn names_are_read_by_offset() {
        let names = CString::new("timebase-frequency").unwrap();
        let strings = Strings::from_buffer(names.as_bytes_with_nul());
        assert_eq!(strings.get_string(0).unwrap(), names.as_c_str());
        assert_eq!(strings.get_str(9), Ok("frequency"));
    }

    #[test]
    fn out_of_bounds_offset_is_reported() {
        let strings = Strings::from_buffer(b"reg\0");
        assert_eq!(strings.get_str(9), Err(StringsError::OutOfBounds(9, 4)));
        assert_eq!(
            Strings::from_buffer(b"reg").get_str(0),
            Err(StringsError::Unterminated(0))
        );
    }

    #[test]
    fn find_matches_whole_strings_and_suffixes() {
        let strings = Strings::from_buffer(b"compatible\0#address-cells\0reg\0");
        assert_eq!(strings.find("compatible"), Some(0));
        assert_eq!(strings.find("reg"), Some(26));
        assert_eq!(strings.find("cells"), Some(20));
        assert_eq!(strings.find("compat"), None);
        assert_eq!(strings.find("ranges"), None);
    }
}
