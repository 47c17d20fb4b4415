//! NUL-padded label buffers as found in the kernel records.

use std::ops::Deref;

/// Text stored the way the kernel stores names and consumer labels: at most
/// `N - 1` bytes of UTF-8 followed by NUL padding.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedStr<const N: usize> {
    s: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    #[inline]
    pub const fn empty() -> Self {
        Self { s: [0; N] }
    }

    /// Encode `s`, leaving room for the terminating NUL.
    pub fn new(s: &str) -> Result<Self, FixedStrErr> {
        let mut f = Self::empty();
        f.write(s)?;
        Ok(f)
    }

    /// Decode a buffer handed out by the kernel.
    ///
    /// The label ends at the first NUL byte. Bytes that are not valid UTF-8
    /// end it as well, so decoding never fails.
    pub fn from_byte_array(bytes: [u8; N]) -> Self {
        let nul = find_nul(&bytes);
        let len = match core::str::from_utf8(&bytes[..nul]) {
            Ok(_) => nul,
            Err(e) => e.valid_up_to(),
        };

        let mut s = [0; N];
        s[..len].copy_from_slice(&bytes[..len]);
        Self { s }
    }

    pub const fn into_byte_array(self) -> [u8; N] {
        self.s
    }

    /// Largest label length that still leaves a terminating NUL.
    pub const fn capacity() -> usize {
        N.saturating_sub(1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        find_nul(&self.s)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        N == 0 || self.s[0] == 0
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Contents are validated on the way in.
        core::str::from_utf8(&self.s[..self.len()]).unwrap_or_default()
    }

    /// Append `s`.
    pub fn write(&mut self, s: &str) -> Result<(), FixedStrErr> {
        let l = self.len();
        let new_len = l + s.len();

        if new_len > Self::capacity() {
            return Err(FixedStrErr::CapacityOverflow {
                capacity: Self::capacity(),
                required: new_len,
            });
        }
        if s.as_bytes().contains(&0) {
            return Err(FixedStrErr::InteriorNul);
        }

        self.s[l..new_len].copy_from_slice(s.as_bytes());
        Ok(())
    }
}

impl<const N: usize> Default for FixedStr<N> {
    #[inline(always)]
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> std::fmt::Debug for FixedStr<N> {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FixedStr").field(&self.as_str()).finish()
    }
}

impl<const N: usize> std::fmt::Display for FixedStr<N> {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl<const N: usize> AsRef<str> for FixedStr<N> {
    #[inline(always)]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> Deref for FixedStr<N> {
    type Target = str;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FixedStrErr {
    #[error(
        "Exceeded fixed string size: required {required} bytes with only {capacity} available"
    )]
    CapacityOverflow { capacity: usize, required: usize },
    #[error("Label contains a NUL byte")]
    InteriorNul,
}

#[inline]
fn find_nul(s: &[u8]) -> usize {
    s.iter().position(|c| *c == 0).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_stops_at_first_nul() {
        let mut raw = [0u8; 32];
        raw[..9].copy_from_slice(b"gpiochip0");
        raw[10..13].copy_from_slice(b"xyz");
        let s = FixedStr::from_byte_array(raw);
        assert_eq!(s.as_str(), "gpiochip0");
        assert_eq!(s.len(), 9);
        assert!(!s.is_empty());
    }

    #[test]
    fn decode_unterminated_buffer_uses_whole_buffer() {
        let s = FixedStr::from_byte_array(*b"abcd");
        assert_eq!(&*s, "abcd");
    }

    #[test]
    fn decode_drops_invalid_utf8_tail() {
        let mut raw = [0u8; 8];
        raw[..5].copy_from_slice(&[b'o', b'k', 0xFF, b'n', b'o']);
        assert_eq!(FixedStr::from_byte_array(raw).as_str(), "ok");
    }

    #[test]
    fn encode_reserves_terminator() {
        let label = "a".repeat(31);
        let s = FixedStr::<32>::new(&label).unwrap();
        assert_eq!(s.into_byte_array()[31], 0);

        let err = FixedStr::<32>::new(&"a".repeat(32)).unwrap_err();
        assert_eq!(
            err,
            FixedStrErr::CapacityOverflow {
                capacity: 31,
                required: 32
            }
        );
    }

    #[test]
    fn encode_rejects_interior_nul() {
        assert_eq!(
            FixedStr::<32>::new("a\0b").unwrap_err(),
            FixedStrErr::InteriorNul
        );
    }

    #[test]
    fn empty_label() {
        let s = FixedStr::<32>::new("").unwrap();
        assert!(s.is_empty());
        assert_eq!(s.as_str(), "");
    }
}
