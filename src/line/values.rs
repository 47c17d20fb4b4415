use std::ops::Deref;

use crate::uapi::v1::{gpiohandle_data, GPIOHANDLES_MAX};

pub(crate) type Offsets = heapless::Vec<u32, GPIOHANDLES_MAX>;

/// Values read from a handle, one byte per line in handle order.
#[derive(Clone, PartialEq, Eq)]
pub struct LineValues {
    offsets: Offsets,
    values: heapless::Vec<u8, GPIOHANDLES_MAX>,
}

impl LineValues {
    pub(crate) fn new(offsets: &Offsets, data: &gpiohandle_data) -> Self {
        let values = data.values.iter().copied().take(offsets.len()).collect();
        Self {
            offsets: offsets.clone(),
            values,
        }
    }

    /// The value of `offset`, or `None` if it is not part of the handle.
    ///
    /// When an offset was requested more than once the first position wins.
    pub fn get(&self, offset: u32) -> Option<u8> {
        let idx = self.offsets.iter().position(|o| *o == offset)?;
        self.values.get(idx).copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }

    /// `(offset, value)` pairs in handle order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.offsets
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    fn fmt_inner(&self) -> impl std::fmt::Debug + '_ {
        struct F<'a>(&'a LineValues);

        impl std::fmt::Debug for F<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut map = f.debug_map();

                for (offset, val) in self.0.iter() {
                    map.entry(&offset, &val);
                }

                map.finish()
            }
        }

        F(self)
    }
}

impl Deref for LineValues {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl std::fmt::Debug for LineValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt = self.fmt_inner();

        f.debug_tuple("LineValues").field(&fmt).finish()
    }
}
