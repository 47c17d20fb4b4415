use crate::{
    fixed_str::FixedStr,
    uapi::{v1, LineFlags},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Snapshot of a line's state as reported by the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo {
    name: FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
    consumer: FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
    offset: u32,
    flags: LineFlags,
}

impl LineInfo {
    pub(crate) fn from_v1(info: &v1::gpioline_info) -> Self {
        Self {
            name: FixedStr::from_byte_array(info.name),
            consumer: FixedStr::from_byte_array(info.consumer),
            offset: info.line_offset,
            flags: LineFlags::from_bits_truncate(info.flags),
        }
    }

    /// Name of the line as assigned by the driver or board description
    pub fn name(&self) -> Option<&str> {
        if self.name.is_empty() {
            None
        } else {
            Some(&self.name)
        }
    }

    /// Consumer label of whoever currently holds the line
    pub fn consumer(&self) -> Option<&str> {
        if self.consumer.is_empty() {
            None
        } else {
            Some(&self.consumer)
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn flags(&self) -> LineFlags {
        self.flags
    }

    /// Get the direction of this GPIO if configured
    ///
    /// Lines are considered to be inputs if not explicitly
    /// marked as outputs in the line info flags by the kernel.
    pub fn direction(&self) -> Direction {
        if self.flags.contains(LineFlags::IS_OUT) {
            Direction::Output
        } else {
            Direction::Input
        }
    }

    /// True if the line is held by the kernel or another consumer
    pub fn is_used(&self) -> bool {
        self.flags.contains(LineFlags::KERNEL)
    }

    /// True if this line is marked as active low in the kernel
    pub fn is_active_low(&self) -> bool {
        self.flags.contains(LineFlags::ACTIVE_LOW)
    }

    /// True if this line is marked as open drain in the kernel
    pub fn is_open_drain(&self) -> bool {
        self.flags.contains(LineFlags::OPEN_DRAIN)
    }

    /// True if this line is marked as open source in the kernel
    pub fn is_open_source(&self) -> bool {
        self.flags.contains(LineFlags::OPEN_SOURCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_record() {
        let mut raw = v1::gpioline_info::for_offset(17);
        raw.flags = (LineFlags::KERNEL | LineFlags::IS_OUT | LineFlags::ACTIVE_LOW).bits() | 1 << 9;
        raw.name[..6].copy_from_slice(b"GPIO17");

        let info = LineInfo::from_v1(&raw);
        assert_eq!(info.offset(), 17);
        assert_eq!(info.name(), Some("GPIO17"));
        assert_eq!(info.consumer(), None);
        assert_eq!(info.direction(), Direction::Output);
        assert!(info.is_used());
        assert!(info.is_active_low());
        assert!(!info.is_open_drain());
        assert!(!info.is_open_source());
        // unknown bits are dropped
        assert_eq!(
            info.flags(),
            LineFlags::KERNEL | LineFlags::IS_OUT | LineFlags::ACTIVE_LOW
        );
    }
}
