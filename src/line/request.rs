use crate::{
    errors::{Error, Result},
    fixed_str::FixedStr,
    uapi::{v1, LineRequestFlags},
};

/// Parameters for reserving a group of lines with one shared configuration.
///
/// ```
/// use gpio_chardev::{LineRequest, LineRequestFlags};
///
/// let req = LineRequest::output(&[4, 5, 6])
///     .with_flags(LineRequestFlags::ACTIVE_LOW)
///     .with_defaults(&[1, 0, 1])
///     .with_consumer("relay-bank");
/// assert_eq!(req.offsets(), &[4, 5, 6]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LineRequest<'a> {
    offsets: &'a [u32],
    flags: LineRequestFlags,
    defaults: &'a [u8],
    consumer: &'a str,
}

impl<'a> LineRequest<'a> {
    pub const fn new(flags: LineRequestFlags, offsets: &'a [u32]) -> Self {
        Self {
            offsets,
            flags,
            defaults: &[],
            consumer: "",
        }
    }

    pub const fn input(offsets: &'a [u32]) -> Self {
        Self::new(LineRequestFlags::INPUT, offsets)
    }

    pub const fn output(offsets: &'a [u32]) -> Self {
        Self::new(LineRequestFlags::OUTPUT, offsets)
    }

    /// Add flags such as [`LineRequestFlags::ACTIVE_LOW`].
    pub const fn with_flags(self, flags: LineRequestFlags) -> Self {
        Self {
            flags: self.flags.union(flags),
            ..self
        }
    }

    /// Initial output values, one per offset. Missing values are low.
    pub const fn with_defaults(self, defaults: &'a [u8]) -> Self {
        Self { defaults, ..self }
    }

    /// Consumer label; the chip's label is used when left empty.
    pub const fn with_consumer(self, consumer: &'a str) -> Self {
        Self { consumer, ..self }
    }

    pub const fn offsets(&self) -> &'a [u32] {
        self.offsets
    }

    pub const fn flags(&self) -> LineRequestFlags {
        self.flags
    }

    pub(crate) fn to_v1(
        &self,
        fallback_consumer: &FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
    ) -> Result<v1::gpiohandle_request> {
        let n = self.offsets.len();
        if n == 0 || n > v1::GPIOHANDLES_MAX {
            return Err(Error::InvalidLineCount(n));
        }

        let mut req = v1::gpiohandle_request::zeroed();
        req.lineoffsets[..n].copy_from_slice(self.offsets);
        for (w, v) in req.default_values.iter_mut().zip(self.defaults.iter().take(n)) {
            *w = *v;
        }
        req.flags = self.flags.bits();
        req.consumer_label = consumer_label(self.consumer, fallback_consumer)?;
        req.lines = n as u32;
        Ok(req)
    }
}

pub(crate) fn consumer_label(
    consumer: &str,
    fallback: &FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
) -> Result<[u8; v1::GPIO_MAX_NAME_SIZE]> {
    if consumer.is_empty() {
        Ok(fallback.into_byte_array())
    } else {
        Ok(FixedStr::<{ v1::GPIO_MAX_NAME_SIZE }>::new(consumer)?.into_byte_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip_label() -> FixedStr<{ v1::GPIO_MAX_NAME_SIZE }> {
        FixedStr::new("chip-consumer").unwrap()
    }

    #[test]
    fn encodes_offsets_defaults_and_label() {
        let req = LineRequest::output(&[3, 1, 2])
            .with_flags(LineRequestFlags::OPEN_DRAIN)
            .with_defaults(&[1, 0, 1, 1, 1])
            .with_consumer("writer")
            .to_v1(&chip_label())
            .unwrap();

        assert_eq!(req.lines, 3);
        assert_eq!(req.offsets(), &[3, 1, 2]);
        assert_eq!(&req.default_values[..4], &[1, 0, 1, 0]);
        assert_eq!(
            req.flags,
            (LineRequestFlags::OUTPUT | LineRequestFlags::OPEN_DRAIN).bits()
        );
        assert_eq!(&req.consumer_label[..7], b"writer\0");
        assert_eq!(req.fd, 0);
    }

    #[test]
    fn empty_consumer_uses_chip_label() {
        let req = LineRequest::input(&[0]).to_v1(&chip_label()).unwrap();
        assert_eq!(&req.consumer_label[..14], b"chip-consumer\0");
    }

    #[test]
    fn line_count_is_bounded() {
        let none: [u32; 0] = [];
        assert!(matches!(
            LineRequest::input(&none).to_v1(&chip_label()),
            Err(Error::InvalidLineCount(0))
        ));

        let too_many: Vec<u32> = (0..65).collect();
        assert!(matches!(
            LineRequest::input(&too_many).to_v1(&chip_label()),
            Err(Error::InvalidLineCount(65))
        ));

        let max: Vec<u32> = (0..64).collect();
        let req = LineRequest::input(&max).to_v1(&chip_label()).unwrap();
        assert_eq!(req.lines, 64);
    }

    #[test]
    fn overlong_consumer_is_rejected() {
        let label = "x".repeat(40);
        let err = LineRequest::input(&[0])
            .with_consumer(&label)
            .to_v1(&chip_label())
            .unwrap_err();
        assert!(matches!(err, Error::Label(_)));
    }
}
