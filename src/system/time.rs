use std::{
    io::{Read, Write},
    mem::MaybeUninit,
    ops::Add,
    time::Duration,
};

/// A point on one of the system clocks. Which clock a value came from is up
/// to the caller; values from different clocks must never be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    secs: i64,
    nsecs: i64,
}

/// The encoded size of one [Timestamp]: the native layout of a timespec.
pub const TIMESTAMP_SIZE: usize = 16;

impl Timestamp {
    pub(crate) fn new(secs: i64, nsecs: i64) -> Timestamp {
        Timestamp {
            secs: secs + nsecs.div_euclid(1_000_000_000),
            nsecs: nsecs.rem_euclid(1_000_000_000),
        }
    }

    fn now(clock: libc::clockid_t) -> std::io::Result<Timestamp> {
        let mut spec = MaybeUninit::<libc::timespec>::uninit();
        // SAFETY: a valid pointer is passed to clock_gettime
        crate::cutils::cerr(unsafe { libc::clock_gettime(clock, spec.as_mut_ptr()) })?;
        // SAFETY: `libc::clock_gettime` will have initialized `spec`,
        // otherwise we would have returned early with the `?` operator.
        let spec = unsafe { spec.assume_init() };
        Ok(spec.into())
    }

    /// The monotonic clock; keeps counting across system sleep and cannot
    /// be set backwards.
    pub fn now_monotonic() -> std::io::Result<Timestamp> {
        Self::now(libc::CLOCK_BOOTTIME)
    }

    /// The wall clock.
    pub fn now_realtime() -> std::io::Result<Timestamp> {
        Self::now(libc::CLOCK_REALTIME)
    }

    pub fn is_zero(&self) -> bool {
        self.secs == 0 && self.nsecs == 0
    }

    pub(crate) fn encode(&self, target: &mut impl Write) -> std::io::Result<()> {
        target.write_all(&self.secs.to_ne_bytes())?;
        target.write_all(&self.nsecs.to_ne_bytes())?;
        Ok(())
    }

    pub(crate) fn decode(from: &mut impl Read) -> std::io::Result<Timestamp> {
        let mut sec_bytes = [0; 8];
        let mut nsec_bytes = [0; 8];

        from.read_exact(&mut sec_bytes)?;
        from.read_exact(&mut nsec_bytes)?;

        Ok(Timestamp::new(
            i64::from_ne_bytes(sec_bytes),
            i64::from_ne_bytes(nsec_bytes),
        ))
    }

    #[inline]
    fn checked_add(self, rhs: Duration) -> Option<Timestamp> {
        let rhs_secs = rhs.as_secs().try_into().ok()?;
        let rhs_nsecs = rhs.subsec_nanos().into();

        let secs = self.secs.checked_add(rhs_secs)?;
        let nsecs = self.nsecs.checked_add(rhs_nsecs)?;

        Some(Timestamp::new(secs, nsecs))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.checked_add(rhs)
            .expect("overflow when adding duration")
    }
}

impl From<libc::timespec> for Timestamp {
    fn from(value: libc::timespec) -> Self {
        Timestamp::new(value.tv_sec, value.tv_nsec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_timestamp_normalizes() {
        assert_eq!(Timestamp::new(-1, 2_000_000_000), Timestamp::new(1, 0));
        assert_eq!(
            Timestamp::new(2, -500_000_000),
            Timestamp::new(1, 500_000_000)
        );
    }

    #[test]
    fn test_time_ops() {
        assert_eq!(
            Timestamp::new(0, 0) + Duration::from_secs(3),
            Timestamp::new(3, 0)
        );
        assert_eq!(
            Timestamp::new(0, 500_000_000) + Duration::from_nanos(2_500_000_000),
            Timestamp::new(3, 0)
        );
    }

    #[test]
    fn encode_decode_is_identity() {
        let mut buf = Vec::new();
        let ts = Timestamp::new(1234, 5678);
        ts.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), TIMESTAMP_SIZE);
        assert_eq!(Timestamp::decode(&mut buf.as_slice()).unwrap(), ts);
    }

    #[test]
    fn clocks_advance() {
        let a = Timestamp::now_monotonic().unwrap();
        let b = Timestamp::now_monotonic().unwrap();
        assert!(a <= b);
        assert!(!a.is_zero());
        assert!(!Timestamp::now_realtime().unwrap().is_zero());
    }
}
