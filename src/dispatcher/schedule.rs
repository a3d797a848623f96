//! Wall-clock aligned push ticks with a stable per-host offset.
//!
//! Every host wakes at `k * interval + offset`. The offset comes from
//! configuration or from an RNG seeded with the host identity, so a fleet
//! spreads its pushes over the interval while each host keeps the same slot
//! across runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::host::HostIdentity;

const SEED_PURPOSE: &str = "push";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
    offset: Duration,
}

impl Schedule {
    /// Offsets at or beyond `interval` wrap around
    pub fn new(interval: Duration, offset: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };
        let offset_nanos = offset.as_nanos() % interval.as_nanos();

        Self {
            interval,
            offset: nanos_to_duration(offset_nanos),
        }
    }

    /// Configured offset if any, otherwise the host's own slot
    pub fn for_host(interval: Duration, configured: Option<Duration>, host: &HostIdentity) -> Self {
        let offset = configured.unwrap_or_else(|| host_offset(host, interval));
        Self::new(interval, offset)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// Time from `now` until the next tick: the next interval boundary plus the offset
    pub fn delay_from(&self, now: SystemTime) -> Duration {
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        let interval = self.interval.as_nanos();

        let into_interval = since_epoch % interval;
        nanos_to_duration(interval - into_interval + self.offset.as_nanos())
    }

    pub fn next_delay(&self) -> Duration {
        self.delay_from(SystemTime::now())
    }
}

/// Stable pseudo-random offset in `[0, interval)` for this host
pub fn host_offset(host: &HostIdentity, interval: Duration) -> Duration {
    let digest = Sha256::digest(host.seed_material(SEED_PURPOSE).as_bytes());
    let seed: [u8; 32] = digest.into();
    let mut rng = StdRng::from_seed(seed);

    let fraction: f64 = rng.random();
    interval.mul_f64(fraction)
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = (nanos / 1_000_000_000) as u64;
    let subsec = (nanos % 1_000_000_000) as u32;
    Duration::new(secs, subsec)
}
