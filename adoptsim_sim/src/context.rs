//! Virtual context implementing AdoptsimContext for deterministic drills.

use adoptsim_env::AdoptsimContext;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Context backed by a virtual clock and a master seed.
///
/// This implements `AdoptsimContext` using:
/// - A virtual clock that only moves when advanced or slept on
/// - Seeds derived from the master seed, so omitted simulation seeds are reproducible
/// - A fixed epoch for record timestamps
pub struct VirtualContext {
    /// Master seed for this drill
    seed: u64,

    /// Current virtual time (nanoseconds since context creation)
    virtual_time_ns: Arc<AtomicU64>,

    /// Virtual time 0 maps to this wall-clock time
    epoch: DateTime<Utc>,
}

impl VirtualContext {
    /// Creates a new VirtualContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            // 2024-01-01 00:00:00 UTC
            epoch: Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default(),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }
}

impl Clone for VirtualContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl AdoptsimContext for VirtualContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.epoch + chrono::Duration::nanoseconds(self.time_ns() as i64)
    }

    async fn sleep(&self, duration: Duration) {
        // Sleeping only moves the virtual clock
        self.advance_time(duration);
    }

    fn derive_seed(&self, seed_extension: u64) -> u64 {
        // Combine master seed with extension
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ seed_extension;
        ChaCha8Rng::seed_from_u64(combined_seed).next_u64()
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_context_time() {
        let ctx = VirtualContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_wall_clock_follows_virtual_time() {
        let ctx = VirtualContext::new(42);
        let start = ctx.wall_clock();
        ctx.advance_time(Duration::from_secs(90));

        assert_eq!(start.timestamp(), 1_704_067_200);
        assert_eq!((ctx.wall_clock() - start).num_seconds(), 90);
    }

    #[tokio::test]
    async fn test_sleep_is_instant() {
        let ctx = VirtualContext::new(1);
        ctx.sleep(Duration::from_secs(3600)).await;
        assert_eq!(ctx.now(), Duration::from_secs(3600));
    }

    #[test]
    fn test_derived_seeds_are_deterministic() {
        let ctx1 = VirtualContext::new(42);
        let ctx2 = VirtualContext::new(42);

        // Same seed + extension = same derived seed
        assert_eq!(ctx1.derive_seed(1), ctx2.derive_seed(1));

        // Different extension or master seed = different derived seed
        assert_ne!(ctx1.derive_seed(1), ctx1.derive_seed(2));
        assert_ne!(ctx1.derive_seed(1), VirtualContext::new(43).derive_seed(1));
    }

    #[test]
    fn test_clone_shares_time() {
        let ctx1 = VirtualContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
        assert_eq!(ctx2.seed(), 42);
    }
}
