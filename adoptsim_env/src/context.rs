//! Core environment context trait for adoptsim engines.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the exploration engine can
/// run in both production (tokio) and deterministic harness environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, `OsRng`
/// - **Harness**: `VirtualContext` (in `adoptsim_sim`) - virtual clock, seeded entropy
///
/// # Determinism
///
/// All methods that would normally introduce non-determinism (time,
/// randomness) are controlled by the implementation.
#[async_trait]
pub trait AdoptsimContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for measuring simulation and proposal durations.
    /// In the harness, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for record timestamps
    /// (`created_at`, `started_at`, `completed_at`).
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In the harness: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Derives a simulation seed from a seed extension.
    ///
    /// Used when a simulation config omits its seed. The harness combines
    /// its master seed with `seed_extension`; production draws fresh entropy.
    fn derive_seed(&self, seed_extension: u64) -> u64;

    /// Returns the context's master seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
