//! Runtime coordination settings resolved once at startup.
//!
//! Like the rest of the runtime's configuration, these are build- or
//! environment-selected constants, never renegotiated at run time:
//!
//! - `KESTREL_TICK_MS` — preemption tick interval in milliseconds.
//! - `KESTREL_WAIT_BACKEND` — `futex` or `native` wait primitive.

use std::time::Duration;

/// Default preemption quantum (milliseconds).
pub const DEFAULT_TICK_MS: u64 = 50;

// =============================================================================
// Wait Backend
// =============================================================================

/// Which low-level primitive the counter-based wait abstraction blocks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBackend {
    /// Linux futex (`FUTEX_WAIT_PRIVATE` / `FUTEX_WAKE_PRIVATE`).
    Futex,
    /// The platform condition variable.
    Native,
}

impl WaitBackend {
    /// The preferred backend for the build target.
    pub fn default_for_target() -> Self {
        if cfg!(target_os = "linux") {
            WaitBackend::Futex
        } else {
            WaitBackend::Native
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Coordination settings, immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordConfig {
    /// Interval between preemption ticks.
    pub tick_interval: Duration,
    /// Wait-primitive backend for the master lock.
    pub wait_backend: WaitBackend,
}

impl Default for CoordConfig {
    fn default() -> Self {
        CoordConfig {
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            wait_backend: WaitBackend::default_for_target(),
        }
    }
}

impl CoordConfig {
    /// Resolve configuration from the environment, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let tick_interval = std::env::var("KESTREL_TICK_MS")
            .ok()
            .and_then(|v| parse_tick_ms(&v))
            .unwrap_or(Duration::from_millis(DEFAULT_TICK_MS));
        let wait_backend = std::env::var("KESTREL_WAIT_BACKEND")
            .ok()
            .and_then(|v| parse_backend(&v))
            .unwrap_or_else(WaitBackend::default_for_target);
        CoordConfig {
            tick_interval,
            wait_backend,
        }
    }
}

/// Parse a tick interval in milliseconds. Zero is rejected.
pub fn parse_tick_ms(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(ms) => Some(Duration::from_millis(ms)),
    }
}

/// Parse a wait-backend name (case-insensitive).
pub fn parse_backend(value: &str) -> Option<WaitBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "futex" => Some(WaitBackend::Futex),
        "native" => Some(WaitBackend::Native),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
