//! C10 — the IDLE controller (spec.md §4.10).
//!
//! Automatic background idling (entering `IDLE` whenever the connection has
//! been quiet for 15s) needs a task that runs concurrently with whatever the
//! caller is doing, which does not fit the `&mut Connection`/single-`Mutex`
//! model the rest of the engine uses (spec.md §9, Open Question 3 — see
//! DESIGN.md). Instead `ConnectionHandle::idle` exposes a single idle cycle
//! that callers drive explicitly, typically from a loop spawned alongside
//! their own use of the connection:
//!
//! ```ignore
//! loop {
//!     let events = handle.idle(Some(Duration::from_secs(25 * 60))).await?;
//!     // inspect events, decide whether to keep idling
//! }
//! ```

use std::time::Duration;

/// How long a single `idle()` call waits before sending `DONE` on its own,
/// absent any server push or caller-driven early exit. RFC 2177 recommends
/// under 30 minutes; spec.md §4.10 defaults to 25.
pub const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(25 * 60);

/// Resolves the effective idle duration for a connection: the caller's
/// override, then `config.max_idle_time`, then the default.
#[must_use]
pub fn effective_max_idle(requested: Option<Duration>, configured: Option<Duration>) -> Duration {
    requested.or(configured).unwrap_or(DEFAULT_MAX_IDLE_TIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_overrides_configured() {
        assert_eq!(effective_max_idle(Some(Duration::from_secs(5)), Some(Duration::from_secs(10))), Duration::from_secs(5));
    }

    #[test]
    fn falls_back_to_configured_then_default() {
        assert_eq!(effective_max_idle(None, Some(Duration::from_secs(10))), Duration::from_secs(10));
        assert_eq!(effective_max_idle(None, None), DEFAULT_MAX_IDLE_TIME);
    }
}
