use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use wirecast_shared::{transport::TransportConn, ConnectionUid};

/// How long a disconnected identifier stays quarantined before reuse of
/// its slot in the tracker map.
pub(crate) const UID_EXPIRATION: Duration = Duration::from_secs(5 * 60);

/// How often the tracker map is swept for expired entries.
pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60);

struct Tracker {
    conn: Option<TransportConn>,
    expires_at: Option<Instant>,
}

/// Keeps each issued identifier reserved for a cooldown window after its
/// connection drops, so late references to a recently departed UID still
/// resolve cleanly instead of colliding with a newcomer.
pub(crate) struct TrackerMap {
    trackers: HashMap<ConnectionUid, Tracker>,
    expiration: Duration,
    sweep_interval: Duration,
    last_sweep: Instant,
}

impl TrackerMap {
    pub(crate) fn new() -> Self {
        Self::with_durations(UID_EXPIRATION, SWEEP_INTERVAL)
    }

    pub(crate) fn with_durations(expiration: Duration, sweep_interval: Duration) -> Self {
        Self {
            trackers: HashMap::new(),
            expiration,
            sweep_interval,
            last_sweep: Instant::now(),
        }
    }

    /// Records a freshly accepted connection.
    pub(crate) fn track_connected(&mut self, uid: ConnectionUid, conn: TransportConn) {
        self.trackers.insert(
            uid,
            Tracker {
                conn: Some(conn),
                expires_at: None,
            },
        );
    }

    /// Clears the transport handle and starts the expiration clock.
    pub(crate) fn mark_disconnected(&mut self, uid: ConnectionUid) {
        if let Some(tracker) = self.trackers.get_mut(&uid) {
            tracker.conn = None;
            tracker.expires_at = Some(Instant::now() + self.expiration);
        }
    }

    pub(crate) fn references(&self, uid: ConnectionUid) -> bool {
        self.trackers.contains_key(&uid)
    }

    pub(crate) fn len(&self) -> usize {
        self.trackers.len()
    }

    pub(crate) fn sweep_due(&self) -> bool {
        self.last_sweep.elapsed() >= self.sweep_interval
    }

    /// Removes expired entries and returns them; an entry returned with a
    /// live transport handle still needs an explicit disconnect by the
    /// caller.
    pub(crate) fn sweep(&mut self) -> Vec<(ConnectionUid, Option<TransportConn>)> {
        self.last_sweep = Instant::now();
        let now = Instant::now();
        let mut expired = Vec::new();
        self.trackers.retain(|uid, tracker| {
            let is_expired = tracker.expires_at.is_some_and(|at| at <= now);
            if is_expired {
                expired.push((*uid, tracker.conn));
            }
            !is_expired
        });
        expired
    }

    pub(crate) fn clear(&mut self) {
        self.trackers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_trackers_never_expire() {
        let mut map = TrackerMap::with_durations(Duration::ZERO, Duration::ZERO);
        map.track_connected(1, TransportConn::new(10));

        assert!(map.references(1));
        assert!(map.sweep().is_empty());
        assert!(map.references(1));
    }

    #[test]
    fn disconnected_trackers_expire_after_cooldown() {
        let mut map = TrackerMap::with_durations(Duration::ZERO, Duration::ZERO);
        map.track_connected(1, TransportConn::new(10));
        map.mark_disconnected(1);

        let swept = map.sweep();
        assert_eq!(swept, vec![(1, None)]);
        assert!(!map.references(1));
    }

    #[test]
    fn cooldown_holds_until_it_elapses() {
        let mut map = TrackerMap::with_durations(Duration::from_secs(3600), Duration::ZERO);
        map.track_connected(2, TransportConn::new(20));
        map.mark_disconnected(2);

        assert!(map.sweep().is_empty());
        assert!(map.references(2));
    }

    #[test]
    fn sweep_cadence_respects_interval() {
        let map = TrackerMap::with_durations(Duration::ZERO, Duration::from_secs(3600));
        assert!(!map.sweep_due());

        let map = TrackerMap::with_durations(Duration::ZERO, Duration::ZERO);
        assert!(map.sweep_due());
    }
}
