use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    permissions::PermissionFlags,
    transport::TransportConn,
    types::{ConnectionUid, SELF_UID},
};

/// One live connection as the directory sees it. The transport handle is
/// `None` only for the client's own "self" record.
#[derive(Clone)]
pub struct ConnectionRecord {
    uid: ConnectionUid,
    flags: Arc<PermissionFlags>,
    conn: Option<TransportConn>,
}

impl ConnectionRecord {
    pub fn uid(&self) -> ConnectionUid {
        self.uid
    }

    pub fn flags(&self) -> &Arc<PermissionFlags> {
        &self.flags
    }

    pub fn conn(&self) -> Option<TransportConn> {
        self.conn
    }
}

/// Concurrent map from connection identifier to its record. Writes happen
/// on the engine's tick thread only; reads may come from any thread that
/// holds a UID (user code querying permissions, for example).
pub struct ConnectionDirectory {
    records: DashMap<ConnectionUid, ConnectionRecord>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Adds a record; returns false if the UID is already present.
    pub fn register(
        &self,
        uid: ConnectionUid,
        initial_flags: u16,
        conn: Option<TransportConn>,
    ) -> bool {
        match self.records.entry(uid) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(ConnectionRecord {
                    uid,
                    flags: Arc::new(PermissionFlags::new(initial_flags)),
                    conn,
                });
                true
            }
        }
    }

    /// Registers the client's own record under UID 0.
    pub fn register_self(&self, initial_flags: u16) -> bool {
        self.register(SELF_UID, initial_flags, None)
    }

    pub fn remove(&self, uid: ConnectionUid) -> bool {
        self.records.remove(&uid).is_some()
    }

    pub fn lookup(&self, uid: ConnectionUid) -> Option<ConnectionRecord> {
        self.records.get(&uid).map(|record| record.clone())
    }

    pub fn contains(&self, uid: ConnectionUid) -> bool {
        self.records.contains_key(&uid)
    }

    pub fn flags(&self, uid: ConnectionUid) -> Option<Arc<PermissionFlags>> {
        self.records.get(&uid).map(|record| record.flags.clone())
    }

    pub fn conn(&self, uid: ConnectionUid) -> Option<TransportConn> {
        self.records.get(&uid).and_then(|record| record.conn)
    }

    /// Whether the connection exists and its flags satisfy `required`.
    pub fn meets(&self, uid: ConnectionUid, required: u16) -> bool {
        self.records
            .get(&uid)
            .map(|record| record.flags.meets(required))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of all known UIDs, used by broadcast at commit time.
    pub fn uids(&self) -> Vec<ConnectionUid> {
        self.records.iter().map(|record| record.uid).collect()
    }
}

impl Default for ConnectionDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_duplicates() {
        let directory = ConnectionDirectory::new();

        assert!(directory.register(1, 0, Some(TransportConn::new(10))));
        assert!(!directory.register(1, 0xFFFF, None));
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.flags(1).unwrap().load(), 0);
    }

    #[test]
    fn remove_is_idempotent() {
        let directory = ConnectionDirectory::new();
        directory.register(2, 0, Some(TransportConn::new(20)));

        assert!(directory.remove(2));
        assert!(!directory.remove(2));
        assert!(!directory.contains(2));
    }

    #[test]
    fn meets_consults_live_flags() {
        let directory = ConnectionDirectory::new();
        directory.register(3, 0, Some(TransportConn::new(30)));

        assert!(directory.meets(3, 0));
        assert!(!directory.meets(3, 0b0001));
        directory.flags(3).unwrap().set_bit(0);
        assert!(directory.meets(3, 0b0001));
        assert!(!directory.meets(99, 0));
    }

    #[test]
    fn self_record_has_no_transport_handle() {
        let directory = ConnectionDirectory::new();

        assert!(directory.register_self(0));
        assert!(!directory.register_self(0));
        let record = directory.lookup(SELF_UID).unwrap();
        assert_eq!(record.uid(), SELF_UID);
        assert!(record.conn().is_none());
    }
}
