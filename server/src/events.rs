use wirecast_shared::ConnectionUid;

type ConnectionCallback = Box<dyn FnMut(ConnectionUid) + Send>;

/// Multi-subscriber event points owned by the engine. Emission happens on
/// the tick thread, so subscription from the tick thread is always safe.
pub(crate) struct ServerEvents {
    connected: Vec<ConnectionCallback>,
    disconnected: Vec<ConnectionCallback>,
}

impl ServerEvents {
    pub(crate) fn new() -> Self {
        Self {
            connected: Vec::new(),
            disconnected: Vec::new(),
        }
    }

    pub(crate) fn on_connected<F>(&mut self, callback: F)
    where
        F: FnMut(ConnectionUid) + Send + 'static,
    {
        self.connected.push(Box::new(callback));
    }

    pub(crate) fn on_disconnected<F>(&mut self, callback: F)
    where
        F: FnMut(ConnectionUid) + Send + 'static,
    {
        self.disconnected.push(Box::new(callback));
    }

    pub(crate) fn emit_connected(&mut self, uid: ConnectionUid) {
        for callback in &mut self.connected {
            callback(uid);
        }
    }

    pub(crate) fn emit_disconnected(&mut self, uid: ConnectionUid) {
        for callback in &mut self.disconnected {
            callback(uid);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn all_subscribers_fire_in_order() {
        let mut events = ServerEvents::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..2 {
            let sink = seen.clone();
            events.on_connected(move |uid| sink.lock().unwrap().push((tag, uid)));
        }
        events.emit_connected(7);

        assert_eq!(*seen.lock().unwrap(), vec![(0, 7), (1, 7)]);
    }
}
