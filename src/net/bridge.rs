//! Hand-off point between network tasks and the tick thread
//!
//! Network tasks register connections, push raw inbound messages and report
//! closes. The tick thread drains everything in one short critical section,
//! processes it without the lock, and later hands back one outbound buffer
//! per client. Closed connections are only forgotten inside `flush`, so the
//! table never changes underneath a tick.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub type ClientId = u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection is closed")]
    Closed,
    #[error("Send failed: {0}")]
    Send(String),
}

/// Outbound half of one client connection
pub trait Transport: Send + Sync {
    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;
}

struct Connection {
    transport: Arc<dyn Transport>,
    closed: bool,
}

#[derive(Default)]
struct Table {
    connections: HashMap<ClientId, Connection>,
    inbound: Vec<(ClientId, Vec<u8>)>,
    opened: Vec<ClientId>,
    closed: Vec<ClientId>,
    next_id: ClientId,
}

/// Everything that happened on the network since the previous drain
#[derive(Debug, Default)]
pub struct TickBatch {
    pub opened: Vec<ClientId>,
    pub closed: Vec<ClientId>,
    pub inbound: Vec<(ClientId, Vec<u8>)>,
}

#[derive(Default)]
pub struct ConcurrencyBridge {
    table: Mutex<Table>,
}

impl ConcurrencyBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its id
    pub fn connect(&self, transport: Arc<dyn Transport>) -> ClientId {
        let mut table = self.table.lock();
        table.next_id = table.next_id.wrapping_add(1);
        let id = table.next_id;
        table.connections.insert(
            id,
            Connection {
                transport,
                closed: false,
            },
        );
        table.opened.push(id);
        info!("Client {} connected", id);
        id
    }

    /// Queue one raw inbound message; dropped if the client is gone
    pub fn enqueue(&self, client: ClientId, bytes: Vec<u8>) -> bool {
        let mut table = self.table.lock();
        match table.connections.get(&client) {
            Some(conn) if !conn.closed => {
                table.inbound.push((client, bytes));
                true
            }
            _ => {
                debug!("Dropping message from unknown or closed client {}", client);
                false
            }
        }
    }

    /// Mark closed and discard its queued input; removal happens at the next flush
    pub fn disconnect(&self, client: ClientId) {
        let mut table = self.table.lock();
        let Some(conn) = table.connections.get_mut(&client) else {
            return;
        };
        if conn.closed {
            return;
        }
        conn.closed = true;
        table.inbound.retain(|(id, _)| *id != client);
        table.closed.push(client);
        info!("Client {} disconnected", client);
    }

    /// Take every pending open, close and message in one lock
    pub fn drain(&self) -> TickBatch {
        let mut table = self.table.lock();
        TickBatch {
            opened: std::mem::take(&mut table.opened),
            closed: std::mem::take(&mut table.closed),
            inbound: std::mem::take(&mut table.inbound),
        }
    }

    /// Deliver outbound buffers, then forget closed connections.
    /// Returns the number of bytes handed to transports.
    pub fn flush(&self, outgoing: Vec<(ClientId, Vec<u8>)>) -> usize {
        let mut table = self.table.lock();
        let mut sent = 0;
        for (client, bytes) in outgoing {
            if bytes.is_empty() {
                continue;
            }
            let Some(conn) = table.connections.get(&client) else {
                continue;
            };
            if conn.closed {
                continue;
            }
            let len = bytes.len();
            match conn.transport.send(bytes) {
                Ok(()) => sent += len,
                Err(e) => warn!("Send to client {} failed: {}", client, e),
            }
        }
        // Only sweep ids the tick thread has already drained as closed
        let pending = std::mem::take(&mut table.closed);
        table
            .connections
            .retain(|id, conn| !conn.closed || pending.contains(id));
        table.closed = pending;
        sent
    }

    pub fn connection_count(&self) -> usize {
        self.table
            .lock()
            .connections
            .values()
            .filter(|c| !c.closed)
            .count()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Transport that records every send
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingTransport {
        pub fn take(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut *self.sent.lock())
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
            self.sent.lock().push(bytes);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingTransport;
    use super::*;

    #[test]
    fn test_drain_takes_everything_once() {
        let bridge = ConcurrencyBridge::new();
        let a = bridge.connect(Arc::new(RecordingTransport::default()));
        let b = bridge.connect(Arc::new(RecordingTransport::default()));
        assert!(bridge.enqueue(a, vec![1]));
        assert!(bridge.enqueue(b, vec![2]));
        assert!(bridge.enqueue(a, vec![3]));

        let batch = bridge.drain();
        assert_eq!(batch.opened, vec![a, b]);
        assert_eq!(batch.inbound, vec![(a, vec![1]), (b, vec![2]), (a, vec![3])]);

        let empty = bridge.drain();
        assert!(empty.opened.is_empty() && empty.inbound.is_empty());
    }

    #[test]
    fn test_unknown_client_is_ignored() {
        let bridge = ConcurrencyBridge::new();
        assert!(!bridge.enqueue(99, vec![1]));
        assert!(bridge.drain().inbound.is_empty());
    }

    #[test]
    fn test_disconnect_purges_queued_input() {
        let bridge = ConcurrencyBridge::new();
        let a = bridge.connect(Arc::new(RecordingTransport::default()));
        let b = bridge.connect(Arc::new(RecordingTransport::default()));
        bridge.enqueue(a, vec![1]);
        bridge.enqueue(b, vec![2]);
        bridge.disconnect(a);
        bridge.disconnect(a);
        assert!(!bridge.enqueue(a, vec![3]));

        let batch = bridge.drain();
        assert_eq!(batch.closed, vec![a]);
        assert_eq!(batch.inbound, vec![(b, vec![2])]);
        assert_eq!(bridge.connection_count(), 1);
    }

    #[test]
    fn test_flush_skips_closed_and_sweeps() {
        let bridge = ConcurrencyBridge::new();
        let ta = Arc::new(RecordingTransport::default());
        let tb = Arc::new(RecordingTransport::default());
        let a = bridge.connect(ta.clone());
        let b = bridge.connect(tb.clone());
        bridge.disconnect(b);
        bridge.drain();

        let sent = bridge.flush(vec![(a, vec![1, 2]), (b, vec![3]), (a, vec![])]);
        assert_eq!(sent, 2);
        assert_eq!(ta.take(), vec![vec![1, 2]]);
        assert!(tb.take().is_empty());

        // Swept: later output for b goes nowhere
        bridge.flush(vec![(b, vec![4])]);
        assert!(tb.take().is_empty());
    }

    #[test]
    fn test_close_not_swept_before_tick_sees_it() {
        let bridge = ConcurrencyBridge::new();
        let a = bridge.connect(Arc::new(RecordingTransport::default()));
        bridge.drain();
        bridge.disconnect(a);
        bridge.flush(Vec::new());

        // The close is still reported to the tick thread
        assert_eq!(bridge.drain().closed, vec![a]);
    }

    #[test]
    fn test_concurrent_enqueue() {
        let bridge = Arc::new(ConcurrencyBridge::new());
        let id = bridge.connect(Arc::new(RecordingTransport::default()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bridge = bridge.clone();
                std::thread::spawn(move || {
                    for i in 0..100u8 {
                        bridge.enqueue(id, vec![i]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(bridge.drain().inbound.len(), 400);
    }
}
