//! WebTransport server
//!
//! Each session opens one bidirectional stream. Inbound frames go straight
//! into the bridge; outbound buffers come back through a channel drained by
//! a per-connection writer task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wtransport::endpoint::IncomingSession;
use wtransport::Endpoint;

use crate::config::ServerConfig;
use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::net::bridge::{ClientId, ConcurrencyBridge, Transport, TransportError};
use crate::net::framing::{read_message, write_message, FramingError};
use crate::net::tls::TlsConfig;

/// Outbound half handed to the bridge
pub struct StreamTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl StreamTransport {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl Transport for StreamTransport {
    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.tx.send(bytes).map_err(|_| TransportError::Closed)
    }
}

pub struct WebTransportServer {
    bind: SocketAddr,
    tls: TlsConfig,
    bridge: Arc<ConcurrencyBridge>,
}

impl WebTransportServer {
    pub fn new(config: &ServerConfig, tls: TlsConfig, bridge: Arc<ConcurrencyBridge>) -> Self {
        Self {
            bind: SocketAddr::new(config.bind_address, config.port),
            tls,
            bridge,
        }
    }

    pub fn cert_hash(&self) -> &str {
        self.tls.cert_hash()
    }

    /// Accept sessions until the task is dropped
    pub async fn run(self) -> anyhow::Result<()> {
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_address(self.bind)
            .with_identity(self.tls.identity)
            .keep_alive_interval(Some(Duration::from_secs(3)))
            .build();

        let server = Endpoint::server(server_config)?;
        info!("WebTransport server listening on {}", self.bind);

        loop {
            let incoming = server.accept().await;
            let bridge = self.bridge.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, bridge).await {
                    warn!("Connection error: {}", e);
                }
            });
        }
    }
}

async fn handle_connection(
    incoming: IncomingSession,
    bridge: Arc<ConcurrencyBridge>,
) -> anyhow::Result<()> {
    let request = incoming.await?;
    debug!(
        "Session request from {}, path {}",
        request.authority(),
        request.path()
    );
    let connection = request.accept().await?;
    let (mut send, mut recv) = connection.accept_bi().await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let client = bridge.connect(Arc::new(StreamTransport::new(tx)));

    let writer_bridge = bridge.clone();
    let writer = tokio::spawn(async move {
        // Ends once the bridge forgets the connection and drops the sender
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = write_message(&mut send, &bytes).await {
                debug!("Write to client {} failed: {}", client, e);
                writer_bridge.disconnect(client);
                break;
            }
        }
    });

    read_loop(client, &mut recv, &bridge).await;
    bridge.disconnect(client);
    writer.abort();
    drop(connection);
    Ok(())
}

/// Forward frames until the peer closes, errs or breaks the size limit
async fn read_loop<R>(client: ClientId, recv: &mut R, bridge: &ConcurrencyBridge)
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        match read_message(recv, MAX_MESSAGE_SIZE).await {
            Ok(bytes) => {
                if !bridge.enqueue(client, bytes) {
                    break;
                }
            }
            Err(FramingError::ConnectionClosed) => break,
            Err(FramingError::MessageTooLarge(len, max)) => {
                warn!(
                    "Client {} sent {} byte message (max {}), closing",
                    client, len, max
                );
                break;
            }
            Err(e) => {
                debug!("Read from client {} failed: {}", client, e);
                break;
            }
        }
    }
}
