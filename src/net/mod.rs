pub mod bridge;
pub mod codec;
pub mod framing;
pub mod game_session;
pub mod protocol;
pub mod replication;
pub mod session;
pub mod tls;
pub mod transport;
