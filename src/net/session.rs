//! Per-client session state
//!
//! A session lives on the tick thread only. It records which entity the
//! client controls, buffers the packets produced for it during one tick,
//! and remembers what the client saw last tick so replication can send
//! differences.

use rustc_hash::{FxHashMap, FxHashSet};

use super::bridge::ClientId;
use super::codec::PacketWriter;
use super::protocol::ServerPacket;
use crate::game::constants::player::{DEFAULT_NAME, MAX_NAME_LENGTH};
use crate::game::entity::Entity;

#[derive(Debug)]
pub struct ClientSession {
    pub id: ClientId,
    pub name: String,
    /// Playing rather than spectating
    pub active: bool,
    /// Player or spectator, exactly one at any time
    pub entity: Entity,
    writer: PacketWriter,

    pub previous_visible: FxHashSet<Entity>,
    /// Visible projectiles with the spawn tick the client was told about
    pub previous_projectiles: FxHashMap<Entity, u64>,
    /// Terrain meshes already sent; the client keeps them forever
    pub previous_meshes: FxHashSet<usize>,
}

impl ClientSession {
    pub fn new(id: ClientId, spectator: Entity) -> Self {
        Self {
            id,
            name: DEFAULT_NAME.to_string(),
            active: false,
            entity: spectator,
            writer: PacketWriter::with_capacity(1024),
            previous_visible: FxHashSet::default(),
            previous_projectiles: FxHashMap::default(),
            previous_meshes: FxHashSet::default(),
        }
    }

    pub fn push(&mut self, packet: &ServerPacket) {
        packet.encode(&mut self.writer);
    }

    pub fn pending_bytes(&self) -> usize {
        self.writer.len()
    }

    /// Swap the tick's output for an empty buffer
    pub fn take_output(&mut self) -> Vec<u8> {
        self.writer.take()
    }
}

/// Make a display name safe to broadcast
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | '&'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_NAME_LENGTH).collect();
    let name = truncated.trim_end();
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}
