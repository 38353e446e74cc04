//! Wire protocol
//!
//! A transport message is a run of packets, each a one-byte header followed
//! by its payload. There is no per-packet length, so decoding must consume
//! exactly the payload its header implies. Header values are the wire
//! contract and must never be renumbered.

use super::codec::{DecodeError, PacketReader, PacketWriter};
use crate::util::vec2::Vec2;

/// Client -> server packet headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientHeader {
    Spawn = 0,
    Mouse = 1,
    Movement = 2,
    MouseDown = 3,
    MouseUp = 4,
    ClientChat = 5,
    Reload = 6,
    SwitchItem = 7,
    PickupRequest = 8,
}

impl TryFrom<u8> for ClientHeader {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ClientHeader::Spawn,
            1 => ClientHeader::Mouse,
            2 => ClientHeader::Movement,
            3 => ClientHeader::MouseDown,
            4 => ClientHeader::MouseUp,
            5 => ClientHeader::ClientChat,
            6 => ClientHeader::Reload,
            7 => ClientHeader::SwitchItem,
            8 => ClientHeader::PickupRequest,
            other => return Err(DecodeError::UnknownHeader(other)),
        })
    }
}

/// Server -> client packet headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerHeader {
    SpawnSuccess = 0,
    SetCamera = 1,
    EntityCreate = 2,
    EntityUpdate = 3,
    EntityRemove = 4,
    PlayerJoin = 5,
    PlayerLeave = 6,
    EntityState = 7,
    Health = 8,
    Died = 9,
    Tps = 10,
    News = 11,
    ServerChat = 12,
    MapInit = 13,
    BiomeCreate = 14,
    InventoryUpdate = 15,
    AmmoUpdate = 16,
    BulletTrace = 17,
    ProjectileSpawnBatch = 18,
    ProjectileDestroy = 19,
    GameConfig = 20,
}

impl TryFrom<u8> for ServerHeader {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ServerHeader::*;
        const ALL: [ServerHeader; 21] = [
            SpawnSuccess,
            SetCamera,
            EntityCreate,
            EntityUpdate,
            EntityRemove,
            PlayerJoin,
            PlayerLeave,
            EntityState,
            Health,
            Died,
            Tps,
            News,
            ServerChat,
            MapInit,
            BiomeCreate,
            InventoryUpdate,
            AmmoUpdate,
            BulletTrace,
            ProjectileSpawnBatch,
            ProjectileDestroy,
            GameConfig,
        ];
        ALL.get(value as usize)
            .copied()
            .ok_or(DecodeError::UnknownHeader(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NewsKind {
    Text = 0,
    Kill = 1,
}

/// Wire id standing in for "no entity" (no killer, no camera target)
pub const NO_ENTITY: u32 = u32::MAX;

/// One decoded client request
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Spawn { name: String },
    Mouse { angle: f32 },
    Movement { direction: u8 },
    MouseDown,
    MouseUp,
    Chat { message: String },
    Reload,
    SwitchItem { slot: u8 },
    PickupRequest { entity: u32 },
}

impl ClientCommand {
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let header = ClientHeader::try_from(reader.read_u8()?)?;
        Ok(match header {
            ClientHeader::Spawn => ClientCommand::Spawn {
                name: reader.read_string()?,
            },
            ClientHeader::Mouse => ClientCommand::Mouse {
                angle: reader.read_f32()?,
            },
            ClientHeader::Movement => ClientCommand::Movement {
                direction: reader.read_u8()?,
            },
            ClientHeader::MouseDown => ClientCommand::MouseDown,
            ClientHeader::MouseUp => ClientCommand::MouseUp,
            ClientHeader::ClientChat => ClientCommand::Chat {
                message: reader.read_string()?,
            },
            ClientHeader::Reload => ClientCommand::Reload,
            ClientHeader::SwitchItem => ClientCommand::SwitchItem {
                slot: reader.read_u8()?,
            },
            ClientHeader::PickupRequest => ClientCommand::PickupRequest {
                entity: reader.read_u32()?,
            },
        })
    }

    /// Decode a whole message; any error rejects all of it
    pub fn decode_message(bytes: &[u8]) -> Result<Vec<ClientCommand>, DecodeError> {
        let mut reader = PacketReader::new(bytes);
        let mut commands = Vec::new();
        while reader.has_remaining() {
            commands.push(Self::decode(&mut reader)?);
        }
        Ok(commands)
    }

    /// Client-side encoding, used by load tools and tests
    pub fn encode(&self, w: &mut PacketWriter) {
        match self {
            ClientCommand::Spawn { name } => {
                w.write_u8(ClientHeader::Spawn as u8).write_string(name);
            }
            ClientCommand::Mouse { angle } => {
                w.write_u8(ClientHeader::Mouse as u8).write_f32(*angle);
            }
            ClientCommand::Movement { direction } => {
                w.write_u8(ClientHeader::Movement as u8).write_u8(*direction);
            }
            ClientCommand::MouseDown => {
                w.write_u8(ClientHeader::MouseDown as u8);
            }
            ClientCommand::MouseUp => {
                w.write_u8(ClientHeader::MouseUp as u8);
            }
            ClientCommand::Chat { message } => {
                w.write_u8(ClientHeader::ClientChat as u8).write_string(message);
            }
            ClientCommand::Reload => {
                w.write_u8(ClientHeader::Reload as u8);
            }
            ClientCommand::SwitchItem { slot } => {
                w.write_u8(ClientHeader::SwitchItem as u8).write_u8(*slot);
            }
            ClientCommand::PickupRequest { entity } => {
                w.write_u8(ClientHeader::PickupRequest as u8).write_u32(*entity);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityCreateRecord {
    pub id: u32,
    pub kind: u8,
    pub variant: u8,
    pub position: Vec2,
    pub rot_sin: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityUpdateRecord {
    pub id: u32,
    pub position: Vec2,
    pub rot_sin: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileSpawnRecord {
    pub id: u32,
    pub origin: Vec2,
    pub direction: Vec2,
    pub speed: f32,
    pub spawn_tick: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum News {
    Text(String),
    Kill { victim: u32, killer: u32 },
}

/// Every packet the server sends
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    SpawnSuccess { entity: u32 },
    SetCamera { target: u32 },
    EntityCreate(Vec<EntityCreateRecord>),
    EntityUpdate(Vec<EntityUpdateRecord>),
    EntityRemove(Vec<u32>),
    PlayerJoin { id: u32, name: String },
    PlayerLeave { id: u32 },
    EntityState { id: u32, flags: u8 },
    Health { normalized: f32 },
    Died,
    Tps { rate: u8 },
    News(News),
    ServerChat { speaker: u32, message: String },
    MapInit { world_size: u32 },
    BiomeCreate {
        mesh_index: u32,
        biome: u8,
        vertices: Vec<Vec2>,
        indices: Vec<u32>,
    },
    InventoryUpdate { active_slot: u8, items: Vec<u8> },
    AmmoUpdate { in_mag: u16, magazine_size: u16, reserve: u32 },
    BulletTrace { shooter: u32, start: Vec2, end: Vec2 },
    ProjectileSpawnBatch { tick: u64, spawns: Vec<ProjectileSpawnRecord> },
    ProjectileDestroy { id: u32 },
    GameConfig { json: String },
}

fn write_vec2(w: &mut PacketWriter, v: Vec2) {
    w.write_f32(v.x).write_f32(v.y);
}

fn read_vec2(r: &mut PacketReader<'_>) -> Result<Vec2, DecodeError> {
    Ok(Vec2::new(r.read_f32()?, r.read_f32()?))
}

fn read_list<T>(
    r: &mut PacketReader<'_>,
    count: usize,
    mut item: impl FnMut(&mut PacketReader<'_>) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    // Cap the preallocation by what the buffer could possibly hold
    let mut out = Vec::with_capacity(count.min(r.len().saturating_sub(r.offset())));
    for _ in 0..count {
        out.push(item(r)?);
    }
    Ok(out)
}

impl ServerPacket {
    pub fn header(&self) -> ServerHeader {
        match self {
            ServerPacket::SpawnSuccess { .. } => ServerHeader::SpawnSuccess,
            ServerPacket::SetCamera { .. } => ServerHeader::SetCamera,
            ServerPacket::EntityCreate(_) => ServerHeader::EntityCreate,
            ServerPacket::EntityUpdate(_) => ServerHeader::EntityUpdate,
            ServerPacket::EntityRemove(_) => ServerHeader::EntityRemove,
            ServerPacket::PlayerJoin { .. } => ServerHeader::PlayerJoin,
            ServerPacket::PlayerLeave { .. } => ServerHeader::PlayerLeave,
            ServerPacket::EntityState { .. } => ServerHeader::EntityState,
            ServerPacket::Health { .. } => ServerHeader::Health,
            ServerPacket::Died => ServerHeader::Died,
            ServerPacket::Tps { .. } => ServerHeader::Tps,
            ServerPacket::News(_) => ServerHeader::News,
            ServerPacket::ServerChat { .. } => ServerHeader::ServerChat,
            ServerPacket::MapInit { .. } => ServerHeader::MapInit,
            ServerPacket::BiomeCreate { .. } => ServerHeader::BiomeCreate,
            ServerPacket::InventoryUpdate { .. } => ServerHeader::InventoryUpdate,
            ServerPacket::AmmoUpdate { .. } => ServerHeader::AmmoUpdate,
            ServerPacket::BulletTrace { .. } => ServerHeader::BulletTrace,
            ServerPacket::ProjectileSpawnBatch { .. } => ServerHeader::ProjectileSpawnBatch,
            ServerPacket::ProjectileDestroy { .. } => ServerHeader::ProjectileDestroy,
            ServerPacket::GameConfig { .. } => ServerHeader::GameConfig,
        }
    }

    pub fn encode(&self, w: &mut PacketWriter) {
        w.write_u8(self.header() as u8);
        match self {
            ServerPacket::SpawnSuccess { entity } => {
                w.write_u32(*entity);
            }
            ServerPacket::SetCamera { target } => {
                w.write_u32(*target);
            }
            ServerPacket::EntityCreate(records) => {
                w.write_u32(records.len() as u32);
                for r in records {
                    w.write_u32(r.id).write_u8(r.kind).write_u8(r.variant);
                    write_vec2(w, r.position);
                    w.write_f32(r.rot_sin);
                }
            }
            ServerPacket::EntityUpdate(records) => {
                w.write_u32(records.len() as u32);
                for r in records {
                    w.write_u32(r.id);
                    write_vec2(w, r.position);
                    w.write_f32(r.rot_sin);
                }
            }
            ServerPacket::EntityRemove(ids) => {
                w.write_u32(ids.len() as u32);
                for id in ids {
                    w.write_u32(*id);
                }
            }
            ServerPacket::PlayerJoin { id, name } => {
                w.write_u32(*id).write_string(name);
            }
            ServerPacket::PlayerLeave { id } => {
                w.write_u32(*id);
            }
            ServerPacket::EntityState { id, flags } => {
                w.write_u32(*id).write_u8(*flags);
            }
            ServerPacket::Health { normalized } => {
                w.write_f32(*normalized);
            }
            ServerPacket::Died => {}
            ServerPacket::Tps { rate } => {
                w.write_u8(*rate);
            }
            ServerPacket::News(News::Text(text)) => {
                w.write_u8(NewsKind::Text as u8).write_string(text);
            }
            ServerPacket::News(News::Kill { victim, killer }) => {
                w.write_u8(NewsKind::Kill as u8)
                    .write_u32(*victim)
                    .write_u32(*killer);
            }
            ServerPacket::ServerChat { speaker, message } => {
                w.write_u32(*speaker).write_string(message);
            }
            ServerPacket::MapInit { world_size } => {
                w.write_u32(*world_size);
            }
            ServerPacket::BiomeCreate {
                mesh_index,
                biome,
                vertices,
                indices,
            } => {
                w.write_u32(*mesh_index).write_u8(*biome);
                w.write_u32(vertices.len() as u32);
                for v in vertices {
                    write_vec2(w, *v);
                }
                w.write_u32(indices.len() as u32);
                for i in indices {
                    w.write_u32(*i);
                }
            }
            ServerPacket::InventoryUpdate { active_slot, items } => {
                w.write_u8(*active_slot).write_u8(items.len() as u8);
                for item in items {
                    w.write_u8(*item);
                }
            }
            ServerPacket::AmmoUpdate {
                in_mag,
                magazine_size,
                reserve,
            } => {
                w.write_u16(*in_mag)
                    .write_u16(*magazine_size)
                    .write_u32(*reserve);
            }
            ServerPacket::BulletTrace { shooter, start, end } => {
                w.write_u32(*shooter);
                write_vec2(w, *start);
                write_vec2(w, *end);
            }
            ServerPacket::ProjectileSpawnBatch { tick, spawns } => {
                w.write_u64(*tick).write_u32(spawns.len() as u32);
                for s in spawns {
                    w.write_u32(s.id);
                    write_vec2(w, s.origin);
                    write_vec2(w, s.direction);
                    w.write_f32(s.speed).write_u64(s.spawn_tick);
                }
            }
            ServerPacket::ProjectileDestroy { id } => {
                w.write_u32(*id);
            }
            ServerPacket::GameConfig { json } => {
                w.write_string(json);
            }
        }
    }

    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let header = ServerHeader::try_from(r.read_u8()?)?;
        Ok(match header {
            ServerHeader::SpawnSuccess => ServerPacket::SpawnSuccess {
                entity: r.read_u32()?,
            },
            ServerHeader::SetCamera => ServerPacket::SetCamera {
                target: r.read_u32()?,
            },
            ServerHeader::EntityCreate => {
                let count = r.read_u32()? as usize;
                ServerPacket::EntityCreate(read_list(r, count, |r| {
                    Ok(EntityCreateRecord {
                        id: r.read_u32()?,
                        kind: r.read_u8()?,
                        variant: r.read_u8()?,
                        position: read_vec2(r)?,
                        rot_sin: r.read_f32()?,
                    })
                })?)
            }
            ServerHeader::EntityUpdate => {
                let count = r.read_u32()? as usize;
                ServerPacket::EntityUpdate(read_list(r, count, |r| {
                    Ok(EntityUpdateRecord {
                        id: r.read_u32()?,
                        position: read_vec2(r)?,
                        rot_sin: r.read_f32()?,
                    })
                })?)
            }
            ServerHeader::EntityRemove => {
                let count = r.read_u32()? as usize;
                ServerPacket::EntityRemove(read_list(r, count, |r| r.read_u32())?)
            }
            ServerHeader::PlayerJoin => ServerPacket::PlayerJoin {
                id: r.read_u32()?,
                name: r.read_string()?,
            },
            ServerHeader::PlayerLeave => ServerPacket::PlayerLeave { id: r.read_u32()? },
            ServerHeader::EntityState => ServerPacket::EntityState {
                id: r.read_u32()?,
                flags: r.read_u8()?,
            },
            ServerHeader::Health => ServerPacket::Health {
                normalized: r.read_f32()?,
            },
            ServerHeader::Died => ServerPacket::Died,
            ServerHeader::Tps => ServerPacket::Tps { rate: r.read_u8()? },
            ServerHeader::News => match r.read_u8()? {
                0 => ServerPacket::News(News::Text(r.read_string()?)),
                1 => ServerPacket::News(News::Kill {
                    victim: r.read_u32()?,
                    killer: r.read_u32()?,
                }),
                value => {
                    return Err(DecodeError::InvalidEnum {
                        kind: "news kind",
                        value,
                    })
                }
            },
            ServerHeader::ServerChat => ServerPacket::ServerChat {
                speaker: r.read_u32()?,
                message: r.read_string()?,
            },
            ServerHeader::MapInit => ServerPacket::MapInit {
                world_size: r.read_u32()?,
            },
            ServerHeader::BiomeCreate => {
                let mesh_index = r.read_u32()?;
                let biome = r.read_u8()?;
                let vertex_count = r.read_u32()? as usize;
                let vertices = read_list(r, vertex_count, read_vec2)?;
                let index_count = r.read_u32()? as usize;
                let indices = read_list(r, index_count, |r| r.read_u32())?;
                ServerPacket::BiomeCreate {
                    mesh_index,
                    biome,
                    vertices,
                    indices,
                }
            }
            ServerHeader::InventoryUpdate => {
                let active_slot = r.read_u8()?;
                let count = r.read_u8()? as usize;
                ServerPacket::InventoryUpdate {
                    active_slot,
                    items: read_list(r, count, |r| r.read_u8())?,
                }
            }
            ServerHeader::AmmoUpdate => ServerPacket::AmmoUpdate {
                in_mag: r.read_u16()?,
                magazine_size: r.read_u16()?,
                reserve: r.read_u32()?,
            },
            ServerHeader::BulletTrace => ServerPacket::BulletTrace {
                shooter: r.read_u32()?,
                start: read_vec2(r)?,
                end: read_vec2(r)?,
            },
            ServerHeader::ProjectileSpawnBatch => {
                let tick = r.read_u64()?;
                let count = r.read_u32()? as usize;
                ServerPacket::ProjectileSpawnBatch {
                    tick,
                    spawns: read_list(r, count, |r| {
                        Ok(ProjectileSpawnRecord {
                            id: r.read_u32()?,
                            origin: read_vec2(r)?,
                            direction: read_vec2(r)?,
                            speed: r.read_f32()?,
                            spawn_tick: r.read_u64()?,
                        })
                    })?,
                }
            }
            ServerHeader::ProjectileDestroy => ServerPacket::ProjectileDestroy { id: r.read_u32()? },
            ServerHeader::GameConfig => ServerPacket::GameConfig {
                json: r.read_string()?,
            },
        })
    }

    /// Split one outbound message back into packets
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<ServerPacket>, DecodeError> {
        let mut reader = PacketReader::new(bytes);
        let mut packets = Vec::new();
        while reader.has_remaining() {
            packets.push(Self::decode(&mut reader)?);
        }
        Ok(packets)
    }
}
