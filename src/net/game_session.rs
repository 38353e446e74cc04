//! Game session: one full server tick
//!
//! Owns the simulation (store, physics, world, pool) and the client
//! sessions, and runs them in a fixed order every tick:
//! 1. drain opens, messages and closes from the bridge
//! 2. greet new clients, apply decoded commands
//! 3. run the system pipeline and turn its events into packets
//! 4. retire closed sessions, sweep removed entities
//! 5. replicate per client and flush through the bridge
//!
//! Everything here runs on the tick thread only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use super::bridge::{ClientId, ConcurrencyBridge};
use super::protocol::{ClientCommand, News, ServerPacket, NO_ENTITY};
use super::replication::{view_bounds, ReplicationEncoder, ReplicationStats, ReplicationView};
use super::session::{sanitize_name, ClientSession};
use crate::config::ServerConfig;
use crate::game::components::ClientLink;
use crate::game::constants::net::MAX_CHAT_LENGTH;
use crate::game::entity::{Entity, EntityError};
use crate::game::physics::{KinematicPhysics, PhysicsEngine};
use crate::game::pool::ProjectilePool;
use crate::game::store::EntityStore;
use crate::game::systems::{self, GameEvent, SystemContext};
use crate::game::weapons::{GameConfig, GunFactory};
use crate::game::world::{IslandWorld, WorldGenerator};
use crate::metrics::Metrics;
use crate::util::aabb::Aabb;
use crate::util::vec2::Vec2;

fn wire_or_none(entity: Option<Entity>) -> u32 {
    entity.map_or(NO_ENTITY, Entity::to_wire)
}

pub struct GameSession {
    bridge: Arc<ConcurrencyBridge>,
    metrics: Arc<Metrics>,

    store: EntityStore,
    physics: Box<dyn PhysicsEngine>,
    world: Box<dyn WorldGenerator>,
    pool: ProjectilePool,
    game_config: GameConfig,
    game_config_json: String,

    /// Ordered so every tick visits clients the same way
    sessions: BTreeMap<ClientId, ClientSession>,
    encoder: ReplicationEncoder,
    events: Vec<GameEvent>,
    rng: StdRng,
    tick: u64,
    tick_rate: u32,
    max_players: usize,
    last_stats: ReplicationStats,
}

impl GameSession {
    pub fn new(
        config: &ServerConfig,
        game_config: GameConfig,
        bridge: Arc<ConcurrencyBridge>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, EntityError> {
        let seed = config.world_seed.unwrap_or_else(rand::random);
        let world = IslandWorld::new(config.world_size, seed);
        let mut physics = KinematicPhysics::new();
        let mut store = EntityStore::new();

        for prop in world.prop_placements() {
            store.create_static_prop(&mut physics, prop.kind, prop.position)?;
        }
        let mut pool = ProjectilePool::new();
        pool.init(&mut store, &mut physics, config.projectile_pool_size)?;

        info!(
            "World ready: {}px, seed {}, {} meshes, {} props, {} pooled projectiles",
            config.world_size,
            seed,
            world.terrain_meshes().len(),
            world.prop_placements().len(),
            pool.capacity()
        );

        Ok(Self {
            bridge,
            metrics,
            store,
            physics: Box::new(physics),
            world: Box::new(world),
            pool,
            game_config_json: game_config.to_json_string(),
            game_config,
            sessions: BTreeMap::new(),
            encoder: ReplicationEncoder::new(),
            events: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            tick: 0,
            tick_rate: config.tick_rate,
            max_players: config.max_players,
            last_stats: ReplicationStats::default(),
        })
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn session(&self, client: ClientId) -> Option<&ClientSession> {
        self.sessions.get(&client)
    }

    pub fn client_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn player_count(&self) -> usize {
        self.sessions.values().filter(|s| s.active).count()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Record totals from the most recent replication pass
    pub fn last_replication(&self) -> ReplicationStats {
        self.last_stats
    }

    /// One full server tick; `delta` is wall-clock seconds since the last one
    pub fn step(&mut self, delta: f32) {
        let started = Instant::now();
        self.tick += 1;

        let batch = self.bridge.drain();
        for client in batch.opened {
            self.on_open(client);
        }
        for (client, bytes) in batch.inbound {
            self.on_message(client, &bytes);
        }

        self.run_systems(delta);
        self.apply_events();

        for client in batch.closed {
            self.on_close(client);
        }
        self.store.sweep_removals(self.physics.as_mut());

        let outgoing = self.replicate();
        let messages = outgoing.len() as u64;
        let sent = self.bridge.flush(outgoing);

        self.metrics.record_sent(messages, sent as u64);
        self.update_gauges();
        self.metrics.record_tick_time(started.elapsed());
    }

    fn update_gauges(&self) {
        use std::sync::atomic::Ordering::Relaxed;
        let players = self.player_count() as u64;
        self.metrics.players.store(players, Relaxed);
        self.metrics
            .spectators
            .store(self.sessions.len() as u64 - players, Relaxed);
        self.metrics
            .entities
            .store(self.store.live_count() as u64, Relaxed);
        self.metrics
            .active_projectiles
            .store(self.pool.in_flight() as u64, Relaxed);
        self.metrics
            .connections_active
            .store(self.bridge.connection_count() as u64, Relaxed);
    }

    fn broadcast(&mut self, packet: &ServerPacket, except: Option<ClientId>) {
        for session in self.sessions.values_mut() {
            if Some(session.id) != except {
                session.push(packet);
            }
        }
    }

    fn camera_target(&self, entity: Entity) -> Option<Entity> {
        self.store.cameras.get(entity).and_then(|c| c.target)
    }

    fn on_open(&mut self, client: ClientId) {
        let spectator = match self.store.create_spectator(&*self.physics, None) {
            Ok(entity) => entity,
            Err(e) => {
                warn!("No spectator for client {}: {}", client, e);
                return;
            }
        };
        self.store.client_links.insert(spectator, ClientLink { client });

        let mut session = ClientSession::new(client, spectator);
        session.push(&ServerPacket::Tps {
            rate: self.tick_rate.min(u32::from(u8::MAX)) as u8,
        });
        session.push(&ServerPacket::MapInit {
            world_size: self.world.size(),
        });
        for other in self.sessions.values().filter(|s| s.active) {
            session.push(&ServerPacket::PlayerJoin {
                id: other.entity.to_wire(),
                name: other.name.clone(),
            });
        }
        session.push(&ServerPacket::GameConfig {
            json: self.game_config_json.clone(),
        });
        session.push(&ServerPacket::SetCamera {
            target: wire_or_none(self.camera_target(spectator)),
        });

        debug!("Client {} spectating as {}", client, spectator);
        self.sessions.insert(client, session);
    }

    fn on_message(&mut self, client: ClientId, bytes: &[u8]) {
        self.metrics.record_received(bytes.len() as u64);
        if !self.sessions.contains_key(&client) {
            debug!("Ignoring message from unknown client {}", client);
            return;
        }
        // Decode everything first so a bad packet rejects the whole message
        let commands = match ClientCommand::decode_message(bytes) {
            Ok(commands) => commands,
            Err(e) => {
                warn!(client = client, "Discarding malformed message: {}", e);
                self.metrics.record_decode_error();
                return;
            }
        };
        for command in commands {
            self.apply_command(client, command);
        }
    }

    fn apply_command(&mut self, client: ClientId, command: ClientCommand) {
        let Some(session) = self.sessions.get(&client) else {
            return;
        };
        let entity = session.entity;

        match command {
            ClientCommand::Spawn { name } => self.spawn(client, &name),
            ClientCommand::Chat { message } => self.chat(client, message),
            ClientCommand::PickupRequest { entity: target } => {
                debug!(client = client, target = target, "Pickup requested, no items to pick up");
            }
            other => {
                // The rest only steer a player; spectators have no Input
                let Some(input) = self.store.inputs.get_mut(entity) else {
                    return;
                };
                match other {
                    ClientCommand::Mouse { angle } if angle.is_finite() => input.angle = angle,
                    ClientCommand::Movement { direction } => input.direction = direction & 0x0F,
                    ClientCommand::MouseDown => {
                        input.mouse_down = true;
                        input.dirty_click = true;
                    }
                    ClientCommand::MouseUp => input.mouse_down = false,
                    ClientCommand::Reload => input.reload_requested = true,
                    ClientCommand::SwitchItem { slot } => input.switch_slot = Some(slot),
                    _ => {}
                }
            }
        }
    }

    fn spawn(&mut self, client: ClientId, raw_name: &str) {
        let Some(session) = self.sessions.get(&client) else {
            return;
        };
        if session.active {
            return;
        }
        if self.player_count() >= self.max_players {
            warn!("Spawn refused for client {}: {} players", client, self.max_players);
            if let Some(session) = self.sessions.get_mut(&client) {
                session.push(&ServerPacket::News(News::Text("Server is full".to_string())));
            }
            return;
        }

        let position = self.world.spawn_point(&mut self.rng);
        let guns = GunFactory::new(&self.game_config);
        let player = match self.store.create_player(self.physics.as_mut(), &guns, position) {
            Ok(player) => player,
            Err(e) => {
                warn!("Spawn failed for client {}: {}", client, e);
                return;
            }
        };
        let name = sanitize_name(raw_name);

        let Some(session) = self.sessions.get_mut(&client) else {
            return;
        };
        let spectator = session.entity;
        self.store.client_links.remove(spectator);
        self.store.schedule_for_removal(spectator);
        self.store.client_links.insert(player, ClientLink { client });

        session.entity = player;
        session.active = true;
        session.name = name.clone();
        session.push(&ServerPacket::SpawnSuccess {
            entity: player.to_wire(),
        });
        session.push(&ServerPacket::SetCamera {
            target: player.to_wire(),
        });

        info!(client = client, entity = %player, "{} spawned at ({:.0}, {:.0})", name, position.x, position.y);
        self.broadcast(
            &ServerPacket::PlayerJoin {
                id: player.to_wire(),
                name: name.clone(),
            },
            Some(client),
        );
        self.broadcast(
            &ServerPacket::News(News::Text(format!("{} joined the game", name))),
            Some(client),
        );
    }

    fn chat(&mut self, client: ClientId, message: String) {
        if message.chars().count() > MAX_CHAT_LENGTH {
            return;
        }
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        let Some(speaker) = self.sessions.get(&client).filter(|s| s.active).map(|s| s.entity) else {
            return;
        };
        let packet = ServerPacket::ServerChat {
            speaker: speaker.to_wire(),
            message: message.to_string(),
        };
        self.broadcast(&packet, None);
    }

    fn run_systems(&mut self, delta: f32) {
        let mut ctx = SystemContext {
            store: &mut self.store,
            physics: self.physics.as_mut(),
            pool: &mut self.pool,
            events: &mut self.events,
            rng: &mut self.rng,
            delta,
            tick: self.tick,
        };
        systems::run_tick(&mut ctx);
    }

    fn apply_events(&mut self) {
        let events = std::mem::take(&mut self.events);
        for event in &events {
            match *event {
                GameEvent::BulletTrace { shooter, start, end } => {
                    self.bullet_trace(shooter, start, end)
                }
                GameEvent::PlayerDied {
                    client,
                    victim,
                    killer,
                    spectator,
                } => self.player_died(client, victim, killer, spectator),
                GameEvent::CameraRetargeted { camera, target } => {
                    let Some(link) = self.store.client_links.get(camera).copied() else {
                        continue;
                    };
                    if let Some(session) = self.sessions.get_mut(&link.client) {
                        session.push(&ServerPacket::SetCamera {
                            target: wire_or_none(target),
                        });
                    }
                }
            }
        }
        // Hand the allocation back for the next tick
        self.events = events;
        self.events.clear();
    }

    /// Traces go only to clients whose view the shot crosses
    fn bullet_trace(&mut self, shooter: Entity, start: Vec2, end: Vec2) {
        let Some(shot) = Aabb::enclosing(&[start, end]) else {
            return;
        };
        let packet = ServerPacket::BulletTrace {
            shooter: shooter.to_wire(),
            start,
            end,
        };
        for session in self.sessions.values_mut() {
            if view_bounds(&self.store, session.entity).is_some_and(|view| view.overlaps(&shot)) {
                session.push(&packet);
            }
        }
    }

    fn player_died(
        &mut self,
        client: Option<ClientId>,
        victim: Entity,
        killer: Option<Entity>,
        spectator: Entity,
    ) {
        let camera = wire_or_none(self.camera_target(spectator));
        if let Some(session) = client.and_then(|c| self.sessions.get_mut(&c)) {
            session.entity = spectator;
            session.active = false;
            session.push(&ServerPacket::Died);
            session.push(&ServerPacket::SetCamera { target: camera });
        }
        self.broadcast(
            &ServerPacket::News(News::Kill {
                victim: victim.to_wire(),
                killer: wire_or_none(killer),
            }),
            None,
        );
        self.broadcast(&ServerPacket::PlayerLeave { id: victim.to_wire() }, None);
    }

    fn on_close(&mut self, client: ClientId) {
        let Some(session) = self.sessions.remove(&client) else {
            return;
        };
        self.store.client_links.remove(session.entity);
        self.store.schedule_for_removal(session.entity);

        if session.active {
            self.broadcast(
                &ServerPacket::PlayerLeave {
                    id: session.entity.to_wire(),
                },
                None,
            );
            self.broadcast(
                &ServerPacket::News(News::Text(format!("{} left the game", session.name))),
                None,
            );
        }
        info!(client = client, "{} removed from the game", session.name);
    }

    fn replicate(&mut self) -> Vec<(ClientId, Vec<u8>)> {
        let mut outgoing = Vec::with_capacity(self.sessions.len());
        let mut totals = ReplicationStats::default();
        let mut view = ReplicationView {
            store: &mut self.store,
            physics: self.physics.as_ref(),
            world: self.world.as_ref(),
            tick: self.tick,
        };
        for session in self.sessions.values_mut() {
            totals += self.encoder.encode(session, &mut view);
            let bytes = session.take_output();
            if !bytes.is_empty() {
                outgoing.push((session.id, bytes));
            }
        }
        self.last_stats = totals;
        outgoing
    }
}
