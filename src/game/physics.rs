//! Physics collaborator
//!
//! The simulation only talks to physics through [`PhysicsEngine`]. The
//! bundled [`KinematicPhysics`] integrates velocities, pushes dynamic
//! circles out of static geometry and reports begin-touch contacts, which
//! is all a top-down shooter needs from a rigid-body engine.
//!
//! Handles are owned by the caller; passing a destroyed or foreign handle is
//! a broken contract and panics.

use hashbrown::HashMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use super::entity::Entity;
use crate::util::aabb::Aabb;
use crate::util::vec2::Vec2;

/// Edge length of a contact broadphase cell (pixels)
const BROADPHASE_CELL_SIZE: f32 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    Rect { half_width: f32, half_height: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct BodyDef {
    /// Entity reported back in queries and contacts
    pub owner: Entity,
    pub body_type: BodyType,
    pub shape: Shape,
    pub position: Vec2,
    pub rotation: f32,
    /// Collision category bits of this body
    pub category: u16,
    /// Categories this body collides with
    pub mask: u16,
    /// Sensors report contacts but are never pushed apart
    pub sensor: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub entity: Entity,
    pub point: Vec2,
    /// Distance along the ray as a fraction of the max distance
    pub fraction: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RaycastFilter {
    /// Categories the ray can stop on
    pub mask: u16,
    /// Usually the shooter
    pub ignore: Option<Entity>,
}

/// Two shapes that started touching during the last step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactPair {
    pub a: Entity,
    pub b: Entity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryHit {
    pub entity: Entity,
    pub bounds: Aabb,
}

pub trait PhysicsEngine: Send {
    fn create_body(&mut self, def: BodyDef) -> BodyHandle;
    fn destroy_body(&mut self, body: BodyHandle);

    fn position(&self, body: BodyHandle) -> Vec2;
    fn rotation(&self, body: BodyHandle) -> f32;
    fn set_velocity(&mut self, body: BodyHandle, velocity: Vec2);
    fn set_transform(&mut self, body: BodyHandle, position: Vec2, rotation: f32);

    fn enable(&mut self, body: BodyHandle);
    fn disable(&mut self, body: BodyHandle);
    fn is_enabled(&self, body: BodyHandle) -> bool;

    /// Nearest enabled shape hit by the ray, if any
    fn raycast(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
        filter: RaycastFilter,
    ) -> Option<RaycastHit>;

    /// Enabled bodies whose bounds overlap `area`
    fn query_aabb(&self, area: &Aabb) -> Vec<QueryHit>;

    /// Begin-touch pairs produced by the most recent `step`
    fn contact_events(&self) -> &[ContactPair];

    fn step(&mut self, dt: f32);
}

#[derive(Debug, Clone)]
struct Body {
    owner: Entity,
    body_type: BodyType,
    shape: Shape,
    position: Vec2,
    rotation: f32,
    velocity: Vec2,
    category: u16,
    mask: u16,
    sensor: bool,
    enabled: bool,
}

impl Body {
    fn bounds(&self) -> Aabb {
        match self.shape {
            Shape::Circle { radius } => Aabb::around_circle(self.position, radius),
            Shape::Rect {
                half_width,
                half_height,
            } => Aabb::from_center(self.position, half_width * 2.0, half_height * 2.0),
        }
    }

    fn collides_with(&self, other: &Body) -> bool {
        self.mask & other.category != 0 && other.mask & self.category != 0
    }
}

/// Minimal top-down physics: velocity integration, static pushout, contacts
#[derive(Debug, Default)]
pub struct KinematicPhysics {
    bodies: Vec<Option<Body>>,
    free: Vec<u32>,
    /// Pairs overlapping at the end of the previous step, keyed by slot
    touching: FxHashSet<(u32, u32)>,
    contacts: Vec<ContactPair>,
}

impl KinematicPhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len() - self.free.len()
    }

    fn body(&self, handle: BodyHandle) -> &Body {
        match self.bodies.get(handle.0 as usize) {
            Some(Some(body)) => body,
            _ => panic!("physics body {:?} does not exist", handle),
        }
    }

    fn body_mut(&mut self, handle: BodyHandle) -> &mut Body {
        match self.bodies.get_mut(handle.0 as usize) {
            Some(Some(body)) => body,
            _ => panic!("physics body {:?} does not exist", handle),
        }
    }

    /// Separation vector that moves circle `center`/`radius` out of `shape`
    fn pushout(center: Vec2, radius: f32, other: &Body) -> Option<Vec2> {
        match other.shape {
            Shape::Circle { radius: r } => {
                let delta = center - other.position;
                let dist = delta.length();
                let overlap = radius + r - dist;
                if overlap <= 0.0 {
                    return None;
                }
                let normal = if dist > 0.0 {
                    delta * (1.0 / dist)
                } else {
                    Vec2::UP
                };
                Some(normal * overlap)
            }
            Shape::Rect { .. } => {
                let b = other.bounds();
                let closest = Vec2::new(
                    center.x.clamp(b.min.x, b.max.x),
                    center.y.clamp(b.min.y, b.max.y),
                );
                let delta = center - closest;
                let dist = delta.length();
                if dist > 0.0 {
                    if dist >= radius {
                        return None;
                    }
                    return Some(delta * ((radius - dist) / dist));
                }
                // Center inside the box: leave through the nearest face
                let exits = [
                    (center.x - b.min.x + radius, Vec2::LEFT),
                    (b.max.x - center.x + radius, Vec2::RIGHT),
                    (center.y - b.min.y + radius, Vec2::UP),
                    (b.max.y - center.y + radius, Vec2::DOWN),
                ];
                exits
                    .iter()
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                    .map(|(depth, normal)| *normal * *depth)
            }
        }
    }

    fn overlapping(a: &Body, b: &Body) -> bool {
        match (a.shape, b.shape) {
            (Shape::Circle { radius }, _) => Self::pushout(a.position, radius, b).is_some(),
            (_, Shape::Circle { radius }) => Self::pushout(b.position, radius, a).is_some(),
            _ => {
                let (ba, bb) = (a.bounds(), b.bounds());
                ba.min.x < bb.max.x && ba.max.x > bb.min.x && ba.min.y < bb.max.y && ba.max.y > bb.min.y
            }
        }
    }

    /// Entry distance of a unit ray into a body, if within `max`
    fn ray_entry(origin: Vec2, dir: Vec2, max: f32, body: &Body) -> Option<f32> {
        match body.shape {
            Shape::Circle { radius } => {
                let to_center = body.position - origin;
                let along = to_center.dot(dir);
                let closest_sq = to_center.length_sq() - along * along;
                let r_sq = radius * radius;
                if closest_sq > r_sq {
                    return None;
                }
                let half_chord = (r_sq - closest_sq).sqrt();
                let t = if to_center.length_sq() <= r_sq {
                    0.0
                } else {
                    along - half_chord
                };
                (t >= 0.0 && t <= max).then_some(t)
            }
            Shape::Rect { .. } => {
                let b = body.bounds();
                let mut t_min = 0.0_f32;
                let mut t_max = max;
                for (o, d, lo, hi) in [
                    (origin.x, dir.x, b.min.x, b.max.x),
                    (origin.y, dir.y, b.min.y, b.max.y),
                ] {
                    if d.abs() < f32::EPSILON {
                        if o < lo || o > hi {
                            return None;
                        }
                        continue;
                    }
                    let inv = 1.0 / d;
                    let (mut t1, mut t2) = ((lo - o) * inv, (hi - o) * inv);
                    if t1 > t2 {
                        std::mem::swap(&mut t1, &mut t2);
                    }
                    t_min = t_min.max(t1);
                    t_max = t_max.min(t2);
                    if t_min > t_max {
                        return None;
                    }
                }
                Some(t_min)
            }
        }
    }
}

impl KinematicPhysics {
    /// Slot pairs sharing at least one broadphase cell, ascending
    fn candidate_pairs(&self) -> Vec<(u32, u32)> {
        let inv_cell = 1.0 / BROADPHASE_CELL_SIZE;
        let mut cells: HashMap<(i32, i32), SmallVec<[u32; 8]>> =
            HashMap::with_capacity(self.bodies.len());
        for (slot, body) in self.bodies.iter().enumerate() {
            let Some(body) = body else { continue };
            if !body.enabled {
                continue;
            }
            let b = body.bounds();
            let (x0, y0) = ((b.min.x * inv_cell).floor() as i32, (b.min.y * inv_cell).floor() as i32);
            let (x1, y1) = ((b.max.x * inv_cell).floor() as i32, (b.max.y * inv_cell).floor() as i32);
            for cy in y0..=y1 {
                for cx in x0..=x1 {
                    cells.entry((cx, cy)).or_default().push(slot as u32);
                }
            }
        }

        let mut pairs = FxHashSet::default();
        for slots in cells.values() {
            for (n, &a) in slots.iter().enumerate() {
                for &b in &slots[n + 1..] {
                    pairs.insert((a.min(b), a.max(b)));
                }
            }
        }
        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort_unstable();
        pairs
    }
}

impl PhysicsEngine for KinematicPhysics {
    fn create_body(&mut self, def: BodyDef) -> BodyHandle {
        let body = Body {
            owner: def.owner,
            body_type: def.body_type,
            shape: def.shape,
            position: def.position,
            rotation: def.rotation,
            velocity: Vec2::ZERO,
            category: def.category,
            mask: def.mask,
            sensor: def.sensor,
            enabled: def.enabled,
        };
        match self.free.pop() {
            Some(slot) => {
                self.bodies[slot as usize] = Some(body);
                BodyHandle(slot)
            }
            None => {
                self.bodies.push(Some(body));
                BodyHandle(self.bodies.len() as u32 - 1)
            }
        }
    }

    fn destroy_body(&mut self, body: BodyHandle) {
        self.body(body);
        self.bodies[body.0 as usize] = None;
        self.free.push(body.0);
        self.touching.retain(|(a, b)| *a != body.0 && *b != body.0);
    }

    fn position(&self, body: BodyHandle) -> Vec2 {
        self.body(body).position
    }

    fn rotation(&self, body: BodyHandle) -> f32 {
        self.body(body).rotation
    }

    fn set_velocity(&mut self, body: BodyHandle, velocity: Vec2) {
        self.body_mut(body).velocity = velocity;
    }

    fn set_transform(&mut self, body: BodyHandle, position: Vec2, rotation: f32) {
        let b = self.body_mut(body);
        b.position = position;
        b.rotation = rotation;
    }

    fn enable(&mut self, body: BodyHandle) {
        self.body_mut(body).enabled = true;
    }

    fn disable(&mut self, body: BodyHandle) {
        let b = self.body_mut(body);
        b.enabled = false;
        b.velocity = Vec2::ZERO;
        self.touching.retain(|(a, b)| *a != body.0 && *b != body.0);
    }

    fn is_enabled(&self, body: BodyHandle) -> bool {
        self.body(body).enabled
    }

    fn raycast(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
        filter: RaycastFilter,
    ) -> Option<RaycastHit> {
        let dir = direction.normalize();
        if dir == Vec2::ZERO || max_distance <= 0.0 {
            return None;
        }

        self.bodies
            .iter()
            .flatten()
            .filter(|b| b.enabled && b.category & filter.mask != 0)
            .filter(|b| Some(b.owner) != filter.ignore)
            .filter_map(|b| Self::ray_entry(origin, dir, max_distance, b).map(|t| (t, b.owner)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(t, entity)| RaycastHit {
                entity,
                point: origin + dir * t,
                fraction: t / max_distance,
            })
    }

    fn query_aabb(&self, area: &Aabb) -> Vec<QueryHit> {
        self.bodies
            .iter()
            .flatten()
            .filter(|b| b.enabled)
            .filter_map(|b| {
                let bounds = b.bounds();
                bounds.overlaps(area).then_some(QueryHit {
                    entity: b.owner,
                    bounds,
                })
            })
            .collect()
    }

    fn contact_events(&self) -> &[ContactPair] {
        &self.contacts
    }

    fn step(&mut self, dt: f32) {
        // Moving sensors (bullets) remember where they started this step
        let mut sweeps: SmallVec<[(u32, Vec2); 16]> = SmallVec::new();
        for (slot, body) in self.bodies.iter_mut().enumerate() {
            let Some(body) = body else { continue };
            if body.enabled && body.body_type == BodyType::Dynamic {
                let start = body.position;
                body.position += body.velocity * dt;
                if body.sensor && body.position != start {
                    sweeps.push((slot as u32, start));
                }
            }
        }

        // Push dynamic circles out of solid static shapes
        let solids: Vec<Body> = self
            .bodies
            .iter()
            .flatten()
            .filter(|b| b.enabled && !b.sensor && b.body_type == BodyType::Static)
            .cloned()
            .collect();
        for body in self.bodies.iter_mut().flatten() {
            if !body.enabled || body.sensor || body.body_type != BodyType::Dynamic {
                continue;
            }
            let Shape::Circle { radius } = body.shape else {
                continue;
            };
            for solid in &solids {
                if !body.collides_with(solid) {
                    continue;
                }
                if let Some(push) = Self::pushout(body.position, radius, solid) {
                    body.position += push;
                }
            }
        }

        let swept: FxHashSet<u32> = sweeps.iter().map(|(slot, _)| *slot).collect();
        let mut now_touching = FxHashSet::default();
        self.contacts.clear();
        for (i, j) in self.candidate_pairs() {
            if swept.contains(&i) || swept.contains(&j) {
                continue;
            }
            let (Some(a), Some(b)) = (&self.bodies[i as usize], &self.bodies[j as usize]) else {
                continue;
            };
            if !a.collides_with(b)
                || (a.body_type == BodyType::Static && b.body_type == BodyType::Static)
                || !Self::overlapping(a, b)
            {
                continue;
            }
            if !self.touching.contains(&(i, j)) {
                self.contacts.push(ContactPair {
                    a: a.owner,
                    b: b.owner,
                });
            }
            now_touching.insert((i, j));
        }

        // Swept sensors report every shape crossed along their path, nearest first
        for &(slot, start) in &sweeps {
            for (_, other) in self.sweep_crossings(slot, start) {
                let key = (slot.min(other), slot.max(other));
                if !self.touching.contains(&key) {
                    let (Some(a), Some(b)) =
                        (&self.bodies[key.0 as usize], &self.bodies[key.1 as usize])
                    else {
                        continue;
                    };
                    self.contacts.push(ContactPair {
                        a: a.owner,
                        b: b.owner,
                    });
                    now_touching.insert(key);
                } else if self.ends_overlapping(key) {
                    now_touching.insert(key);
                }
            }
        }
        self.touching = now_touching;
    }
}

impl KinematicPhysics {
    fn ends_overlapping(&self, (i, j): (u32, u32)) -> bool {
        match (&self.bodies[i as usize], &self.bodies[j as usize]) {
            (Some(a), Some(b)) => Self::overlapping(a, b),
            _ => false,
        }
    }

    /// Shapes the body in `slot` passed through on its way from `start` to
    /// its current position, as (entry distance, slot) ascending
    fn sweep_crossings(&self, slot: u32, start: Vec2) -> SmallVec<[(f32, u32); 4]> {
        let mut crossings = SmallVec::new();
        let Some(mover) = &self.bodies[slot as usize] else {
            return crossings;
        };
        let travel = mover.position - start;
        let distance = travel.length();
        if distance <= 0.0 {
            return crossings;
        }
        let dir = travel * (1.0 / distance);
        let reach = match mover.shape {
            Shape::Circle { radius } => radius,
            Shape::Rect {
                half_width,
                half_height,
            } => half_width.max(half_height),
        };

        for (other_slot, other) in self.bodies.iter().enumerate() {
            let Some(other) = other else { continue };
            if other_slot as u32 == slot || !other.enabled || !mover.collides_with(other) {
                continue;
            }
            // Grow the target by the mover's size and trace the mover's center;
            // boxes grow square, which overshoots slightly at the corners
            let mut grown = other.clone();
            grown.shape = match other.shape {
                Shape::Circle { radius } => Shape::Circle {
                    radius: radius + reach,
                },
                Shape::Rect {
                    half_width,
                    half_height,
                } => Shape::Rect {
                    half_width: half_width + reach,
                    half_height: half_height + reach,
                },
            };
            if let Some(t) = Self::ray_entry(start, dir, distance, &grown) {
                crossings.push((t, other_slot as u32));
            }
        }
        crossings.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        crossings
    }
}
