//! Terrain and biome source
//!
//! [`WorldGenerator`] is the collaborator the simulation consumes: a static
//! list of terrain meshes, biome lookups, spawn points and prop placements.
//! [`IslandWorld`] is a deterministic island: height falls off with distance
//! from the center, perturbed by per-cell hash noise, and is bucketed into
//! biomes the same way everywhere (meshes, lookups, spawning).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::constants::world::{BIOME_CELL_SIZE, SPAWN_ATTEMPTS, TILE_SIZE};
use crate::util::aabb::Aabb;
use crate::util::vec2::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Biome {
    DeepWater = 0,
    ShallowWater = 1,
    Beach = 2,
    Grassland = 3,
    Forest = 4,
    Mountain = 5,
    Peak = 6,
}

impl Biome {
    /// Bucket a normalized height in `[0, 1]`
    pub fn from_height(height: f32) -> Self {
        match height {
            h if h < 0.30 => Biome::DeepWater,
            h if h < 0.38 => Biome::ShallowWater,
            h if h < 0.42 => Biome::Beach,
            h if h < 0.50 => Biome::Grassland,
            h if h < 0.70 => Biome::Forest,
            h if h < 0.85 => Biome::Mountain,
            _ => Biome::Peak,
        }
    }

    #[inline]
    pub fn is_water(self) -> bool {
        matches!(self, Biome::DeepWater | Biome::ShallowWater)
    }
}

/// Renderable terrain polygon soup, triangles as index triples
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMesh {
    pub biome: Biome,
    pub vertices: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl TerrainMesh {
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::enclosing(&self.vertices)
    }
}

/// Static scenery requested by the world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Crate,
    Rock,
    Tree,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropPlacement {
    pub kind: PropKind,
    pub position: Vec2,
}

pub trait WorldGenerator: Send {
    /// Square world edge length in pixels
    fn size(&self) -> u32;

    fn terrain_meshes(&self) -> &[TerrainMesh];

    fn biome_at(&self, x: f32, y: f32) -> Biome;

    /// A dry point to drop a new player at
    fn spawn_point(&self, rng: &mut StdRng) -> Vec2;

    fn prop_placements(&self) -> &[PropPlacement] {
        &[]
    }
}

/// Radial island with hashed per-cell variation
#[derive(Debug, Clone)]
pub struct IslandWorld {
    size: u32,
    seed: u64,
    meshes: Vec<TerrainMesh>,
    props: Vec<PropPlacement>,
}

impl IslandWorld {
    pub fn new(size: u32, seed: u64) -> Self {
        let mut world = Self {
            size,
            seed,
            meshes: Vec::new(),
            props: Vec::new(),
        };
        world.meshes = world.build_meshes();
        world.props = world.place_props();
        world
    }

    /// Deterministic value in `[-1, 1]` for a biome cell
    fn cell_noise(&self, cx: i64, cy: i64) -> f32 {
        // splitmix64 over the seed and cell coordinates
        let mut z = self
            .seed
            .wrapping_add((cx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add((cy as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 40) as f32 / (1u64 << 23) as f32 - 1.0
    }

    fn height_at(&self, x: f32, y: f32) -> f32 {
        let half = self.size as f32 * 0.5;
        let center = Vec2::new(half, half);
        let falloff = 1.0 - (Vec2::new(x, y).distance_to(center) / half).min(1.0);
        let cx = (x / BIOME_CELL_SIZE).floor() as i64;
        let cy = (y / BIOME_CELL_SIZE).floor() as i64;
        (falloff * 0.95 + self.cell_noise(cx, cy) * 0.04).clamp(0.0, 1.0)
    }

    fn build_meshes(&self) -> Vec<TerrainMesh> {
        let tiles = (self.size as f32 / TILE_SIZE).ceil() as u32;
        let mut meshes = Vec::with_capacity((tiles * tiles) as usize);
        for ty in 0..tiles {
            for tx in 0..tiles {
                let x0 = tx as f32 * TILE_SIZE;
                let y0 = ty as f32 * TILE_SIZE;
                let x1 = (x0 + TILE_SIZE).min(self.size as f32);
                let y1 = (y0 + TILE_SIZE).min(self.size as f32);
                meshes.push(TerrainMesh {
                    biome: self.biome_at((x0 + x1) * 0.5, (y0 + y1) * 0.5),
                    vertices: vec![
                        Vec2::new(x0, y0),
                        Vec2::new(x1, y0),
                        Vec2::new(x1, y1),
                        Vec2::new(x0, y1),
                    ],
                    indices: vec![0, 1, 2, 0, 2, 3],
                });
            }
        }
        meshes
    }

    fn place_props(&self) -> Vec<PropPlacement> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ 0x5EED_0F_B10B);
        let edge = self.size as f32;
        let count = ((edge / 256.0) * (edge / 256.0) / 4.0) as usize;
        let mut props = Vec::with_capacity(count);
        for _ in 0..count {
            let position = Vec2::new(rng.gen_range(0.0..edge), rng.gen_range(0.0..edge));
            let kind = match self.biome_at(position.x, position.y) {
                Biome::Forest => PropKind::Tree,
                Biome::Mountain | Biome::Peak => PropKind::Rock,
                Biome::Beach | Biome::Grassland => PropKind::Crate,
                Biome::DeepWater | Biome::ShallowWater => continue,
            };
            props.push(PropPlacement { kind, position });
        }
        props
    }
}

impl WorldGenerator for IslandWorld {
    fn size(&self) -> u32 {
        self.size
    }

    fn terrain_meshes(&self) -> &[TerrainMesh] {
        &self.meshes
    }

    fn biome_at(&self, x: f32, y: f32) -> Biome {
        let edge = self.size as f32;
        if !(0.0..edge).contains(&x) || !(0.0..edge).contains(&y) {
            return Biome::DeepWater;
        }
        Biome::from_height(self.height_at(x, y))
    }

    fn spawn_point(&self, rng: &mut StdRng) -> Vec2 {
        let edge = self.size as f32;
        for _ in 0..SPAWN_ATTEMPTS {
            let candidate = Vec2::new(rng.gen_range(0.0..edge), rng.gen_range(0.0..edge));
            if !self.biome_at(candidate.x, candidate.y).is_water() {
                return candidate;
            }
        }
        // The center is always the highest ground
        Vec2::new(edge * 0.5, edge * 0.5)
    }

    fn prop_placements(&self) -> &[PropPlacement] {
        &self.props
    }
}
