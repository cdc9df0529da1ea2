/// Terrain data consumed by the kernel
///
/// Terrain is produced once by an external generator and handed to the
/// runner as a biome map; the kernel never synthesizes tiles, it only reads
/// them (placement checks, tillage) and carries them into full snapshots.
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    Grassland,
    Forest,
    Water,
    Mountain,
    Desert,
    Dirt,
}

impl Biome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Biome::Grassland => "grassland",
            Biome::Forest => "forest",
            Biome::Water => "water",
            Biome::Mountain => "mountain",
            Biome::Desert => "desert",
            Biome::Dirt => "dirt",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "grassland" => Some(Biome::Grassland),
            "forest" => Some(Biome::Forest),
            "water" => Some(Biome::Water),
            "mountain" => Some(Biome::Mountain),
            "desert" => Some(Biome::Desert),
            "dirt" => Some(Biome::Dirt),
            _ => None,
        }
    }
}

/// Input bundle for world initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSeed {
    /// World width in units
    pub width: f32,
    /// World height in units
    pub height: f32,
    pub tile_size: f32,
    /// Row-major biome map, `tiles_w * tiles_h` entries
    pub biome_map: Vec<Biome>,
}

impl WorldSeed {
    /// Uniform grassland world, used by the binary when no map is supplied
    pub fn flat(width: f32, height: f32, tile_size: f32) -> Self {
        let tiles_w = (width / tile_size).ceil() as usize;
        let tiles_h = (height / tile_size).ceil() as usize;
        Self {
            width,
            height,
            tile_size,
            biome_map: vec![Biome::Grassland; tiles_w * tiles_h],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Road {
    pub points: Vec<Vec2>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectLayer {
    pub name: String,
    pub objects: Vec<PlacedObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedObject {
    pub kind: String,
    pub position: Vec2,
}

/// Static tile grid plus the decorative layers carried into full snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainGrid {
    pub width: f32,
    pub height: f32,
    pub tile_size: f32,
    tiles_w: usize,
    tiles_h: usize,
    tiles: Vec<Biome>,
    pub roads: Vec<Road>,
    pub object_layers: Vec<ObjectLayer>,
}

impl Default for TerrainGrid {
    fn default() -> Self {
        Self::from_seed(&WorldSeed::flat(1000.0, 1000.0, 10.0))
    }
}

impl TerrainGrid {
    pub fn from_seed(seed: &WorldSeed) -> Self {
        let tiles_w = (seed.width / seed.tile_size).ceil() as usize;
        let tiles_h = (seed.height / seed.tile_size).ceil() as usize;
        let mut tiles = seed.biome_map.clone();
        tiles.resize(tiles_w * tiles_h, Biome::Grassland);
        Self {
            width: seed.width,
            height: seed.height,
            tile_size: seed.tile_size,
            tiles_w,
            tiles_h,
            tiles,
            roads: Vec::new(),
            object_layers: Vec::new(),
        }
    }

    pub fn tile_counts(&self) -> (usize, usize) {
        (self.tiles_w, self.tiles_h)
    }

    pub fn in_bounds(&self, pos: Vec2) -> bool {
        pos.x >= 0.0 && pos.y >= 0.0 && pos.x < self.width && pos.y < self.height
    }

    pub fn clamp_to_bounds(&self, pos: Vec2) -> Vec2 {
        Vec2::new(
            pos.x.clamp(0.0, (self.width - 1.0).max(0.0)),
            pos.y.clamp(0.0, (self.height - 1.0).max(0.0)),
        )
    }

    fn tile_index(&self, tx: usize, ty: usize) -> Option<usize> {
        if tx < self.tiles_w && ty < self.tiles_h {
            Some(ty * self.tiles_w + tx)
        } else {
            None
        }
    }

    pub fn tile_of(&self, pos: Vec2) -> Option<(usize, usize)> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some((
            (pos.x / self.tile_size) as usize,
            (pos.y / self.tile_size) as usize,
        ))
    }

    pub fn biome_at(&self, pos: Vec2) -> Option<Biome> {
        let (tx, ty) = self.tile_of(pos)?;
        self.tile_index(tx, ty).map(|i| self.tiles[i])
    }

    pub fn biome_at_tile(&self, tx: usize, ty: usize) -> Option<Biome> {
        self.tile_index(tx, ty).map(|i| self.tiles[i])
    }

    pub fn set_biome_at_tile(&mut self, tx: usize, ty: usize, biome: Biome) -> bool {
        match self.tile_index(tx, ty) {
            Some(i) => {
                self.tiles[i] = biome;
                true
            }
            None => false,
        }
    }

    pub fn tile_center(&self, tx: usize, ty: usize) -> Vec2 {
        Vec2::new(
            (tx as f32 + 0.5) * self.tile_size,
            (ty as f32 + 0.5) * self.tile_size,
        )
    }

    /// True when any water tile lies within `radius` units of `pos`
    pub fn water_within(&self, pos: Vec2, radius: f32) -> bool {
        let radius_sq = radius * radius;
        let tile_radius = (radius / self.tile_size).ceil() as i64 + 1;
        let (cx, cy) = match self.tile_of(self.clamp_to_bounds(pos)) {
            Some(t) => (t.0 as i64, t.1 as i64),
            None => return false,
        };

        for ty in (cy - tile_radius).max(0)..=(cy + tile_radius).min(self.tiles_h as i64 - 1) {
            for tx in (cx - tile_radius).max(0)..=(cx + tile_radius).min(self.tiles_w as i64 - 1) {
                if self.biome_at_tile(tx as usize, ty as usize) == Some(Biome::Water)
                    && self.tile_center(tx as usize, ty as usize).distance_squared(pos) <= radius_sq
                {
                    return true;
                }
            }
        }
        false
    }

    pub fn tiles(&self) -> &[Biome] {
        &self.tiles
    }
}
