/// World bootstrap: terrain intake, resource and animal seeding, starter
/// zones
///
/// Terrain arrives pre-generated as a biome map. Seeding walks the tile
/// grid once and places nodes with biome-dependent densities using the
/// world-seeded RNG, so the same seed and map always produce the same world.
use bevy::prelude::*;
use rand::Rng;

use super::inventory::{Stockpile, StockpileKind};
use super::state::WorldState;
use super::terrain::{Biome, TerrainGrid, WorldSeed};
use super::types::{NodeKind, ResourceKind, WorldResourceNode, Zone, ZoneBounds, ZoneKind};
use super::SimRng;

const BUSH_DENSITY: f64 = 0.04;
const TREE_DENSITY_GRASS: f64 = 0.03;
const TREE_DENSITY_FOREST: f64 = 0.18;
const ROCK_DENSITY: f64 = 0.10;
const ORE_DENSITY: f64 = 0.02;
const ANIMALS_PER_1K_TILES: usize = 6;

const ANIMAL_SPECIES: [&str; 3] = ["deer", "rabbit", "boar"];

/// Apply a world seed: install terrain, scatter resource nodes and animals,
/// then lay down the starter settlement zones.
pub fn initialize_world(state: &mut WorldState, seed: &WorldSeed, rng: &mut SimRng) {
    state.terrain = TerrainGrid::from_seed(seed);

    seed_resource_nodes(state, rng);
    seed_animals(state, rng);
    seed_starter_zones(state);

    info!(
        "🗺️ World initialized: {}x{} units, {} resource nodes, {} animals, {} zones",
        state.terrain.width,
        state.terrain.height,
        state.world_resources.len(),
        state.animals().count(),
        state.zones.len()
    );
}

fn seed_resource_nodes(state: &mut WorldState, rng: &mut SimRng) {
    let (tiles_w, tiles_h) = state.terrain.tile_counts();
    let mut placements: Vec<(NodeKind, Vec2)> = Vec::new();

    for ty in 0..tiles_h {
        for tx in 0..tiles_w {
            let Some(biome) = state.terrain.biome_at_tile(tx, ty) else {
                continue;
            };
            let center = state.terrain.tile_center(tx, ty);
            let roll: f64 = rng.gen();

            let node = match biome {
                Biome::Grassland => {
                    if roll < BUSH_DENSITY {
                        Some(NodeKind::BerryBush)
                    } else if roll < BUSH_DENSITY + TREE_DENSITY_GRASS {
                        Some(NodeKind::Tree)
                    } else {
                        None
                    }
                }
                Biome::Forest => {
                    if roll < TREE_DENSITY_FOREST {
                        Some(NodeKind::Tree)
                    } else if roll < TREE_DENSITY_FOREST + BUSH_DENSITY {
                        Some(NodeKind::BerryBush)
                    } else {
                        None
                    }
                }
                Biome::Mountain => {
                    if roll < ROCK_DENSITY {
                        Some(NodeKind::Rock)
                    } else if roll < ROCK_DENSITY + ORE_DENSITY {
                        Some(NodeKind::OreVein)
                    } else {
                        None
                    }
                }
                Biome::Water => {
                    // Water holes sit on the shoreline tile itself
                    if roll < 0.01 {
                        Some(NodeKind::WaterHole)
                    } else {
                        None
                    }
                }
                Biome::Desert | Biome::Dirt => None,
            };

            if let Some(kind) = node {
                placements.push((kind, center));
            }
        }
    }

    for (kind, position) in placements {
        spawn_node(state, kind, position);
    }
}

/// Insert one node with its default richness
pub fn spawn_node(state: &mut WorldState, kind: NodeKind, position: Vec2) -> super::EntityId {
    let max_amount = match kind {
        NodeKind::BerryBush => 40,
        NodeKind::Tree => 80,
        NodeKind::Rock => 120,
        NodeKind::WaterHole => 500,
        NodeKind::OreVein => 60,
    };
    let id = state.ids.next("node");
    state.add_resource_node(WorldResourceNode {
        id: id.clone(),
        kind,
        position,
        amount: max_amount,
        max_amount,
    });
    id
}

fn seed_animals(state: &mut WorldState, rng: &mut SimRng) {
    let (tiles_w, tiles_h) = state.terrain.tile_counts();
    let count = (tiles_w * tiles_h * ANIMALS_PER_1K_TILES) / 1000;

    for _ in 0..count.max(2) {
        let position = random_land_position(&state.terrain, rng);
        let species = ANIMAL_SPECIES[rng.gen_range(0..ANIMAL_SPECIES.len())];
        state.spawn_animal(species, position);
    }
}

/// Rejection-sample a non-water position; falls back to the map center
pub fn random_land_position(terrain: &TerrainGrid, rng: &mut SimRng) -> Vec2 {
    for _ in 0..32 {
        let candidate = Vec2::new(
            rng.gen_range(0.0..terrain.width),
            rng.gen_range(0.0..terrain.height),
        );
        if terrain.biome_at(candidate) != Some(Biome::Water) {
            return candidate;
        }
    }
    Vec2::new(terrain.width / 2.0, terrain.height / 2.0)
}

/// Starter settlement: a storage zone with its stockpile, a rest shelter and
/// a social ground near the map center
fn seed_starter_zones(state: &mut WorldState) {
    let center = Vec2::new(state.terrain.width / 2.0, state.terrain.height / 2.0);

    let storage_id = state.ids.next("zone");
    let storage = Zone::new(
        storage_id.clone(),
        ZoneKind::Storage,
        ZoneBounds::new(center.x - 40.0, center.y - 40.0, 80.0, 80.0),
    );
    state.zones.insert(storage_id.clone(), storage);

    let stockpile_id = state.ids.next("stockpile");
    let mut stockpile = Stockpile::new(stockpile_id.clone(), storage_id, StockpileKind::General);
    stockpile.inventory.add(ResourceKind::Wood, 60);
    stockpile.inventory.add(ResourceKind::Stone, 30);
    stockpile.inventory.add(ResourceKind::Food, 40);
    state.stockpiles.insert(stockpile_id, stockpile);

    let rest_id = state.ids.next("zone");
    let mut rest = Zone::new(
        rest_id.clone(),
        ZoneKind::Rest,
        ZoneBounds::new(center.x + 60.0, center.y - 50.0, 100.0, 100.0),
    );
    rest.meta.label = Some("starter shelter".to_string());
    rest.meta.durability = Some(100.0);
    rest.meta.max_durability = Some(100.0);
    state.zones.insert(rest_id, rest);

    let social_id = state.ids.next("zone");
    let social = Zone::new(
        social_id.clone(),
        ZoneKind::Social,
        ZoneBounds::new(center.x - 50.0, center.y + 60.0, 90.0, 90.0),
    );
    state.zones.insert(social_id, social);

    state.mark_dirty(super::Section::Zones);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_initialize_world_is_deterministic() {
        let seed = WorldSeed::flat(400.0, 400.0, 10.0);

        let mut a = WorldState::new(7);
        let mut rng_a = SimRng::seed_from_u64(7);
        initialize_world(&mut a, &seed, &mut rng_a);

        let mut b = WorldState::new(7);
        let mut rng_b = SimRng::seed_from_u64(7);
        initialize_world(&mut b, &seed, &mut rng_b);

        assert_eq!(a.world_resources.len(), b.world_resources.len());
        assert_eq!(a.animals().count(), b.animals().count());
        let ids_a: Vec<_> = a.world_resources.keys().cloned().collect();
        let ids_b: Vec<_> = b.world_resources.keys().cloned().collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_starter_zones_present() {
        let mut state = WorldState::new(3);
        let mut rng = SimRng::seed_from_u64(3);
        initialize_world(&mut state, &WorldSeed::flat(300.0, 300.0, 10.0), &mut rng);

        assert!(state.zones_of_kind(ZoneKind::Storage).next().is_some());
        assert!(state.zones_of_kind(ZoneKind::Rest).next().is_some());
        assert!(state.zones_of_kind(ZoneKind::Social).next().is_some());
        assert_eq!(state.stockpiles.len(), 1);
        let stockpile = state.stockpiles.values().next().unwrap();
        assert!(stockpile.inventory.amount(ResourceKind::Wood) > 0);
    }

    #[test]
    fn test_random_land_position_avoids_water() {
        let mut seed = WorldSeed::flat(100.0, 100.0, 10.0);
        // All water except one tile
        for biome in seed.biome_map.iter_mut() {
            *biome = Biome::Water;
        }
        seed.biome_map[0] = Biome::Grassland;
        let terrain = TerrainGrid::from_seed(&seed);

        let mut rng = SimRng::seed_from_u64(11);
        for _ in 0..10 {
            let pos = random_land_position(&terrain, &mut rng);
            // Either found the single land tile or fell back to center
            assert!(terrain.in_bounds(pos));
        }
    }
}
