//! Spatial world model
//!
//! Static road network, sidewalks, buildings and bounds. The layout is handed
//! in once at load time (or generated here as a fallback) and never changes
//! afterwards; the only mutable data is each building's LOD flag.

use std::collections::HashMap;

use glam::Vec3;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::collision::Aabb;
use crate::consts::*;

/// Axis a road or path runs along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Runs along X (constant Z)
    Horizontal,
    /// Runs along Z (constant X)
    Vertical,
}

impl Orientation {
    pub fn of(direction: Vec3) -> Self {
        if direction.x.abs() >= direction.z.abs() {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }

    /// Coordinate that stays constant along this orientation
    #[inline]
    pub fn lateral(&self, p: Vec3) -> f32 {
        match self {
            Orientation::Horizontal => p.z,
            Orientation::Vertical => p.x,
        }
    }

    /// Coordinate that varies along this orientation
    #[inline]
    pub fn longitudinal(&self, p: Vec3) -> f32 {
        match self {
            Orientation::Horizontal => p.x,
            Orientation::Vertical => p.z,
        }
    }
}

/// Lane identifier. Right-hand lanes travel toward the positive axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lane {
    Right,
    Left,
}

/// One directed lane between two neighbouring intersections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadSegment {
    pub start: Vec3,
    pub end: Vec3,
    /// Unit travel direction
    pub direction: Vec3,
    pub lane: Lane,
    pub orientation: Orientation,
}

impl RoadSegment {
    pub fn new(start: Vec3, end: Vec3, lane: Lane) -> Self {
        let direction = (end - start).normalize_or_zero();
        Self {
            start,
            end,
            direction,
            lane,
            orientation: Orientation::of(direction),
        }
    }

    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }

    /// Centre line coordinate of the road this lane belongs to
    pub fn road_coord(&self) -> f32 {
        let lane_coord = self.orientation.lateral(self.start);
        // Right lanes sit on the negative side of the centre line
        match self.lane {
            Lane::Right => lane_coord + LANE_OFFSET,
            Lane::Left => lane_coord - LANE_OFFSET,
        }
    }
}

/// Centre line of a whole road, derived from its lanes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadLine {
    pub orientation: Orientation,
    /// Constant coordinate of the centre line (Z for horizontal roads)
    pub coord: f32,
    /// Extent along the road
    pub from: f32,
    pub to: f32,
}

/// A sidewalk lane pedestrians follow from start to end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkingPath {
    pub start: Vec3,
    pub end: Vec3,
    pub direction: Vec3,
    pub orientation: Orientation,
}

impl WalkingPath {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        let direction = (end - start).normalize_or_zero();
        Self {
            start,
            end,
            direction,
            orientation: Orientation::of(direction),
        }
    }
}

/// Building render detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildingDetail {
    #[default]
    High,
    Low,
}

/// A static building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: u32,
    /// Collision box, cached at placement and never recomputed
    bounds: Aabb,
    pub detail: BuildingDetail,
    /// Waiting in the LOD restore queue
    pub queued_for_restore: bool,
}

impl Building {
    pub fn new(id: u32, bounds: Aabb) -> Self {
        Self {
            id,
            bounds,
            detail: BuildingDetail::High,
            queued_for_restore: false,
        }
    }

    #[inline]
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }
}

/// Square world bounds centred on the origin
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorldBounds {
    pub half_extent: f32,
}

impl WorldBounds {
    pub fn contains(&self, p: Vec3) -> bool {
        p.x.abs() <= self.half_extent && p.z.abs() <= self.half_extent
    }

    /// Clamp XZ into `half_extent - margin`
    pub fn clamp(&self, p: Vec3, margin: f32) -> Vec3 {
        let limit = self.half_extent - margin;
        Vec3::new(p.x.clamp(-limit, limit), p.y, p.z.clamp(-limit, limit))
    }
}

/// Raw layout produced by a world generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldLayout {
    pub segments: Vec<RoadSegment>,
    /// Building collision boxes
    pub buildings: Vec<Aabb>,
    /// Sidewalks; derived from the roads when empty
    pub paths: Vec<WalkingPath>,
}

/// Uniform grid over building footprints for point and box queries
#[derive(Debug, Clone, Default)]
struct BuildingGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
}

impl BuildingGrid {
    const CELL_SIZE: f32 = 40.0;

    fn build(buildings: &[Building]) -> Self {
        let mut grid = Self {
            cell_size: Self::CELL_SIZE,
            cells: HashMap::new(),
        };
        for (i, b) in buildings.iter().enumerate() {
            let (x0, z0) = grid.cell_of(b.bounds.min);
            let (x1, z1) = grid.cell_of(b.bounds.max);
            for cx in x0..=x1 {
                for cz in z0..=z1 {
                    grid.cells.entry((cx, cz)).or_default().push(i);
                }
            }
        }
        grid
    }

    fn cell_of(&self, p: Vec3) -> (i32, i32) {
        (
            (p.x / self.cell_size).floor() as i32,
            (p.z / self.cell_size).floor() as i32,
        )
    }

    fn at_point(&self, p: Vec3) -> &[usize] {
        self.cells
            .get(&self.cell_of(p))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn in_box(&self, aabb: &Aabb) -> Vec<usize> {
        let (x0, z0) = self.cell_of(aabb.min);
        let (x1, z1) = self.cell_of(aabb.max);
        let mut out = Vec::new();
        for cx in x0..=x1 {
            for cz in z0..=z1 {
                if let Some(ids) = self.cells.get(&(cx, cz)) {
                    out.extend_from_slice(ids);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// The static city
#[derive(Debug, Clone)]
pub struct World {
    pub bounds: WorldBounds,
    roads: Vec<RoadLine>,
    segments: Vec<RoadSegment>,
    paths: Vec<WalkingPath>,
    buildings: Vec<Building>,
    grid: BuildingGrid,
}

/// Road strip half width used when keeping buildings off the street
const ROAD_CLEARANCE: f32 = 12.0;
/// Sidewalks span this far either side of the origin
const SIDEWALK_HALF_SPAN: f32 = 250.0;
/// Block size of the fallback sidewalk grid
const FALLBACK_BLOCK: f32 = 60.0;
/// Buildings attempted by the default generator
const GENERATED_BUILDINGS: usize = 200;

impl World {
    /// Build the world from a generator's layout, falling back to a
    /// synthetic grid for any missing road or sidewalk data.
    pub fn from_layout(layout: WorldLayout) -> Self {
        let WorldLayout {
            mut segments,
            buildings,
            mut paths,
        } = layout;

        if segments.is_empty() {
            log::warn!("No road segments supplied; generating fallback grid");
            segments = grid_segments();
        }
        let roads = derive_road_lines(&segments);

        if paths.is_empty() {
            paths = sidewalks_along(&roads);
            if paths.is_empty() {
                log::warn!("No sidewalks derivable; generating fallback paths");
                paths = fallback_sidewalks();
            }
        }

        let buildings: Vec<Building> = buildings
            .into_iter()
            .enumerate()
            .map(|(i, b)| Building::new(i as u32 + 1, b))
            .collect();
        let grid = BuildingGrid::build(&buildings);

        log::info!(
            "World ready: {} roads, {} lanes, {} sidewalks, {} buildings",
            roads.len(),
            segments.len(),
            paths.len(),
            buildings.len()
        );

        Self {
            bounds: WorldBounds {
                half_extent: WORLD_HALF_EXTENT,
            },
            roads,
            segments,
            paths,
            buildings,
            grid,
        }
    }

    /// Generate the default city: a 9x9 road grid with buildings
    /// scattered between the roads.
    pub fn generate(seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed ^ 0x5eed_c17e);
        let segments = grid_segments();
        let roads = derive_road_lines(&segments);

        let mut boxes: Vec<Aabb> = Vec::with_capacity(GENERATED_BUILDINGS);
        for _ in 0..GENERATED_BUILDINGS {
            let width = rng.random_range(8.0..23.0);
            let height = rng.random_range(15.0..45.0);
            let depth = rng.random_range(8.0..23.0);

            let placed = (0..50).find_map(|_| {
                let x = rng.random_range(-450.0..450.0);
                let z = rng.random_range(-450.0..450.0);
                let footprint = Aabb::from_footprint(
                    Vec3::new(x, 0.0, z),
                    width * 0.5,
                    depth * 0.5,
                    height,
                )
                .expanded(0.5);
                let clear = !footprint_on_road(&roads, &footprint)
                    && !footprint.contains_point(Vec3::new(SHOP_POSITION.x, 1.0, SHOP_POSITION.z))
                    && boxes.iter().all(|b| !b.intersects(&footprint));
                clear.then_some(footprint)
            });
            if let Some(footprint) = placed {
                boxes.push(footprint);
            }
        }

        Self::from_layout(WorldLayout {
            segments,
            buildings: boxes,
            paths: Vec::new(),
        })
    }

    pub fn roads(&self) -> &[RoadLine] {
        &self.roads
    }

    pub fn segments(&self) -> &[RoadSegment] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&RoadSegment> {
        self.segments.get(index)
    }

    pub fn paths(&self) -> &[WalkingPath] {
        &self.paths
    }

    pub fn path(&self, index: usize) -> Option<&WalkingPath> {
        self.paths.get(index)
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    /// Mutable access for LOD bookkeeping (bounds stay private)
    pub fn buildings_mut(&mut self) -> &mut [Building] {
        &mut self.buildings
    }

    /// Segments whose start point lies within `radius` of `pos`
    pub fn segments_starting_near(
        &self,
        pos: Vec3,
        radius: f32,
    ) -> impl Iterator<Item = (usize, &RoadSegment)> {
        let r2 = radius * radius;
        self.segments
            .iter()
            .enumerate()
            .filter(move |(_, s)| crate::planar_distance_sq(s.start, pos) < r2)
    }

    /// Nearest road running across `orientation` within `search` of `pos`
    pub fn perpendicular_road_near(
        &self,
        pos: Vec3,
        orientation: Orientation,
        search: f32,
    ) -> Option<&RoadLine> {
        self.roads
            .iter()
            .filter(|r| r.orientation != orientation)
            .map(|r| ((r.orientation.lateral(pos) - r.coord).abs(), r))
            .filter(|(d, _)| *d < search)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, r)| r)
    }

    /// Whether a ground point lies on a road strip
    pub fn is_on_road(&self, p: Vec3) -> bool {
        self.roads.iter().any(|r| {
            let along = r.orientation.longitudinal(p);
            (r.orientation.lateral(p) - r.coord).abs() < ROAD_CLEARANCE
                && along >= r.from - 5.0
                && along <= r.to + 5.0
        })
    }

    /// Nudge a sidewalk position sideways if it landed on a carriageway
    pub fn push_off_road(&self, mut p: Vec3) -> Vec3 {
        for r in &self.roads {
            let d = r.orientation.lateral(p) - r.coord;
            if d.abs() < ROAD_HALF_WIDTH + 0.5 {
                let sign = if d >= 0.0 { 1.0 } else { -1.0 };
                let pushed = r.coord + sign * (ROAD_HALF_WIDTH + 1.5);
                match r.orientation {
                    Orientation::Horizontal => p.z = pushed,
                    Orientation::Vertical => p.x = pushed,
                }
            }
        }
        p
    }

    /// Random spawn point along a sidewalk with a little lateral jitter
    pub fn random_path_position<R: Rng>(&self, path_index: usize, rng: &mut R) -> Vec3 {
        let Some(path) = self.paths.get(path_index) else {
            return RELEASE_POSITION;
        };
        let t: f32 = rng.random();
        let mut p = path.start.lerp(path.end, t);
        p.y = 0.0;
        let jitter = (rng.random::<f32>() - 0.5) * 3.0;
        match path.orientation {
            Orientation::Horizontal => p.z += jitter,
            Orientation::Vertical => p.x += jitter,
        }
        self.push_off_road(p)
    }

    /// First building whose cached box contains `p`
    pub fn building_at(&self, p: Vec3) -> Option<usize> {
        self.grid
            .at_point(p)
            .iter()
            .copied()
            .find(|&i| self.buildings[i].bounds.contains_point(p))
    }

    /// First building whose cached box overlaps `aabb`
    pub fn building_overlapping(&self, aabb: &Aabb) -> Option<usize> {
        self.grid
            .in_box(aabb)
            .into_iter()
            .find(|&i| self.buildings[i].bounds.intersects(aabb))
    }
}

/// Two lanes per road span between neighbouring intersections
fn grid_segments() -> Vec<RoadSegment> {
    let mut segments = Vec::new();
    for i in -ROAD_GRID_HALF..=ROAD_GRID_HALF {
        let c = i as f32 * ROAD_SPACING;
        for j in -ROAD_GRID_HALF..ROAD_GRID_HALF {
            let a = j as f32 * ROAD_SPACING;
            let b = (j + 1) as f32 * ROAD_SPACING;

            segments.push(RoadSegment::new(
                Vec3::new(a, 0.0, c - LANE_OFFSET),
                Vec3::new(b, 0.0, c - LANE_OFFSET),
                Lane::Right,
            ));
            segments.push(RoadSegment::new(
                Vec3::new(b, 0.0, c + LANE_OFFSET),
                Vec3::new(a, 0.0, c + LANE_OFFSET),
                Lane::Left,
            ));
            segments.push(RoadSegment::new(
                Vec3::new(c - LANE_OFFSET, 0.0, a),
                Vec3::new(c - LANE_OFFSET, 0.0, b),
                Lane::Right,
            ));
            segments.push(RoadSegment::new(
                Vec3::new(c + LANE_OFFSET, 0.0, b),
                Vec3::new(c + LANE_OFFSET, 0.0, a),
                Lane::Left,
            ));
        }
    }
    segments
}

fn derive_road_lines(segments: &[RoadSegment]) -> Vec<RoadLine> {
    let mut roads: Vec<RoadLine> = Vec::new();
    for s in segments {
        let coord = s.road_coord();
        let a = s.orientation.longitudinal(s.start);
        let b = s.orientation.longitudinal(s.end);
        let (lo, hi) = (a.min(b), a.max(b));
        match roads
            .iter_mut()
            .find(|r| r.orientation == s.orientation && (r.coord - coord).abs() < 0.5)
        {
            Some(road) => {
                road.from = road.from.min(lo);
                road.to = road.to.max(hi);
            }
            None => roads.push(RoadLine {
                orientation: s.orientation,
                coord,
                from: lo,
                to: hi,
            }),
        }
    }
    roads
}

/// One sidewalk each side of every road, walking in opposite directions
fn sidewalks_along(roads: &[RoadLine]) -> Vec<WalkingPath> {
    let h = SIDEWALK_HALF_SPAN;
    let mut paths = Vec::with_capacity(roads.len() * 2);
    for r in roads {
        let hi = r.coord + SIDEWALK_OFFSET;
        let lo = r.coord - SIDEWALK_OFFSET;
        match r.orientation {
            Orientation::Horizontal => {
                paths.push(WalkingPath::new(Vec3::new(-h, 0.0, hi), Vec3::new(h, 0.0, hi)));
                paths.push(WalkingPath::new(Vec3::new(h, 0.0, lo), Vec3::new(-h, 0.0, lo)));
            }
            Orientation::Vertical => {
                paths.push(WalkingPath::new(Vec3::new(hi, 0.0, -h), Vec3::new(hi, 0.0, h)));
                paths.push(WalkingPath::new(Vec3::new(lo, 0.0, h), Vec3::new(lo, 0.0, -h)));
            }
        }
    }
    paths
}

fn fallback_sidewalks() -> Vec<WalkingPath> {
    let count = (WORLD_HALF_EXTENT / FALLBACK_BLOCK).floor() as i32;
    let roads: Vec<RoadLine> = (-count..=count)
        .flat_map(|i| {
            let c = i as f32 * FALLBACK_BLOCK;
            [Orientation::Horizontal, Orientation::Vertical].map(|orientation| RoadLine {
                orientation,
                coord: c,
                from: -SIDEWALK_HALF_SPAN,
                to: SIDEWALK_HALF_SPAN,
            })
        })
        .collect();
    sidewalks_along(&roads)
}

fn footprint_on_road(roads: &[RoadLine], footprint: &Aabb) -> bool {
    roads.iter().any(|r| {
        let (lat_min, lat_max, lon_min, lon_max) = match r.orientation {
            Orientation::Horizontal => (footprint.min.z, footprint.max.z, footprint.min.x, footprint.max.x),
            Orientation::Vertical => (footprint.min.x, footprint.max.x, footprint.min.z, footprint.max.z),
        };
        lat_max > r.coord - ROAD_CLEARANCE
            && lat_min < r.coord + ROAD_CLEARANCE
            && lon_max >= r.from - 5.0
            && lon_min <= r.to + 5.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_grid_when_layout_empty() {
        let world = World::from_layout(WorldLayout::default());
        // 9 roads each way, 8 spans, 2 lanes
        assert_eq!(world.segments().len(), 9 * 8 * 2 * 2);
        assert_eq!(world.roads().len(), 18);
        assert_eq!(world.paths().len(), 36);
        assert!(world.buildings().is_empty());
    }

    #[test]
    fn test_lane_road_coord_recovers_centre_line() {
        let world = World::from_layout(WorldLayout::default());
        for s in world.segments() {
            let c = s.road_coord();
            assert!((c / ROAD_SPACING - (c / ROAD_SPACING).round()).abs() < 1e-4);
        }
    }

    #[test]
    fn test_fallback_sidewalks_without_roads() {
        let paths = fallback_sidewalks();
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.direction.length() > 0.99));
    }

    #[test]
    fn test_generated_buildings_avoid_roads() {
        let world = World::generate(42);
        assert!(!world.buildings().is_empty());
        for b in world.buildings() {
            assert!(!world.is_on_road(b.bounds().center()));
        }
    }

    #[test]
    fn test_building_queries_use_cached_box() {
        let bx = Aabb::new(Vec3::new(30.0, 0.0, 30.0), Vec3::new(40.0, 20.0, 40.0));
        let world = World::from_layout(WorldLayout {
            buildings: vec![bx],
            ..Default::default()
        });
        assert_eq!(world.building_at(Vec3::new(35.0, 5.0, 35.0)), Some(0));
        assert_eq!(world.building_at(Vec3::new(35.0, 25.0, 35.0)), None);
        let probe = Aabb::new(Vec3::new(39.0, 0.0, 39.0), Vec3::new(45.0, 2.0, 45.0));
        assert_eq!(world.building_overlapping(&probe), Some(0));
    }

    #[test]
    fn test_perpendicular_road_search() {
        let world = World::from_layout(WorldLayout::default());
        let p = Vec3::new(110.0, 0.0, 10.0);
        let road = world
            .perpendicular_road_near(p, Orientation::Horizontal, 40.0)
            .unwrap();
        assert_eq!(road.orientation, Orientation::Vertical);
        assert_eq!(road.coord, 120.0);
    }

    #[test]
    fn test_path_spawn_stays_off_carriageway() {
        let world = World::from_layout(WorldLayout::default());
        let mut rng = Pcg32::seed_from_u64(7);
        for i in 0..world.paths().len() {
            let p = world.random_path_position(i, &mut rng);
            for r in world.roads() {
                assert!((r.orientation.lateral(p) - r.coord).abs() >= ROAD_HALF_WIDTH + 0.5 - 1e-3);
            }
        }
    }
}
