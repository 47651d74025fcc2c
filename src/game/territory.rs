//! Gravity Painters Engine
//!
//! Each player steers a gravity well that emits coloured particles. Wells
//! attract nearby particles; a particle that slows below the stick
//! threshold paints its colour into a downsampled canvas and returns to the
//! pool. Whoever dominates the most painted pixels when the clock runs out
//! wins.
//!
//! ## Tick Order
//!
//! 1. Wells move and re-derive movement speed from gravity strength
//! 2. Emitting wells spawn particles from the pool
//! 3. Particles integrate against nearby wells (quadtree lookup) and stick
//! 4. Synchronized pulse on its interval
//! 5. Territory recompute on its interval
//! 6. Expired particles return to the pool

use serde::{Serialize, Deserialize};

use crate::core::collision::{apply_air_resistance, Aabb};
use crate::core::pool::{Pool, PoolHandle};
use crate::core::quadtree::Quadtree;
use crate::core::rng::SeededRng;
use crate::core::vec2::Vec2;
use crate::game::engine::{time_remaining, Simulation, WinReason, WinResult};
use crate::game::events::GameEvent;
use crate::game::PlayerId;

/// Gravity painters tuning. Durations are in ticks at 60 Hz.
pub mod constants {
    use crate::game::engine::secs_to_ticks;

    pub const CANVAS_WIDTH: f32 = 1920.0;
    pub const CANVAS_HEIGHT: f32 = 1080.0;
    pub const DOWNSAMPLED_WIDTH: usize = 960;
    pub const DOWNSAMPLED_HEIGHT: usize = 540;

    pub const BASE_MOVEMENT_SPEED: f32 = 150.0;
    pub const MIN_GRAVITY_STRENGTH: f32 = 0.5;
    pub const MAX_GRAVITY_STRENGTH: f32 = 2.0;
    pub const INITIAL_GRAVITY_STRENGTH: f32 = 1.0;
    pub const GRAVITY_CONSTANT: f32 = 5000.0;
    /// Wells only pull particles within this distance
    pub const GRAVITY_QUERY_RADIUS: f32 = 500.0;
    /// Floor on squared distance in the force law
    pub const MIN_DISTANCE_SQUARED: f32 = 100.0;
    /// Wells stay this far inside the canvas edge
    pub const WELL_MARGIN: f32 = 50.0;

    /// Particles per emitting well per tick
    pub const EMISSION_RATE: u32 = 5;
    /// Emission velocity range per axis (±)
    pub const EMISSION_SPEED: f32 = 10.0;
    pub const PARTICLE_LIFETIME_TICKS: u32 = secs_to_ticks(10);
    /// Below this speed a particle sticks
    pub const PARTICLE_STICK_THRESHOLD: f32 = 50.0;
    pub const PARTICLE_POOL_CAPACITY: usize = 10_000;

    pub const PULSE_INTERVAL_TICKS: u32 = secs_to_ticks(30);
    pub const PULSE_PARTICLE_COUNT: u32 = 100;
    /// Pulse speed at gravity strength 1.0
    pub const PULSE_BASE_SPEED: f32 = 100.0;

    pub const QUADTREE_CAPACITY: usize = 10;
    pub const TERRITORY_UPDATE_TICKS: u32 = secs_to_ticks(1);
    pub const MATCH_DURATION_TICKS: u32 = secs_to_ticks(180);
}

use constants::*;

// =============================================================================
// COLOUR + CANVAS
// =============================================================================

/// 8-bit RGB colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const YELLOW: Rgb = Rgb::new(255, 255, 0);

    /// Seat colours, assigned in participant order.
    pub const PALETTE: [Rgb; 4] = [Rgb::RED, Rgb::BLUE, Rgb::GREEN, Rgb::YELLOW];

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Additive blend, saturating per channel.
    #[inline]
    pub fn blend(self, other: Rgb) -> Rgb {
        Rgb::new(
            self.r.saturating_add(other.r),
            self.g.saturating_add(other.g),
            self.b.saturating_add(other.b),
        )
    }

    #[inline]
    pub fn is_black(self) -> bool {
        self == Rgb::BLACK
    }

    #[inline]
    fn dot(self, other: Rgb) -> u64 {
        self.r as u64 * other.r as u64 + self.g as u64 * other.g as u64 + self.b as u64 * other.b as u64
    }
}

/// Downsampled paint surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl Canvas {
    /// Black canvas of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgb::BLACK; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at `(x, y)`, or `None` outside the canvas.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x < self.width && y < self.height {
            self.pixels.get(y * self.width + x).copied()
        } else {
            None
        }
    }

    /// All pixels, row-major.
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// Blend `color` into the pixel under a full-resolution arena point.
    pub fn paint(&mut self, position: Vec2, color: Rgb) {
        let x = (position.x / CANVAS_WIDTH * self.width as f32).floor();
        let y = (position.y / CANVAS_HEIGHT * self.height as f32).floor();
        if x < 0.0 || y < 0.0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        if x < self.width && y < self.height {
            let idx = y * self.width + x;
            self.pixels[idx] = self.pixels[idx].blend(color);
        }
    }

    /// Run-length encoding: `count,r,g,b;` per run, row-major.
    pub fn rle(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let mut iter = self.pixels.iter();
        let Some(mut current) = iter.next().copied() else { return out };
        let mut count = 1u32;

        for &pixel in iter {
            if pixel == current {
                count += 1;
            } else {
                let _ = write!(out, "{},{},{},{};", count, current.r, current.g, current.b);
                current = pixel;
                count = 1;
            }
        }
        let _ = write!(out, "{},{},{},{};", count, current.r, current.g, current.b);
        out
    }
}

/// Which palette entry a pixel belongs to.
///
/// Picks the colour with the highest cosine similarity to the pixel.
/// Compared as `dot² / |c|²` in integers, so the result is exact. Ties and
/// orthogonal pixels are unattributed.
pub fn dominant_color(pixel: Rgb, palette: &[Rgb]) -> Option<usize> {
    let mut best: Option<(usize, u64, u64)> = None;
    let mut tied = false;

    for (idx, &color) in palette.iter().enumerate() {
        let dot = pixel.dot(color);
        if dot == 0 {
            continue;
        }
        let (num, den) = (dot * dot, color.dot(color));
        match best {
            None => best = Some((idx, num, den)),
            Some((_, best_num, best_den)) => {
                let lhs = num as u128 * best_den as u128;
                let rhs = best_num as u128 * den as u128;
                if lhs > rhs {
                    best = Some((idx, num, den));
                    tied = false;
                } else if lhs == rhs {
                    tied = true;
                }
            }
        }
    }

    match best {
        Some((idx, _, _)) if !tied => Some(idx),
        _ => None,
    }
}

// =============================================================================
// STATE
// =============================================================================

/// A player's gravity well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Well {
    pub player: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: Rgb,
    pub gravity_strength: f32,
    /// Inversely proportional to gravity strength
    pub movement_speed: f32,
    pub emission_rate: u32,
    pub emitting: bool,
    /// Share of painted pixels, in hundredths of a percent
    pub territory_bp: u32,
    /// Share of painted pixels, percent
    pub territory: f32,
    #[serde(skip)]
    direction: Vec2,
}

impl Well {
    fn new(player: PlayerId, position: Vec2, color: Rgb) -> Self {
        Self {
            player,
            position,
            velocity: Vec2::ZERO,
            color,
            gravity_strength: INITIAL_GRAVITY_STRENGTH,
            movement_speed: BASE_MOVEMENT_SPEED / INITIAL_GRAVITY_STRENGTH,
            emission_rate: EMISSION_RATE,
            emitting: false,
            territory_bp: 0,
            territory: 0.0,
            direction: Vec2::ZERO,
        }
    }
}

/// A live particle. Lives in the pool; `owner` is a seat index.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    pub owner: u16,
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: Rgb,
    pub age: u32,
    pub max_age: u32,
    pub stuck: bool,
}

/// Input accepted from a player. Absent fields leave state unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerritoryInput {
    /// Desired movement direction (normalized; zero stops)
    pub movement: Option<Vec2>,
    /// Requested gravity strength, clamped to the allowed range
    pub gravity_strength: Option<f32>,
    /// Toggle continuous emission
    pub emitting: Option<bool>,
}

/// Serializable gravity painters state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerritorySnapshot {
    pub tick: u32,
    /// Wells in participant order
    pub wells: Vec<Well>,
    pub particle_count: usize,
    pub pulses: u32,
    /// Run-length encoded canvas (`count,r,g,b;`)
    pub canvas: String,
    pub time_remaining: f32,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Gravity painters simulation.
#[derive(Debug, Clone)]
pub struct TerritoryEngine {
    tick: u32,
    wells: Vec<Well>,
    particles: Vec<PoolHandle>,
    pool: Pool<Particle>,
    canvas: Canvas,
    rng: SeededRng,
    ticks_since_pulse: u32,
    ticks_since_territory: u32,
    pulses: u32,
    events: Vec<GameEvent>,
}

impl TerritoryEngine {
    /// Build an engine with a custom particle ceiling.
    pub fn with_pool_capacity(seed: u64, participants: &[PlayerId], capacity: usize) -> Self {
        let spawns = [
            Vec2::new(480.0, 270.0),
            Vec2::new(1440.0, 270.0),
            Vec2::new(480.0, 810.0),
            Vec2::new(1440.0, 810.0),
        ];
        let wells = participants
            .iter()
            .enumerate()
            .map(|(i, id)| {
                Well::new(id.clone(), spawns[i % spawns.len()], Rgb::PALETTE[i % Rgb::PALETTE.len()])
            })
            .collect();

        Self {
            tick: 0,
            wells,
            particles: Vec::new(),
            pool: Pool::with_capacity(capacity),
            canvas: Canvas::new(DOWNSAMPLED_WIDTH, DOWNSAMPLED_HEIGHT),
            rng: SeededRng::new(seed),
            ticks_since_pulse: 0,
            ticks_since_territory: 0,
            pulses: 0,
            events: Vec::new(),
        }
    }

    /// Look up a well by player.
    pub fn well(&self, player: &str) -> Option<&Well> {
        self.wells.iter().find(|w| w.player == player)
    }

    /// Wells in participant order.
    pub fn wells(&self) -> &[Well] {
        &self.wells
    }

    /// Live particle count.
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Particle pool.
    pub fn pool(&self) -> &Pool<Particle> {
        &self.pool
    }

    /// Paint surface.
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Pulses fired so far.
    pub fn pulses(&self) -> u32 {
        self.pulses
    }

    fn spawn_particle(&mut self, seat: usize, velocity: Vec2) -> bool {
        let well = &self.wells[seat];
        let particle = Particle {
            owner: seat as u16,
            position: well.position,
            velocity,
            color: well.color,
            age: 0,
            max_age: PARTICLE_LIFETIME_TICKS,
            stuck: false,
        };
        match self.pool.insert(particle) {
            Some(handle) => {
                self.particles.push(handle);
                true
            }
            None => false,
        }
    }

    fn move_wells(&mut self, dt: f32) {
        let min = Vec2::new(WELL_MARGIN, WELL_MARGIN);
        let max = Vec2::new(CANVAS_WIDTH - WELL_MARGIN, CANVAS_HEIGHT - WELL_MARGIN);

        for well in &mut self.wells {
            well.movement_speed = BASE_MOVEMENT_SPEED / well.gravity_strength;
            well.velocity = well.direction.scale(well.movement_speed);
            well.position = (well.position + well.velocity.scale(dt)).clamp_components(min, max);
        }
    }

    fn emit(&mut self) {
        for seat in 0..self.wells.len() {
            if !self.wells[seat].emitting {
                continue;
            }
            for _ in 0..self.wells[seat].emission_rate {
                let vx = self.rng.range(-EMISSION_SPEED, EMISSION_SPEED);
                let vy = self.rng.range(-EMISSION_SPEED, EMISSION_SPEED);
                if !self.spawn_particle(seat, Vec2::new(vx, vy)) {
                    break;
                }
            }
        }
    }

    fn update_particles(&mut self, dt: f32) {
        let mut tree = Quadtree::new(Aabb::new(0.0, 0.0, CANVAS_WIDTH, CANVAS_HEIGHT), QUADTREE_CAPACITY);
        for (seat, well) in self.wells.iter().enumerate() {
            tree.insert(well.position, seat);
        }

        let max = Vec2::new(CANVAS_WIDTH - 1.0, CANVAS_HEIGHT - 1.0);
        let wells = &self.wells;
        let pool = &mut self.pool;
        let canvas = &mut self.canvas;

        self.particles.retain(|&handle| {
            let Some(particle) = pool.get_mut(handle) else { return false };

            let mut force = Vec2::ZERO;
            for (well_position, &seat) in tree.query_radius(particle.position, GRAVITY_QUERY_RADIUS) {
                let direction = well_position - particle.position;
                let distance_squared = direction.length_squared().max(MIN_DISTANCE_SQUARED);
                let magnitude = GRAVITY_CONSTANT * wells[seat].gravity_strength / distance_squared;
                force += direction.normalize().scale(magnitude);
            }

            particle.velocity = apply_air_resistance(particle.velocity + force.scale(dt));
            particle.position = (particle.position + particle.velocity.scale(dt))
                .clamp_components(Vec2::ZERO, max);
            particle.age += 1;

            if particle.velocity.length() < PARTICLE_STICK_THRESHOLD {
                particle.stuck = true;
                canvas.paint(particle.position, particle.color);
                pool.release(handle);
                return false;
            }
            true
        });
    }

    fn maybe_pulse(&mut self) {
        self.ticks_since_pulse += 1;
        if self.ticks_since_pulse < PULSE_INTERVAL_TICKS {
            return;
        }
        self.ticks_since_pulse = 0;
        self.pulses += 1;

        let angle_step = std::f32::consts::TAU / PULSE_PARTICLE_COUNT as f32;
        for seat in 0..self.wells.len() {
            let speed = PULSE_BASE_SPEED * self.wells[seat].gravity_strength;
            let mut emitted = 0;
            for i in 0..PULSE_PARTICLE_COUNT {
                let velocity = Vec2::from_angle(angle_step * i as f32).scale(speed);
                if !self.spawn_particle(seat, velocity) {
                    break;
                }
                emitted += 1;
            }
            let player = self.wells[seat].player.clone();
            self.events.push(GameEvent::pulse(self.tick, player, emitted));
        }
    }

    fn maybe_recompute_territory(&mut self) {
        self.ticks_since_territory += 1;
        if self.ticks_since_territory >= TERRITORY_UPDATE_TICKS {
            self.ticks_since_territory = 0;
            self.recompute_territory();
        }
    }

    /// Attribute every painted pixel to at most one well.
    fn recompute_territory(&mut self) {
        let palette: Vec<Rgb> = self.wells.iter().map(|w| w.color).collect();
        let mut counts = vec![0u64; palette.len()];
        let mut painted = 0u64;

        for &pixel in self.canvas.pixels() {
            if pixel.is_black() {
                continue;
            }
            painted += 1;
            if let Some(seat) = dominant_color(pixel, &palette) {
                counts[seat] += 1;
            }
        }

        for (well, count) in self.wells.iter_mut().zip(counts) {
            well.territory_bp = if painted > 0 { (count * 10_000 / painted) as u32 } else { 0 };
            well.territory = well.territory_bp as f32 / 100.0;
        }
    }

    fn expire_particles(&mut self) {
        let pool = &mut self.pool;
        self.particles.retain(|&handle| {
            match pool.get(handle).map(|p| p.age > p.max_age) {
                Some(true) => {
                    pool.release(handle);
                    false
                }
                Some(false) => true,
                None => false,
            }
        });
    }
}

impl Simulation for TerritoryEngine {
    type Input = TerritoryInput;
    type Snapshot = TerritorySnapshot;

    fn new(seed: u64, participants: &[PlayerId]) -> Self {
        Self::with_pool_capacity(seed, participants, PARTICLE_POOL_CAPACITY)
    }

    fn update(&mut self, dt: f32) {
        self.tick += 1;

        self.move_wells(dt);
        self.emit();
        self.update_particles(dt);
        self.maybe_pulse();
        self.maybe_recompute_territory();
        self.expire_particles();
    }

    fn handle_input(&mut self, player: &str, input: TerritoryInput) {
        let Some(well) = self.wells.iter_mut().find(|w| w.player == player) else { return };

        if let Some(strength) = input.gravity_strength.filter(|s| s.is_finite()) {
            well.gravity_strength = strength.clamp(MIN_GRAVITY_STRENGTH, MAX_GRAVITY_STRENGTH);
            well.movement_speed = BASE_MOVEMENT_SPEED / well.gravity_strength;
        }
        if let Some(movement) = input.movement.filter(|m| m.is_finite()) {
            well.direction = movement.normalize();
            well.velocity = well.direction.scale(well.movement_speed);
        }
        if let Some(emitting) = input.emitting {
            well.emitting = emitting;
        }
    }

    fn check_win_condition(&self) -> Option<WinResult> {
        if self.tick < MATCH_DURATION_TICKS {
            return None;
        }
        // Ties go to the earlier seat
        let mut leader: Option<&Well> = None;
        for well in &self.wells {
            if leader.map_or(true, |l| well.territory_bp > l.territory_bp) {
                leader = Some(well);
            }
        }
        leader.map(|w| WinResult { winner: w.player.clone(), reason: WinReason::Territory })
    }

    fn get_state(&self) -> TerritorySnapshot {
        TerritorySnapshot {
            tick: self.tick,
            wells: self.wells.clone(),
            particle_count: self.particles.len(),
            pulses: self.pulses,
            canvas: self.canvas.rle(),
            time_remaining: time_remaining(self.tick, MATCH_DURATION_TICKS),
        }
    }

    fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    fn tick(&self) -> u32 {
        self.tick
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::TICK_DT;
    use crate::game::events::GameEventData;

    fn players(n: usize) -> Vec<PlayerId> {
        (0..n).map(|i| format!("player{}", i)).collect()
    }

    fn run(engine: &mut TerritoryEngine, ticks: u32) -> Vec<GameEvent> {
        let mut events = Vec::new();
        for _ in 0..ticks {
            engine.update(TICK_DT);
            events.extend(engine.take_events());
        }
        events
    }

    #[test]
    fn test_initial_wells() {
        let engine = TerritoryEngine::new(1, &players(4));
        let wells = engine.wells();
        assert_eq!(wells[0].color, Rgb::RED);
        assert_eq!(wells[3].color, Rgb::YELLOW);
        assert_eq!(wells[1].position, Vec2::new(1440.0, 270.0));
        assert!(wells.iter().all(|w| !w.emitting && w.gravity_strength == 1.0));
    }

    #[test]
    fn test_one_pulse_per_well_after_thirty_seconds() {
        let mut engine = TerritoryEngine::new(42, &players(4));
        let events = run(&mut engine, PULSE_INTERVAL_TICKS);

        assert_eq!(engine.pulses(), 1);
        let pulses: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.data {
                GameEventData::Pulse { player, particles } => Some((player.clone(), *particles)),
                _ => None,
            })
            .collect();
        assert_eq!(pulses.len(), 4);
        assert!(pulses.iter().all(|(_, n)| *n == PULSE_PARTICLE_COUNT));
        let mut who: Vec<_> = pulses.into_iter().map(|(p, _)| p).collect();
        who.dedup();
        assert_eq!(who, players(4));
        assert_eq!(engine.particle_count(), 4 * PULSE_PARTICLE_COUNT as usize);

        // No second pulse before the next interval
        run(&mut engine, PULSE_INTERVAL_TICKS - 1);
        assert_eq!(engine.pulses(), 1);
    }

    #[test]
    fn test_pulse_speed_scales_with_gravity() {
        let mut engine = TerritoryEngine::new(3, &players(1));
        engine.handle_input("player0", TerritoryInput {
            gravity_strength: Some(2.0),
            ..Default::default()
        });
        run(&mut engine, PULSE_INTERVAL_TICKS);

        let handle = engine.particles[0];
        let particle = engine.pool().get(handle).unwrap();
        assert!((particle.velocity.length() - 2.0 * PULSE_BASE_SPEED).abs() < 1e-3);
    }

    #[test]
    fn test_gravity_clamped_and_speed_inverse() {
        let mut engine = TerritoryEngine::new(1, &players(1));
        engine.handle_input("player0", TerritoryInput {
            gravity_strength: Some(9.0),
            ..Default::default()
        });
        let well = engine.well("player0").unwrap();
        assert_eq!(well.gravity_strength, MAX_GRAVITY_STRENGTH);
        assert_eq!(well.movement_speed, BASE_MOVEMENT_SPEED / MAX_GRAVITY_STRENGTH);

        engine.handle_input("player0", TerritoryInput {
            gravity_strength: Some(0.0),
            ..Default::default()
        });
        assert_eq!(engine.well("player0").unwrap().gravity_strength, MIN_GRAVITY_STRENGTH);
    }

    #[test]
    fn test_well_clamped_to_canvas() {
        let mut engine = TerritoryEngine::new(1, &players(1));
        engine.handle_input("player0", TerritoryInput {
            movement: Some(Vec2::new(-1.0, -1.0)),
            ..Default::default()
        });
        run(&mut engine, 600);
        assert_eq!(engine.well("player0").unwrap().position, Vec2::new(WELL_MARGIN, WELL_MARGIN));
    }

    #[test]
    fn test_emission_paints_canvas() {
        let mut engine = TerritoryEngine::new(9, &players(2));
        engine.handle_input("player0", TerritoryInput {
            emitting: Some(true),
            ..Default::default()
        });
        run(&mut engine, TERRITORY_UPDATE_TICKS);

        // Slow emissions stick straight away at the well
        let (x, y) = (480 / 2, 270 / 2);
        let painted = (y - 2..=y + 2)
            .flat_map(|py| (x - 2..=x + 2).map(move |px| (px, py)))
            .filter_map(|(px, py)| engine.canvas().pixel(px, py))
            .any(|p| p.r > 0);
        assert!(painted);

        let red = engine.well("player0").unwrap();
        assert_eq!(red.territory_bp, 10_000);
        assert_eq!(red.territory, 100.0);
        assert_eq!(engine.well("player1").unwrap().territory_bp, 0);
    }

    #[test]
    fn test_pool_exhaustion_drops_emission() {
        let mut engine = TerritoryEngine::with_pool_capacity(5, &players(4), 150);
        let events = run(&mut engine, PULSE_INTERVAL_TICKS);

        let emitted: Vec<u32> = events
            .iter()
            .filter_map(|e| match e.data {
                GameEventData::Pulse { particles, .. } => Some(particles),
                _ => None,
            })
            .collect();
        assert_eq!(emitted, vec![100, 50, 0, 0]);
        assert_eq!(engine.pool().live(), 150);
        assert_eq!(engine.particle_count(), engine.pool().live());
    }

    #[test]
    fn test_pool_bound_under_load() {
        let mut engine = TerritoryEngine::with_pool_capacity(11, &players(4), 300);
        for player in players(4) {
            engine.handle_input(&player, TerritoryInput {
                emitting: Some(true),
                movement: Some(Vec2::new(1.0, 0.5)),
                ..Default::default()
            });
        }
        for _ in 0..PULSE_INTERVAL_TICKS + 120 {
            engine.update(TICK_DT);
            assert!(engine.pool().live() <= engine.pool().capacity());
            assert_eq!(engine.particle_count(), engine.pool().live());
        }
    }

    #[test]
    fn test_particles_expire() {
        let mut engine = TerritoryEngine::new(4, &players(1));
        assert!(engine.spawn_particle(0, Vec2::new(400.0, 0.0)));
        let handle = engine.particles[0];
        engine.pool.get_mut(handle).unwrap().age = PARTICLE_LIFETIME_TICKS;

        engine.update(TICK_DT);
        assert_eq!(engine.particle_count(), 0);
        assert_eq!(engine.pool().live(), 0);
    }

    #[test]
    fn test_territory_never_exceeds_full_coverage() {
        let mut engine = TerritoryEngine::new(21, &players(4));
        for (seat, player) in players(4).iter().enumerate() {
            engine.handle_input(player, TerritoryInput {
                emitting: Some(true),
                movement: Some(Vec2::new(if seat % 2 == 0 { 1.0 } else { -1.0 }, 0.3)),
                ..Default::default()
            });
        }
        for _ in 0..10 {
            run(&mut engine, TERRITORY_UPDATE_TICKS * 3);
            let total_bp: u32 = engine.wells().iter().map(|w| w.territory_bp).sum();
            assert!(total_bp <= 10_000);
            let total: f32 = engine.wells().iter().map(|w| w.territory).sum();
            assert!(total <= 100.0 + 1e-3);
        }
    }

    #[test]
    fn test_dominant_color() {
        let palette = Rgb::PALETTE;
        assert_eq!(dominant_color(Rgb::RED, &palette), Some(0));
        assert_eq!(dominant_color(Rgb::YELLOW, &palette), Some(3));
        assert_eq!(dominant_color(Rgb::new(200, 40, 0), &palette), Some(0));
        // Magenta sits exactly between red and blue
        assert_eq!(dominant_color(Rgb::new(255, 0, 255), &palette), None);
        assert_eq!(dominant_color(Rgb::new(0, 0, 10), &[Rgb::RED]), None);
    }

    #[test]
    fn test_rle() {
        let mut canvas = Canvas::new(4, 1);
        canvas.paint(Vec2::new(CANVAS_WIDTH / 4.0 * 2.0, 0.0), Rgb::RED);
        assert_eq!(canvas.rle(), "2,0,0,0;1,255,0,0;1,0,0,0;");
        assert_eq!(Canvas::new(960, 540).rle(), "518400,0,0,0;");
    }

    #[test]
    fn test_blend_saturates() {
        assert_eq!(Rgb::new(200, 0, 0).blend(Rgb::RED), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::RED.blend(Rgb::GREEN), Rgb::YELLOW);
    }

    #[test]
    fn test_win_only_at_time_limit() {
        let mut engine = TerritoryEngine::new(1, &players(2));
        engine.wells[1].territory_bp = 6_000;
        assert!(engine.check_win_condition().is_none());

        engine.tick = MATCH_DURATION_TICKS;
        let result = engine.check_win_condition().unwrap();
        assert_eq!(result.winner, "player1");
        assert_eq!(result.reason, WinReason::Territory);

        engine.wells[0].territory_bp = 6_000;
        assert_eq!(engine.check_win_condition().unwrap().winner, "player0");
    }
}
