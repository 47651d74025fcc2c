//! Projectile Duel Engine
//!
//! Top-down arena shooter. Players move, fire gravity-affected projectiles,
//! collect power-ups, and score a point per kill. First to `WIN_SCORE`
//! wins; otherwise the best score when the clock runs out.
//!
//! ## Tick Order
//!
//! 1. Players: respawn countdown, movement, power-up decay, cooldown
//! 2. Projectiles: gravity, drag, speed cap, move, age
//! 3. Collisions: players, then obstacles, then arena boundary
//! 4. Expired projectiles removed
//! 5. Power-ups: pickup, timeout, spawn
//! 6. Queued shots fire
//!
//! Shots fire last, so a projectile fired this tick carries its launch
//! velocity untouched until the next tick.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::core::collision::{
    apply_air_resistance, calculate_bounce, circles_overlap, clamp_velocity, constants as physics,
    Aabb, Circle,
};
use crate::core::rng::SeededRng;
use crate::core::vec2::Vec2;
use crate::game::engine::{time_remaining, Simulation, WinReason, WinResult};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::PlayerId;

/// Projectile duel tuning. Durations are in ticks at 60 Hz.
pub mod constants {
    use crate::game::engine::secs_to_ticks;

    pub const ARENA_WIDTH: f32 = 1600.0;
    pub const ARENA_HEIGHT: f32 = 1200.0;

    pub const PLAYER_SPEED: f32 = 200.0;
    pub const PLAYER_RADIUS: f32 = 20.0;
    pub const PLAYER_MAX_HEALTH: i32 = 100;

    /// 0.5 s between shots
    pub const SHOOT_COOLDOWN_TICKS: u32 = 30;
    /// 0.2 s between shots with rapid fire
    pub const RAPID_FIRE_COOLDOWN_TICKS: u32 = 12;

    pub const PROJECTILE_SPEED: f32 = 600.0;
    pub const PROJECTILE_DAMAGE: i32 = 20;
    pub const HEAVY_PROJECTILE_SPEED: f32 = 400.0;
    pub const HEAVY_PROJECTILE_DAMAGE: i32 = 40;
    pub const PROJECTILE_RADIUS: f32 = 5.0;
    pub const PROJECTILE_LIFETIME_TICKS: u32 = secs_to_ticks(5);
    /// Live projectile ceiling; shots beyond it are dropped.
    pub const MAX_PROJECTILES: usize = 256;

    pub const RESPAWN_TICKS: u32 = secs_to_ticks(3);
    /// Respawn and power-up positions stay this far from the walls.
    pub const SPAWN_MARGIN: f32 = 100.0;

    pub const WIN_SCORE: u32 = 5;
    pub const MATCH_DURATION_TICKS: u32 = secs_to_ticks(180);

    pub const POWER_UP_SPAWN_INTERVAL_TICKS: u32 = secs_to_ticks(30);
    pub const POWER_UP_TIMEOUT_TICKS: u32 = secs_to_ticks(30);
    pub const POWER_UP_RADIUS: f32 = 20.0;
    pub const SHIELD_HITS: u32 = 2;
    pub const RAPID_FIRE_TICKS: u32 = secs_to_ticks(10);
    pub const HEAVY_SHOT_COUNT: u32 = 5;
}

use constants::*;

// =============================================================================
// STATE
// =============================================================================

/// Power-up kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    /// Absorbs hits (charges)
    Shield,
    /// Shorter cooldown (ticks remaining)
    RapidFire,
    /// Heavier, slower shots (charges)
    HeavyShot,
}

impl PowerUpKind {
    /// Spawn table, indexed by RNG draw.
    pub const ALL: [PowerUpKind; 3] = [
        PowerUpKind::Shield,
        PowerUpKind::RapidFire,
        PowerUpKind::HeavyShot,
    ];

    /// Charges or ticks granted on pickup.
    pub fn initial_amount(self) -> u32 {
        match self {
            PowerUpKind::Shield => SHIELD_HITS,
            PowerUpKind::RapidFire => RAPID_FIRE_TICKS,
            PowerUpKind::HeavyShot => HEAVY_SHOT_COUNT,
        }
    }
}

/// Projectile kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectileKind {
    Normal,
    Heavy,
}

/// Per-player state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Participant id
    pub id: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Facing angle in radians
    pub facing: f32,
    pub health: i32,
    pub score: u32,
    pub alive: bool,
    /// Ticks until respawn; only counts down while dead
    pub respawn_ticks: u32,
    /// Ticks until the next shot is allowed
    pub shot_cooldown: u32,
    /// Active power-ups: ticks left (rapid fire) or charges (shield, heavy)
    pub power_ups: BTreeMap<PowerUpKind, u32>,
    /// Tick of the most recent kill, for tie-breaks
    pub last_scored_tick: Option<u32>,
    /// Aim of a shot requested since the last tick
    #[serde(skip)]
    pending_shot: Option<Vec2>,
}

impl PlayerState {
    fn new(id: PlayerId, position: Vec2) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            facing: 0.0,
            health: PLAYER_MAX_HEALTH,
            score: 0,
            alive: true,
            respawn_ticks: 0,
            shot_cooldown: 0,
            power_ups: BTreeMap::new(),
            last_scored_tick: None,
            pending_shot: None,
        }
    }

    /// Charges/ticks left on a power-up (0 if inactive).
    pub fn power_up(&self, kind: PowerUpKind) -> u32 {
        self.power_ups.get(&kind).copied().unwrap_or(0)
    }

    /// Spend one unit of a power-up. Returns units left.
    fn consume(&mut self, kind: PowerUpKind) -> u32 {
        let left = match self.power_ups.get_mut(&kind) {
            Some(n) => {
                *n = n.saturating_sub(1);
                *n
            }
            None => return 0,
        };
        if left == 0 {
            self.power_ups.remove(&kind);
        }
        left
    }
}

/// A projectile in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub id: u32,
    pub owner: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub damage: i32,
    pub kind: ProjectileKind,
    /// Ticks since launch
    pub age: u32,
    /// Removed once `age` exceeds this
    pub max_age: u32,
}

/// Static arena geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: String,
    pub bounds: Aabb,
    pub health: i32,
    pub max_health: i32,
    pub destructible: bool,
}

impl Obstacle {
    fn new(id: &str, bounds: Aabb, health: i32, destructible: bool) -> Self {
        Self {
            id: id.to_string(),
            bounds,
            health,
            max_health: health,
            destructible,
        }
    }
}

/// A collectible power-up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerUp {
    pub id: u32,
    pub kind: PowerUpKind,
    pub position: Vec2,
    pub radius: f32,
    pub spawn_tick: u32,
}

/// Input accepted from a player. Absent fields leave state unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileInput {
    /// Desired movement direction (normalized; zero stops)
    pub movement: Option<Vec2>,
    /// Facing angle in radians
    pub rotation: Option<f32>,
    /// Request a shot along `aim`
    pub shoot: bool,
    /// Aim direction
    pub aim: Option<Vec2>,
}

/// Serializable projectile duel state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub tick: u32,
    /// Players in participant order
    pub players: Vec<PlayerState>,
    pub projectiles: Vec<Projectile>,
    pub obstacles: Vec<Obstacle>,
    pub power_ups: Vec<PowerUp>,
    /// Seconds left on the match clock
    pub time_remaining: f32,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Projectile duel simulation.
#[derive(Debug, Clone)]
pub struct ProjectileEngine {
    tick: u32,
    participants: Vec<PlayerId>,
    players: BTreeMap<PlayerId, PlayerState>,
    projectiles: BTreeMap<u32, Projectile>,
    obstacles: Vec<Obstacle>,
    power_ups: BTreeMap<u32, PowerUp>,
    rng: SeededRng,
    next_projectile_id: u32,
    next_power_up_id: u32,
    ticks_since_power_up: u32,
    events: Vec<GameEvent>,
}

impl ProjectileEngine {
    fn spawn_positions() -> [Vec2; 2] {
        [
            Vec2::new(200.0, 200.0),
            Vec2::new(ARENA_WIDTH - 200.0, ARENA_HEIGHT - 200.0),
        ]
    }

    fn default_obstacles() -> Vec<Obstacle> {
        vec![
            Obstacle::new("obstacle_center", Aabb::new(700.0, 500.0, 200.0, 200.0), 100, false),
            Obstacle::new("obstacle_left", Aabb::new(300.0, 400.0, 100.0, 400.0), 50, true),
            Obstacle::new("obstacle_right", Aabb::new(1200.0, 400.0, 100.0, 400.0), 50, true),
        ]
    }

    /// Look up a player.
    pub fn player(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Live projectiles in id order.
    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    /// Remaining obstacles.
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Uncollected power-ups in id order.
    pub fn power_ups(&self) -> impl Iterator<Item = &PowerUp> {
        self.power_ups.values()
    }

    #[cfg(test)]
    pub(crate) fn set_score(&mut self, id: &str, score: u32) {
        if let Some(player) = self.players.get_mut(id) {
            player.score = score;
            player.last_scored_tick = Some(self.tick);
        }
    }

    fn push_event(&mut self, data: GameEventData) {
        self.events.push(GameEvent::new(self.tick, data));
    }

    fn random_arena_position(&mut self) -> Vec2 {
        let x = self.rng.range(SPAWN_MARGIN, ARENA_WIDTH - SPAWN_MARGIN);
        let y = self.rng.range(SPAWN_MARGIN, ARENA_HEIGHT - SPAWN_MARGIN);
        Vec2::new(x, y)
    }

    // -------------------------------------------------------------------------
    // Players
    // -------------------------------------------------------------------------

    fn update_players(&mut self, dt: f32) {
        let min = Vec2::new(PLAYER_RADIUS, PLAYER_RADIUS);
        let max = Vec2::new(ARENA_WIDTH - PLAYER_RADIUS, ARENA_HEIGHT - PLAYER_RADIUS);

        for idx in 0..self.participants.len() {
            let id = self.participants[idx].clone();
            let Some(player) = self.players.get_mut(&id) else { continue };

            if !player.alive {
                player.pending_shot = None;
                player.respawn_ticks = player.respawn_ticks.saturating_sub(1);
                if player.respawn_ticks == 0 {
                    self.respawn(&id);
                }
                continue;
            }

            player.position = (player.position + player.velocity.scale(dt)).clamp_components(min, max);

            if let Some(ticks) = player.power_ups.get_mut(&PowerUpKind::RapidFire) {
                *ticks = ticks.saturating_sub(1);
                if *ticks == 0 {
                    player.power_ups.remove(&PowerUpKind::RapidFire);
                }
            }

            player.shot_cooldown = player.shot_cooldown.saturating_sub(1);
        }
    }

    fn respawn(&mut self, id: &PlayerId) {
        let position = self.random_arena_position();
        if let Some(player) = self.players.get_mut(id) {
            player.alive = true;
            player.health = PLAYER_MAX_HEALTH;
            player.position = position;
            player.velocity = Vec2::ZERO;
            player.shot_cooldown = 0;
            player.power_ups.clear();
        }
        self.push_event(GameEventData::Respawn { player: id.clone(), position });
    }

    // -------------------------------------------------------------------------
    // Projectiles
    // -------------------------------------------------------------------------

    fn update_projectiles(&mut self, dt: f32) {
        for projectile in self.projectiles.values_mut() {
            let mut velocity = projectile.velocity;
            velocity.y += physics::GRAVITY * dt;
            velocity = clamp_velocity(apply_air_resistance(velocity), physics::MAX_VELOCITY);

            projectile.velocity = velocity;
            projectile.position += velocity.scale(dt);
            projectile.age += 1;
        }
    }

    fn resolve_collisions(&mut self) {
        let ids: Vec<u32> = self.projectiles.keys().copied().collect();

        for id in ids {
            let Some(projectile) = self.projectiles.get(&id) else { continue };
            let (owner, position) = (projectile.owner.clone(), projectile.position);

            let target = self.participants.iter().find(|pid| {
                **pid != owner
                    && self.players.get(*pid).is_some_and(|p| {
                        p.alive
                            && circles_overlap(p.position, PLAYER_RADIUS, position, PROJECTILE_RADIUS)
                    })
            });
            if let Some(victim) = target.cloned() {
                if let Some(projectile) = self.projectiles.remove(&id) {
                    self.handle_player_hit(&victim, &projectile);
                }
                continue;
            }

            let circle = Circle::new(position, PROJECTILE_RADIUS);
            if let Some(idx) = self.obstacles.iter().position(|o| circle.intersects_aabb(&o.bounds)) {
                if let Some(projectile) = self.projectiles.remove(&id) {
                    self.handle_obstacle_hit(idx, &projectile);
                }
                continue;
            }

            let in_bounds = (0.0..=ARENA_WIDTH).contains(&position.x)
                && (0.0..=ARENA_HEIGHT).contains(&position.y);
            if !in_bounds {
                self.projectiles.remove(&id);
            }
        }
    }

    fn handle_player_hit(&mut self, victim_id: &PlayerId, projectile: &Projectile) {
        let tick = self.tick;
        let Some(victim) = self.players.get_mut(victim_id) else { return };

        if victim.power_up(PowerUpKind::Shield) > 0 {
            let charges_left = victim.consume(PowerUpKind::Shield);
            self.push_event(GameEventData::ShieldAbsorbed {
                player: victim_id.clone(),
                charges_left,
            });
            return;
        }

        victim.health -= projectile.damage;
        if victim.health > 0 {
            return;
        }

        victim.health = 0;
        victim.alive = false;
        victim.velocity = Vec2::ZERO;
        victim.respawn_ticks = RESPAWN_TICKS;
        victim.pending_shot = None;

        let killer_score = match self.players.get_mut(&projectile.owner) {
            Some(shooter) => {
                shooter.score += 1;
                shooter.last_scored_tick = Some(tick);
                shooter.score
            }
            None => 0,
        };
        self.events.push(GameEvent::kill(
            tick,
            victim_id.clone(),
            projectile.owner.clone(),
            killer_score,
        ));
    }

    fn handle_obstacle_hit(&mut self, idx: usize, projectile: &Projectile) {
        let obstacle = &mut self.obstacles[idx];
        if obstacle.destructible {
            obstacle.health -= projectile.damage;
        }

        let normal = obstacle.bounds.surface_normal(projectile.position);
        let bounce_velocity = calculate_bounce(projectile.velocity, normal);
        let (obstacle_id, health, destroyed) =
            (obstacle.id.clone(), obstacle.health, obstacle.destructible && obstacle.health <= 0);

        self.push_event(GameEventData::ObstacleHit {
            obstacle_id: obstacle_id.clone(),
            projectile_id: projectile.id,
            health,
            bounce_velocity,
        });

        if destroyed {
            self.obstacles.remove(idx);
            self.push_event(GameEventData::ObstacleDestroyed { obstacle_id });
        }
    }

    fn expire_projectiles(&mut self) {
        self.projectiles.retain(|_, p| p.age <= p.max_age);
    }

    /// Put a projectile in flight. Returns `None` at the projectile ceiling.
    fn launch(
        &mut self,
        owner: &PlayerId,
        position: Vec2,
        velocity: Vec2,
        kind: ProjectileKind,
    ) -> Option<u32> {
        if self.projectiles.len() >= MAX_PROJECTILES {
            return None;
        }
        let damage = match kind {
            ProjectileKind::Normal => PROJECTILE_DAMAGE,
            ProjectileKind::Heavy => HEAVY_PROJECTILE_DAMAGE,
        };

        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        self.projectiles.insert(id, Projectile {
            id,
            owner: owner.clone(),
            position,
            velocity,
            damage,
            kind,
            age: 0,
            max_age: PROJECTILE_LIFETIME_TICKS,
        });
        Some(id)
    }

    fn fire_pending_shots(&mut self) {
        for idx in 0..self.participants.len() {
            let id = self.participants[idx].clone();
            let Some(player) = self.players.get_mut(&id) else { continue };
            let Some(aim) = player.pending_shot.take() else { continue };
            if !player.alive || player.shot_cooldown > 0 || self.projectiles.len() >= MAX_PROJECTILES {
                continue;
            }

            player.shot_cooldown = if player.power_up(PowerUpKind::RapidFire) > 0 {
                RAPID_FIRE_COOLDOWN_TICKS
            } else {
                SHOOT_COOLDOWN_TICKS
            };

            let (kind, speed) = if player.power_up(PowerUpKind::HeavyShot) > 0 {
                player.consume(PowerUpKind::HeavyShot);
                (ProjectileKind::Heavy, HEAVY_PROJECTILE_SPEED)
            } else {
                (ProjectileKind::Normal, PROJECTILE_SPEED)
            };

            let origin = player.position;
            self.launch(&id, origin, aim.normalize().scale(speed), kind);
        }
    }

    // -------------------------------------------------------------------------
    // Power-ups
    // -------------------------------------------------------------------------

    fn update_power_ups(&mut self) {
        self.collect_power_ups();

        let tick = self.tick;
        let expired: Vec<u32> = self
            .power_ups
            .values()
            .filter(|p| tick.saturating_sub(p.spawn_tick) > POWER_UP_TIMEOUT_TICKS)
            .map(|p| p.id)
            .collect();
        for power_up_id in expired {
            self.power_ups.remove(&power_up_id);
            self.push_event(GameEventData::PowerUpExpired { power_up_id });
        }

        self.ticks_since_power_up += 1;
        if self.ticks_since_power_up >= POWER_UP_SPAWN_INTERVAL_TICKS {
            self.ticks_since_power_up = 0;
            self.spawn_power_up();
        }
    }

    fn collect_power_ups(&mut self) {
        let ids: Vec<u32> = self.power_ups.keys().copied().collect();
        for power_up_id in ids {
            let Some(power_up) = self.power_ups.get(&power_up_id) else { continue };
            let (position, radius, kind) = (power_up.position, power_up.radius, power_up.kind);

            let collector = self.participants.iter().find(|pid| {
                self.players.get(*pid).is_some_and(|p| {
                    p.alive && circles_overlap(p.position, PLAYER_RADIUS, position, radius)
                })
            });
            let Some(player_id) = collector.cloned() else { continue };

            if let Some(player) = self.players.get_mut(&player_id) {
                player.power_ups.insert(kind, kind.initial_amount());
            }
            self.power_ups.remove(&power_up_id);
            self.push_event(GameEventData::PowerUpCollected {
                power_up_id,
                kind,
                player: player_id,
            });
        }
    }

    fn spawn_power_up(&mut self) {
        let kind = PowerUpKind::ALL[self.rng.int(0, PowerUpKind::ALL.len() as i32 - 1) as usize];
        let position = self.random_arena_position();

        let id = self.next_power_up_id;
        self.next_power_up_id += 1;
        self.power_ups.insert(id, PowerUp {
            id,
            kind,
            position,
            radius: POWER_UP_RADIUS,
            spawn_tick: self.tick,
        });
        self.push_event(GameEventData::PowerUpSpawned { power_up_id: id, kind, position });
    }

    // -------------------------------------------------------------------------
    // Win
    // -------------------------------------------------------------------------

    /// Highest score; ties go to whoever reached it first, then seat order.
    fn leader(&self) -> Option<&PlayerState> {
        self.participants
            .iter()
            .enumerate()
            .filter_map(|(seat, id)| self.players.get(id).map(|p| (seat, p)))
            .min_by_key(|(seat, p)| {
                (
                    std::cmp::Reverse(p.score),
                    p.last_scored_tick.unwrap_or(u32::MAX),
                    *seat,
                )
            })
            .map(|(_, p)| p)
    }
}

impl Simulation for ProjectileEngine {
    type Input = ProjectileInput;
    type Snapshot = ProjectileSnapshot;

    fn new(seed: u64, participants: &[PlayerId]) -> Self {
        let spawns = Self::spawn_positions();
        let players = participants
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), PlayerState::new(id.clone(), spawns[i % spawns.len()])))
            .collect();

        Self {
            tick: 0,
            participants: participants.to_vec(),
            players,
            projectiles: BTreeMap::new(),
            obstacles: Self::default_obstacles(),
            power_ups: BTreeMap::new(),
            rng: SeededRng::new(seed),
            next_projectile_id: 0,
            next_power_up_id: 0,
            ticks_since_power_up: 0,
            events: Vec::new(),
        }
    }

    fn update(&mut self, dt: f32) {
        self.tick += 1;

        self.update_players(dt);
        self.update_projectiles(dt);
        self.resolve_collisions();
        self.expire_projectiles();
        self.update_power_ups();
        self.fire_pending_shots();
    }

    fn handle_input(&mut self, player: &str, input: ProjectileInput) {
        let Some(state) = self.players.get_mut(player) else { return };
        if !state.alive {
            return;
        }

        if let Some(movement) = input.movement.filter(|m| m.is_finite()) {
            state.velocity = movement.normalize().scale(PLAYER_SPEED);
        }
        if let Some(rotation) = input.rotation.filter(|r| r.is_finite()) {
            state.facing = rotation;
        }
        if input.shoot {
            if let Some(aim) = input.aim.filter(|a| a.is_finite() && a.length_squared() > 0.0) {
                state.pending_shot = Some(aim);
            }
        }
    }

    fn check_win_condition(&self) -> Option<WinResult> {
        let leader = self.leader()?;

        if leader.score >= WIN_SCORE {
            return Some(WinResult { winner: leader.id.clone(), reason: WinReason::Score });
        }
        if self.tick >= MATCH_DURATION_TICKS {
            return Some(WinResult { winner: leader.id.clone(), reason: WinReason::Time });
        }
        None
    }

    fn get_state(&self) -> ProjectileSnapshot {
        ProjectileSnapshot {
            tick: self.tick,
            players: self
                .participants
                .iter()
                .filter_map(|id| self.players.get(id).cloned())
                .collect(),
            projectiles: self.projectiles.values().cloned().collect(),
            obstacles: self.obstacles.clone(),
            power_ups: self.power_ups.values().cloned().collect(),
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
