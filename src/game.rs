//! Game state: active tokens, the hanging token, score, drop and frame stepping.

use crate::merge::{self, MergeReport};
use crate::physics::{self, PhysicsParams};
use crate::{DropVelocity, GameConfig, NextPolicy};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Gap between the widest token's top edge and the top boundary at the spawn line.
const SPAWN_CLEARANCE: f32 = 1.0;

/// Horizontal speed range of a randomly drifting drop.
const DRIFT_RANGE: f32 = 2.0;

/// Play field in field pixels. y=0 is the top boundary; y=height is the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub width: f32,
    pub height: f32,
}

impl Field {
    pub const TOP: f32 = 0.0;

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Clamp a centre x so a circle of radius `r` stays between the walls.
    pub fn clamp_x(&self, x: f32, r: f32) -> f32 {
        if self.width <= 2.0 * r {
            self.width / 2.0
        } else {
            x.clamp(r, self.width - r)
        }
    }
}

/// Stable identity of an active token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u64);

/// A dropped token under simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub id: TokenId,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub tier: usize,
}

impl Token {
    #[inline]
    pub fn top(&self) -> f32 {
        self.y - self.radius
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.radius
    }

    #[inline]
    pub fn distance(&self, other: &Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Strict circle overlap; touching circles do not overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.distance(other) < self.radius + other.radius
    }
}

/// The token hanging at the spawn line, waiting to be dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentToken {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub tier: usize,
}

#[derive(Debug)]
pub struct GameState {
    pub field: Field,
    pub tokens: Vec<Token>,
    pub current: CurrentToken,
    pub score: u32,
    pub is_over: bool,
    /// Merges performed this game.
    pub merges: u32,
    /// Highest tier any token has reached.
    pub best_tier: usize,
    /// Merges from the most recent frame, for the UI flash.
    pub last_merges: MergeReport,
    config: GameConfig,
    tiers: usize,
    cycle_index: usize,
    next_id: u64,
    rng: Pcg32,
}

impl GameState {
    /// `tiers` must be at least 1.
    pub fn new(field: Field, tiers: usize, config: &GameConfig) -> Self {
        let tiers = tiers.max(1);
        let mut rng = Pcg32::seed_from_u64(config.seed);
        let first = match config.next {
            NextPolicy::Cycle => 0,
            NextPolicy::Random => rng.random_range(0..tiers),
        };
        let mut state = Self {
            field,
            tokens: Vec::new(),
            current: CurrentToken {
                x: field.width / 2.0,
                y: 0.0,
                radius: 0.0,
                tier: 0,
            },
            score: 0,
            is_over: false,
            merges: 0,
            best_tier: 0,
            last_merges: MergeReport::default(),
            config: config.clone(),
            tiers,
            cycle_index: first,
            next_id: 0,
            rng,
        };
        state.current = state.spawn_current(first);
        state
    }

    pub fn max_tier(&self) -> usize {
        self.tiers - 1
    }

    pub fn radius_for(&self, tier: usize) -> f32 {
        self.config.radius_for(tier)
    }

    /// Height of the hanging token's centre; low enough that even the widest
    /// tier starts below the top boundary.
    pub fn spawn_y(&self) -> f32 {
        self.radius_for(self.max_tier()) + SPAWN_CLEARANCE
    }

    fn spawn_current(&self, tier: usize) -> CurrentToken {
        let radius = self.radius_for(tier);
        CurrentToken {
            x: self.field.clamp_x(self.field.width / 2.0, radius),
            y: self.spawn_y(),
            radius,
            tier,
        }
    }

    pub fn nudge_left(&mut self) {
        self.nudge(-self.config.nudge_step);
    }

    pub fn nudge_right(&mut self) {
        self.nudge(self.config.nudge_step);
    }

    fn nudge(&mut self, dx: f32) {
        if self.is_over {
            return;
        }
        self.current.x = self.field.clamp_x(self.current.x + dx, self.current.radius);
    }

    /// Release the hanging token into the field and pick the next one.
    pub fn drop_current(&mut self) -> Option<TokenId> {
        if self.is_over {
            return None;
        }
        let vx = match self.config.drift {
            DropVelocity::Zero => 0.0,
            DropVelocity::Random => self.rng.random_range(-DRIFT_RANGE..DRIFT_RANGE),
        };
        let id = TokenId(self.next_id);
        self.next_id += 1;
        self.tokens.push(Token {
            id,
            x: self.current.x,
            y: self.current.y,
            vx,
            vy: 0.0,
            radius: self.current.radius,
            tier: self.current.tier,
        });
        let next = self.select_next_tier();
        self.current = self.spawn_current(next);
        Some(id)
    }

    fn select_next_tier(&mut self) -> usize {
        match self.config.next {
            NextPolicy::Cycle => {
                self.cycle_index = (self.cycle_index + 1) % self.tiers;
                self.cycle_index
            }
            NextPolicy::Random => self.rng.random_range(0..self.tiers),
        }
    }

    /// One simulation frame: physics, merges, then the game-over check.
    pub fn frame(&mut self) {
        if self.is_over {
            return;
        }
        let params = PhysicsParams {
            gravity: self.config.gravity,
            floor: self.config.floor,
            damping: self.config.damping,
            max_tier: self.max_tier(),
        };
        physics::step(&mut self.tokens, self.field, &params);

        let config = &self.config;
        let report = merge::resolve(&mut self.tokens, params.max_tier, |t| config.radius_for(t));
        for m in &report.merges {
            log::debug!("merge {:?} + {:?} -> tier {}", m.survivor, m.consumed, m.tier);
            // A grown survivor may now poke through a wall or the floor.
            if let Some(t) = self.tokens.iter_mut().find(|t| t.id == m.survivor) {
                physics::contain(t, self.field);
            }
        }
        self.score = self.score.saturating_add(report.points);
        self.merges += report.merges.len() as u32;
        self.last_merges = report;
        self.best_tier = self
            .tokens
            .iter()
            .map(|t| t.tier)
            .fold(self.best_tier, usize::max);

        self.check_game_over();
    }

    /// Terminal once any token's top edge reaches the top boundary.
    pub fn check_game_over(&mut self) -> bool {
        if !self.is_over && self.tokens.iter().any(|t| t.top() <= Field::TOP) {
            self.is_over = true;
            log::info!(
                "game over: score {}, {} tokens, {} merges",
                self.score,
                self.tokens.len(),
                self.merges
            );
        }
        self.is_over
    }
}
