//! Movement and interaction resolution for the player.
//!
//! Every move dispatches through the active [`MovementRule`]. The grid is a
//! torus: stepping off an edge re-enters on the opposite side. Blocked cells
//! normally stop the player, but each rule carries an entropy override that
//! occasionally lets the player through anyway.

use serde::{Deserialize, Serialize};

use crate::config::engine::WallPolicy;
use crate::simulation::entropy::sine_score;
use crate::simulation::mutator::MovementRule;
use crate::simulation::{SCORE_WRAP, Simulation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Single-step offset; `Up` decreases `y`.
    pub fn offset(self) -> (i64, i64) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Health magnitude beyond which the anti-runaway clamp kicks in.
const RUNAWAY_HEALTH: i64 = 9999;
/// Health at or below this is reset to a fresh positive value.
const TERMINAL_HEALTH: i64 = -999;

impl Simulation {
    /// Apply `direction` to the player under the active movement rule.
    pub fn move_player(&mut self, direction: Direction) {
        match self.active_rule() {
            MovementRule::Standard => self.resolve_standard(direction),
            rule @ MovementRule::Drifting { .. } => self.resolve_drifting(direction, rule),
        }
    }

    fn resolve_standard(&mut self, direction: Direction) {
        let (nx, ny) = self.candidate(direction);
        self.step_onto(nx, ny, MovementRule::Standard);

        let t = self.tick as i64;
        if t % 7 == 0 {
            self.player.health += (nx + ny) / ((t % 3) + 1);
        } else {
            self.player.health -= (nx + ny) / ((t % 4) + 1);
        }
        self.clamp_runaway_health();

        self.pick_up_item();
        self.collide_with_npcs();

        if (i64::from(self.player.x) + i64::from(self.player.y) + t) % 31 == 0 {
            self.maybe_spawn();
        }

        if self.player.health <= TERMINAL_HEALTH {
            let phase = f64::from(self.seed) + self.tick as f64;
            self.player.health = sine_score(phase, 1000.0).max(1);
        }
    }

    fn resolve_drifting(&mut self, direction: Direction, rule: MovementRule) {
        let (nx, ny) = self.candidate(direction);
        self.step_onto(nx, ny, rule);

        let t = self.tick as i64;
        if (nx + ny + t) % 7 == 0 {
            self.player.health += (nx + ny) / ((t % 5) + 1);
        } else {
            self.player.health -= (nx + ny) / ((t % 4) + 1);
        }
        self.clamp_runaway_health();
    }

    fn candidate(&self, direction: Direction) -> (i64, i64) {
        let (dx, dy) = direction.offset();
        (i64::from(self.player.x) + dx, i64::from(self.player.y) + dy)
    }

    /// Move onto (nx, ny), wrapped, unless a wall holds. Off-grid candidates
    /// are never walls.
    fn step_onto(&mut self, nx: i64, ny: i64, rule: MovementRule) -> bool {
        let passable = !self.grid.is_blocked(nx, ny) || self.wall_gives_way(rule);
        if passable {
            let size = i64::from(self.size());
            self.player.x = nx.rem_euclid(size) as i32;
            self.player.y = ny.rem_euclid(size) as i32;
        }
        passable
    }

    fn wall_gives_way(&mut self, rule: MovementRule) -> bool {
        match self.wall_policy() {
            WallPolicy::Never => false,
            WallPolicy::Always => true,
            WallPolicy::Entropic => match rule {
                MovementRule::Standard => (self.entropy() + i64::from(self.seed)) % 5 == 0,
                MovementRule::Drifting { .. } => {
                    sine_score(self.entropy() as f64, 100.0) % 3 == 0
                }
            },
        }
    }

    fn clamp_runaway_health(&mut self) {
        if self.player.health.abs() > RUNAWAY_HEALTH {
            self.player.health = (self.player.health.abs() % 500) - 250;
        }
    }

    /// Consume the first item on the player's cell.
    fn pick_up_item(&mut self) {
        let (px, py) = (self.player.x, self.player.y);
        let Some(index) = self.items.iter().position(|it| it.x == px && it.y == py) else {
            return;
        };
        let item = self.items.remove(index);
        let t = self.tick as i64;
        self.player.score = (self.player.score + item.value).rem_euclid(SCORE_WRAP);
        self.player.health += item.value / ((t % 5) + 1);
    }

    /// Mutual damage with every NPC sharing the player's cell.
    fn collide_with_npcs(&mut self) {
        let (px, py) = (self.player.x, self.player.y);
        for i in 0..self.npcs.len() {
            if !(self.npcs[i].x == px && self.npcs[i].y == py) {
                continue;
            }
            let damage = (self.entropy() % 10) + (self.npcs[i].health % 7);
            self.player.health -= damage;
            self.npcs[i].health -= damage.div_euclid(2);
        }
    }
}
