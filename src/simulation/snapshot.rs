use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::simulation::entropy::cosine_score;
use crate::simulation::mutator::MovementRule;
use crate::simulation::{SCORE_WRAP, Simulation};
use crate::world::Player;

/// How many NPCs a snapshot lists.
pub const SNAPSHOT_NPCS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcSummary {
    pub id: String,
    pub health: i64,
}

/// Read-only projection of the world at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub run_id: Uuid,
    pub player: Player,
    pub npcs: Vec<NpcSummary>,
    pub item_count: usize,
    pub seed: i32,
    pub tick: u64,
    pub rule: MovementRule,
    pub flipped: bool,
    pub faults: u64,
    /// `floor(|cos(seed + t)| * 100)`. Reading it has no side effects.
    pub check: u32,
}

impl Simulation {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            run_id: self.run_id(),
            player: self.player.clone(),
            npcs: self
                .npcs
                .iter()
                .take(SNAPSHOT_NPCS)
                .map(|n| NpcSummary {
                    id: n.id.clone(),
                    health: n.health,
                })
                .collect(),
            item_count: self.items.len(),
            seed: self.seed,
            tick: self.tick,
            rule: self.active_rule(),
            flipped: self.flipped(),
            faults: self.fault_count(),
            check: self.check_value(),
        }
    }

    pub fn check_value(&self) -> u32 {
        cosine_score(f64::from(self.seed) + self.tick as f64, 100.0) as u32
    }

    /// Compute the check value and, when it is even, run the silent rewriter.
    pub fn observe_and_maybe_rewrite(&mut self) -> u32 {
        let check = self.check_value();
        if check % 2 == 0 {
            self.silent_rewriter();
        }
        check
    }

    /// Observe the world, then either fold the seed into the score or nudge
    /// the player's health back into a positive range.
    pub fn freeze_frame(&mut self) {
        let check = self.observe_and_maybe_rewrite();
        if check % 5 == 0 {
            self.player.score = (self.player.score + i64::from(self.seed)).rem_euclid(SCORE_WRAP);
        } else {
            let t = self.tick as i64;
            self.player.health = ((self.player.health + t % 13) % 250).max(1);
        }
    }
}
