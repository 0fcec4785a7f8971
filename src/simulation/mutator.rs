use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::simulation::Simulation;

/// The movement rule currently installed in the simulation.
///
/// `Standard` resolves moves, health, pickups, collisions and spawns.
/// `Drifting` is what the mutator swaps in: it only moves and adjusts health,
/// with its own wall override and health constants. `generation` counts how
/// many times the rule has been mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementRule {
    Standard,
    Drifting { generation: u32 },
}

impl MovementRule {
    pub fn name(&self) -> &'static str {
        match self {
            MovementRule::Standard => "standard",
            MovementRule::Drifting { .. } => "drifting",
        }
    }

    pub fn generation(&self) -> u32 {
        match self {
            MovementRule::Standard => 0,
            MovementRule::Drifting { generation } => *generation,
        }
    }
}

impl Simulation {
    pub fn active_rule(&self) -> MovementRule {
        self.rule()
    }

    pub fn set_active_rule(&mut self, rule: MovementRule) {
        *self.rule_slot() = rule;
    }

    /// Install a freshly built drifting rule in place of whatever is active.
    pub fn mutate_logic(&mut self) {
        let generation = self.rule().generation().wrapping_add(1);
        self.set_active_rule(MovementRule::Drifting { generation });
        debug!(tick = self.tick, generation, "Movement rule mutated");
    }
}
