use serde::{Deserialize, Serialize};

use crate::simulation::entropy::{EntropySource, roll_below, to_base36};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub health: i64,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub health: i64,
    pub mood: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub value: i64,
}

/// Opaque id: a one-letter prefix and a base-36 number below 1e9.
pub fn roll_id(prefix: char, entropy: &mut dyn EntropySource) -> String {
    format!("{}{}", prefix, to_base36(roll_below(entropy, 1_000_000_000) as u64))
}

impl Player {
    pub const STARTING_HEALTH: i64 = 100;

    pub fn spawn(entropy: &mut dyn EntropySource) -> Player {
        Player {
            id: roll_id('p', entropy),
            x: 0,
            y: 0,
            health: Self::STARTING_HEALTH,
            score: 0,
        }
    }

    pub fn is_at(&self, x: i32, y: i32) -> bool {
        self.x == x && self.y == y
    }
}

impl Npc {
    /// Random NPC: uniform position, health in [10, 70), mood in [0, 100).
    pub fn roll(size: i32, entropy: &mut dyn EntropySource) -> Npc {
        Npc {
            id: roll_id('n', entropy),
            x: roll_below(entropy, i64::from(size)) as i32,
            y: roll_below(entropy, i64::from(size)) as i32,
            health: Self::roll_health(entropy),
            mood: roll_below(entropy, 100),
        }
    }

    pub fn roll_health(entropy: &mut dyn EntropySource) -> i64 {
        roll_below(entropy, 60) + 10
    }
}

impl Item {
    /// Random item: uniform position, value in [1, 200].
    pub fn roll(size: i32, entropy: &mut dyn EntropySource) -> Item {
        Item {
            id: roll_id('i', entropy),
            x: roll_below(entropy, i64::from(size)) as i32,
            y: roll_below(entropy, i64::from(size)) as i32,
            value: Self::roll_value(entropy),
        }
    }

    pub fn roll_value(entropy: &mut dyn EntropySource) -> i64 {
        roll_below(entropy, 200) + 1
    }
}
