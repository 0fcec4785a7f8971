pub mod entity;
pub mod grid;

pub use entity::{Item, Npc, Player};
pub use grid::{Cell, Grid};
