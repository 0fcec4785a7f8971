pub mod cli;
pub mod config;
pub mod scheduler;
pub mod simulation;
pub mod world;
