pub mod cli;
pub mod core;
pub mod engine;
pub mod providers;
