pub mod app;
pub mod audio;
pub mod config;
pub mod crossfade;
pub mod engine;
pub mod error;
pub mod library;
pub mod model;
pub mod persistence;
pub mod progress;
pub mod queue;
pub mod recent;
pub mod reorder;
pub mod scheduler;
pub mod shuffle;
