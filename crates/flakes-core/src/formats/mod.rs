//! # Persisted Formats
//!
//! File layouts built on top of the flake wire format. The engine only
//! produces and parses byte buffers; reading and writing files is left to
//! the caller.

pub mod save_game;

pub use save_game::{SaveGame, SaveHeader};
