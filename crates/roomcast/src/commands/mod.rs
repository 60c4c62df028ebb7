//! The wire command codec (spec.md §4.2, §6).
//!
//! Frames are ASCII `"<prefix> <arg>"` text frames, newline-free, with
//! the transport preserving message boundaries (a websocket text
//! frame, in this implementation).

mod client;
mod server;

pub use client::ClientCommand;
pub use server::ServerFrame;
