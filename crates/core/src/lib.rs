//! Domain types and pure logic for the narrated video assembly pipeline.
//!
//! Everything here is free of database and network access. Media-tool
//! invocation ([`ffmpeg`]) is the one exception: it spawns `ffmpeg` /
//! `ffprobe` subprocesses but holds no state.

pub mod capabilities;
pub mod error;
pub mod ffmpeg;
pub mod filter_graph;
pub mod generation;
pub mod naming;
pub mod poll;
pub mod progress;
pub mod project;
pub mod reconcile;
pub mod resolution;
pub mod subtitles;
pub mod types;
