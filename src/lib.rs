//! Playback core for an internet radio player.
//!
//! Given a [`Station`](station::Station), the [`Player`](player::Player)
//! resolves its candidate stream URLs, optionally probes them, and tries them
//! in order on a single audio output until one plays. The outcome is
//! published as a [`PlaybackSession`](store::PlaybackSession) that any number
//! of readers can watch.
//!
//! * [`resolver`]: candidate URLs and CORS proxy routing
//! * [`verify`]: best-effort stream probing
//! * [`engine`] and [`player`]: candidate fallback, preemption and stall
//!   recovery
//! * [`store`]: the shared session state
//! * [`output`] and [`sink`]: the audio output abstraction and its rodio
//!   implementation
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod audio_file;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
pub mod output;
pub mod player;
pub mod resolver;
pub mod signal;
pub mod sink;
pub mod station;
pub mod store;
pub mod util;
pub mod verify;
