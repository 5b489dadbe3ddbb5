//! # Events Player
//!
//! An asynchronous timed-events player for Rust built on top of Tokio.
//!
//! This library schedules a fixed set of timed events and invokes a callback
//! for each event at its delay offset, while letting the whole schedule be
//! paused, resumed, stopped, restarted and globally sped up or slowed down
//! at runtime.
//!
//! ## Features
//!
//! - **Asynchronous**: Built on Tokio; every delay is a cancelable sleep
//! - **Suspendable**: Pause and resume without losing elapsed progress
//! - **Playback Speed**: A positive scalar compresses (>1) or stretches (<1)
//!   every remaining delay, changeable mid-playback
//! - **Exactly Once**: Each event's callback fires exactly once per run,
//!   in non-decreasing delay order
//! - **Lifecycle Listeners**: Observe state and speed changes through a
//!   simple listener registry
//!
//! ## Quick Start
//!
//! ```rust
//! use events_player::{Duration, EventsPlayer, PlayerEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let events = vec![
//!         PlayerEvent::new(Duration::from_millis(40), "data #2"),
//!         PlayerEvent::new(Duration::from_millis(20), "data #1"),
//!     ];
//!
//!     // The callback runs once per event, in delay order
//!     let player = EventsPlayer::new(events, |data| {
//!         println!("event: {data}");
//!     })?;
//!
//!     player.on("state", |signal| {
//!         println!("player: {signal:?}");
//!     });
//!
//!     player.start();
//!     tokio::time::sleep(Duration::from_millis(100)).await;
//!     Ok(())
//! }
//! ```

mod error;
mod player;
mod timer;

pub use error::PlayerError;
pub use player::{EventsPlayer, PlayerEvent, PlayerSignal, PlayerState};

// Re-export commonly used types for convenience
pub use std::time::Duration;
