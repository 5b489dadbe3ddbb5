//! Demo driver for the events player

use events_player::{Duration, EventsPlayer, PlayerEvent, PlayerSignal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    // Events are given out of order; the player sorts them by delay
    let events = vec![
        PlayerEvent::new(Duration::from_millis(1000), "data #2"),
        PlayerEvent::new(Duration::from_millis(500), "data #1"),
        PlayerEvent::new(Duration::from_millis(2000), "data #3"),
        PlayerEvent::new(Duration::from_millis(4000), "data #4"),
    ];

    let player = EventsPlayer::new(events, |data| {
        println!("event: {data}");
    })?;

    player.on("state", |signal| {
        if let PlayerSignal::State { new, previous } = signal {
            println!("state: {previous} --> {new}");
        }
    });

    // Exercise the lifecycle while the schedule is playing
    let controls = player.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        controls.pause();
        tokio::time::sleep(Duration::from_millis(4300)).await;
        controls.resume();
        tokio::time::sleep(Duration::from_millis(2000)).await;
        controls.stop();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        controls.start();
    });

    player.start();

    // Let the restarted run play out to completion
    tokio::time::sleep(Duration::from_millis(13_000)).await;
    Ok(())
}
