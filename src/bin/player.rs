//! `platterd-player`: runs the Player state machine as its own process,
//! wired to the bus over Unix sockets. Thin: all behavior lives in
//! `platterd::player`.

use std::sync::Arc;
use std::thread;

use platterd::bus::transport::{connect_sender, serve_into, write_message};
use platterd::config::AppConfig;
use platterd::interfaces::CommandPcmDecoder;
use platterd::model::{CHANNELS, SAMPLE_RATE};
use platterd::player::spawn_player;
use platterd::wire::{player_cmd_from_message, state_message};

fn main() {
    env_logger::init();

    let config = AppConfig::load(None).unwrap_or_else(|e| {
        log::error!("player: failed to load config: {e}, using defaults");
        AppConfig::default()
    });

    let decoder: Arc<dyn platterd::interfaces::PcmDecoder> = Arc::new(CommandPcmDecoder {
        program: "ffmpeg".to_string(),
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
    });

    let (cmd_tx, status_rx) = spawn_player(decoder);

    let (incoming_tx, incoming_rx) = crossbeam_channel::unbounded();
    if let Err(e) = serve_into(&config.bus.command_playback_queue, incoming_tx) {
        log::error!(
            "player: cannot bind {}: {e}",
            config.bus.command_playback_queue.display()
        );
        std::process::exit(1);
    }

    thread::Builder::new()
        .name("player-queue-recv".into())
        .spawn(move || {
            for msg in incoming_rx {
                if let Some(cmd) = player_cmd_from_message(&msg) {
                    if cmd_tx.send(cmd).is_err() {
                        return;
                    }
                }
            }
        })
        .expect("failed to spawn queue receiver thread");

    // Status snapshots are republished on the state topic for the Commander
    // (and any DisplayRenderer) to subscribe to. The connection is held open
    // and lazily re-established if the topic process restarts.
    let mut stream = None;
    for snapshot in status_rx {
        if stream.is_none() {
            stream = connect_sender(&config.bus.state_topic).ok();
        }
        let Some(conn) = stream.as_mut() else {
            log::error!(
                "player: cannot connect to state topic {}",
                config.bus.state_topic.display()
            );
            continue;
        };
        let msg = state_message("player", &snapshot);
        if let Err(e) = write_message(conn, &msg) {
            log::error!("player: failed to publish state: {e}");
            stream = None;
        }
    }
}
