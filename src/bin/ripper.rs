//! `platterd-ripper`: runs the Ripper state machine as its own process.

use std::sync::Arc;
use std::thread;

use platterd::bus::transport::{connect_sender, serve_into, write_message};
use platterd::config::AppConfig;
use platterd::interfaces::{
    CommandLosslessEncoder, CommandTagWriter, CommandTrackGrabber, LosslessEncoder, TagWriter,
    TrackGrabber,
};
use platterd::ripper::{spawn_ripper, RipperConfig};
use platterd::wire::{ripper_cmd_from_message, state_message};

fn main() {
    env_logger::init();

    let config = AppConfig::load(None).unwrap_or_else(|e| {
        log::error!("ripper: failed to load config: {e}, using defaults");
        AppConfig::default()
    });

    let grabber: Arc<dyn TrackGrabber> = Arc::new(CommandTrackGrabber {
        program: "cdparanoia".to_string(),
    });
    let encoder: Arc<dyn LosslessEncoder> = Arc::new(CommandLosslessEncoder {
        program: "ffmpeg".to_string(),
    });
    let tagger: Arc<dyn TagWriter> = Arc::new(CommandTagWriter {
        program: "metaflac".to_string(),
    });

    let ripper_config = RipperConfig {
        library_root: config.library_root.clone(),
        cd_device: config.cd_device.clone(),
        album_folder_template: config.album_folder_template.clone(),
        va_album_folder_template: config.va_album_folder_template.clone(),
        track_filename_template: config.track_filename_template.clone(),
        rip_retry_limit: config.rip_retry_limit,
    };

    let (cmd_tx, status_rx) = spawn_ripper(ripper_config, grabber, encoder, tagger);

    let (incoming_tx, incoming_rx) = crossbeam_channel::unbounded();
    if let Err(e) = serve_into(&config.bus.command_ripping_queue, incoming_tx) {
        log::error!(
            "ripper: cannot bind {}: {e}",
            config.bus.command_ripping_queue.display()
        );
        std::process::exit(1);
    }

    thread::Builder::new()
        .name("ripper-queue-recv".into())
        .spawn(move || {
            for msg in incoming_rx {
                if let Some(cmd) = ripper_cmd_from_message(&msg) {
                    if cmd_tx.send(cmd).is_err() {
                        return;
                    }
                }
            }
        })
        .expect("failed to spawn queue receiver thread");

    let mut stream = None;
    for snapshot in status_rx {
        if stream.is_none() {
            stream = connect_sender(&config.bus.state_topic).ok();
        }
        let Some(conn) = stream.as_mut() else {
            log::error!(
                "ripper: cannot connect to state topic {}",
                config.bus.state_topic.display()
            );
            continue;
        };
        let msg = state_message("ripper", &snapshot);
        if let Err(e) = write_message(conn, &msg) {
            log::error!("ripper: failed to publish state: {e}");
            stream = None;
        }
    }
}
