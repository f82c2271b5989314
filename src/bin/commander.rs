//! `platterd-commander`: routes disc-insertion/eject/playback commands to
//! the Player and Ripper processes, and republishes their state back into
//! the Commander's own decision loop. Also owns the periodic library-index
//! rebuild, a background job external to the Commander's own event loop.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use platterd::bus::transport::{connect_sender, serve_into, write_message};
use platterd::commander::{spawn_commander, CommanderConfig};
use platterd::config::AppConfig;
use platterd::interfaces::{
    CommandDiscIdentifier, CommandTagReader, CommandTocReader, DiscIdentifier, HttpMetadataClient,
    LocalTagReader, OnlineMetadataClient, TocReader,
};
use platterd::library::{load_from_file, persist_to_file, rebuild_scan, LibraryIndex};
use platterd::wire::{
    commander_cmd_from_message, commander_cmd_from_state_topic, message_from_player_cmd,
    message_from_ripper_cmd,
};

fn main() {
    env_logger::init();

    let config = AppConfig::load(None).unwrap_or_else(|e| {
        log::error!("commander: failed to load config: {e}, using defaults");
        AppConfig::default()
    });

    let initial_index = load_from_file(&config.db_path).unwrap_or_else(|| {
        let fresh = rebuild_scan(&config.library_root);
        if let Err(e) = persist_to_file(&fresh, &config.db_path) {
            log::error!("library: failed to persist {}: {e}", config.db_path.display());
        }
        fresh
    });
    log::info!("library: loaded index, {} discs", initial_index.len());
    let library = Arc::new(Mutex::new(initial_index));
    spawn_library_rebuild_job(
        Arc::clone(&library),
        config.library_root.clone(),
        config.db_path.clone(),
        Duration::from_secs(config.db_rebuild_interval_secs),
    );

    let disc_identifier: Arc<dyn DiscIdentifier> = Arc::new(CommandDiscIdentifier {
        program: "disc-id".to_string(),
    });
    let tag_reader: Arc<dyn LocalTagReader> = Arc::new(CommandTagReader {
        program: "metaflac".to_string(),
    });
    let metadata_client: Arc<dyn OnlineMetadataClient> = Arc::new(HttpMetadataClient {
        base_url: config.metadata_base_url.clone(),
        timeout: Duration::from_secs(5),
    });
    let toc_reader: Arc<dyn TocReader> = Arc::new(CommandTocReader {
        program: "cdrdao-toc".to_string(),
    });

    let (player_tx, player_rx) = crossbeam_channel::bounded(64);
    let (ripper_tx, ripper_rx) = crossbeam_channel::bounded(64);

    let commander_cfg = CommanderConfig {
        cd_device: config.cd_device.clone(),
    };
    let cmd_tx = spawn_commander(
        commander_cfg,
        library,
        disc_identifier,
        tag_reader,
        metadata_client,
        toc_reader,
        player_tx,
        ripper_tx,
    );

    spawn_forwarder(
        player_rx,
        config.bus.command_playback_queue.clone(),
        "player",
        message_from_player_cmd,
    );
    spawn_forwarder(
        ripper_rx,
        config.bus.command_ripping_queue.clone(),
        "ripper",
        message_from_ripper_cmd,
    );

    let (os_tx, os_rx) = crossbeam_channel::unbounded();
    if let Err(e) = serve_into(&config.bus.command_queue, os_tx) {
        log::error!(
            "commander: cannot bind {}: {e}",
            config.bus.command_queue.display()
        );
        std::process::exit(1);
    }
    let os_cmd_tx = cmd_tx.clone();
    thread::Builder::new()
        .name("commander-os-recv".into())
        .spawn(move || {
            for msg in os_rx {
                if let Some(cmd) = commander_cmd_from_message(&msg) {
                    if os_cmd_tx.send(cmd).is_err() {
                        return;
                    }
                }
            }
        })
        .expect("failed to spawn OS command receiver thread");

    let (state_tx, state_rx) = crossbeam_channel::unbounded();
    if let Err(e) = serve_into(&config.bus.state_topic, state_tx) {
        log::error!(
            "commander: cannot bind {}: {e}",
            config.bus.state_topic.display()
        );
        std::process::exit(1);
    }
    for msg in state_rx {
        if let Some(cmd) = commander_cmd_from_state_topic(&msg) {
            if cmd_tx.send(cmd).is_err() {
                break;
            }
        }
    }
}

/// Spawns a thread that drains `rx`, serializes each command with `encode`,
/// and writes it to the Unix socket at `path`, reconnecting lazily on error.
fn spawn_forwarder<T: Send + 'static>(
    rx: crossbeam_channel::Receiver<T>,
    path: std::path::PathBuf,
    label: &'static str,
    encode: fn(&T) -> Option<platterd::bus::Message>,
) {
    thread::Builder::new()
        .name(format!("commander-to-{label}"))
        .spawn(move || {
            let mut stream = None;
            for cmd in rx {
                let Some(msg) = encode(&cmd) else { continue };
                if stream.is_none() {
                    stream = connect_sender(&path).ok();
                }
                let Some(conn) = stream.as_mut() else {
                    log::error!("commander: cannot connect to {}", path.display());
                    continue;
                };
                if let Err(e) = write_message(conn, &msg) {
                    log::error!("commander: failed to forward to {label}: {e}");
                    stream = None;
                }
            }
        })
        .expect("failed to spawn forwarder thread");
}

fn spawn_library_rebuild_job(
    library: Arc<Mutex<LibraryIndex>>,
    library_root: std::path::PathBuf,
    db_path: std::path::PathBuf,
    interval: Duration,
) {
    thread::Builder::new()
        .name("library-rebuild".into())
        .spawn(move || loop {
            thread::sleep(interval);
            let fresh = rebuild_scan(&library_root);
            log::info!("library: rebuilt index, {} discs", fresh.len());
            if let Err(e) = persist_to_file(&fresh, &db_path) {
                log::error!("library: failed to persist {}: {e}", db_path.display());
            }
            *library.lock().unwrap() = fresh;
        })
        .expect("failed to spawn library rebuild thread");
}
