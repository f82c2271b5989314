// Commander: translates the coarse "disc inserted"/"eject" events
// into the fine-grained commands Player and Ripper understand, forwards
// playback commands verbatim, and republishes Ripper progress to the
// Player. Shaped on this codebase's own single-thread-plus-command-queue
// loop, generalized from a one-target dispatch to a two-target fan-out.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::interfaces::{DiscIdentifier, LocalTagReader, OnlineMetadataClient, TocReader};
use crate::library::LibraryIndex;
use crate::model::{DiscMeta, PlayerSnapshot, PlayerState, RipperSnapshot, Track};
use crate::player::PlayerCmd;
use crate::ripper::RipperCmd;

const LOOKUP_BASE_DELAY: Duration = Duration::from_millis(200);
const LOOKUP_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub enum CommanderCmd {
    DiscInserted,
    Play,
    Stop,
    Pause,
    Next,
    Prev,
    Eject,
    RipperStatus(RipperSnapshot),
    /// Lets the Commander notice when the Player is parked in
    /// WAITING_FOR_DATA, so a later `RipperStatus` can re-trigger `play`.
    PlayerStatus(PlayerSnapshot),
    Quit,
}

pub struct CommanderConfig {
    pub cd_device: String,
}

pub fn spawn_commander(
    config: CommanderConfig,
    library: Arc<Mutex<LibraryIndex>>,
    disc_identifier: Arc<dyn DiscIdentifier>,
    tag_reader: Arc<dyn LocalTagReader>,
    metadata_client: Arc<dyn OnlineMetadataClient>,
    toc_reader: Arc<dyn TocReader>,
    player_tx: Sender<PlayerCmd>,
    ripper_tx: Sender<RipperCmd>,
) -> Sender<CommanderCmd> {
    let (cmd_tx, cmd_rx) = bounded::<CommanderCmd>(64);

    thread::Builder::new()
        .name("commander".into())
        .spawn(move || {
            commander_loop(
                cmd_rx,
                config,
                library,
                disc_identifier,
                tag_reader,
                metadata_client,
                toc_reader,
                player_tx,
                ripper_tx,
            );
        })
        .expect("failed to spawn commander thread");

    cmd_tx
}

/// Tracks just enough Player state to decide whether a ripper update should
/// also trigger `play` when WAITING_FOR_DATA resolves.
#[derive(Default)]
struct WaitingForDataWatch {
    waiting: bool,
}

fn commander_loop(
    cmd_rx: Receiver<CommanderCmd>,
    config: CommanderConfig,
    library: Arc<Mutex<LibraryIndex>>,
    disc_identifier: Arc<dyn DiscIdentifier>,
    tag_reader: Arc<dyn LocalTagReader>,
    metadata_client: Arc<dyn OnlineMetadataClient>,
    toc_reader: Arc<dyn TocReader>,
    player_tx: Sender<PlayerCmd>,
    ripper_tx: Sender<RipperCmd>,
) {
    let mut watch = WaitingForDataWatch::default();

    loop {
        select! {
            recv(cmd_rx) -> msg => {
                let Ok(cmd) = msg else { break };
                if !handle_commander_cmd(
                    cmd,
                    &config,
                    &library,
                    &disc_identifier,
                    &tag_reader,
                    &metadata_client,
                    &toc_reader,
                    &player_tx,
                    &ripper_tx,
                    &mut watch,
                ) {
                    break;
                }
            }
        }
    }
}

fn handle_commander_cmd(
    cmd: CommanderCmd,
    config: &CommanderConfig,
    library: &Arc<Mutex<LibraryIndex>>,
    disc_identifier: &Arc<dyn DiscIdentifier>,
    tag_reader: &Arc<dyn LocalTagReader>,
    metadata_client: &Arc<dyn OnlineMetadataClient>,
    toc_reader: &Arc<dyn TocReader>,
    player_tx: &Sender<PlayerCmd>,
    ripper_tx: &Sender<RipperCmd>,
    watch: &mut WaitingForDataWatch,
) -> bool {
    match cmd {
        CommanderCmd::Quit => return false,

        CommanderCmd::DiscInserted => {
            on_disc_inserted(config, library, disc_identifier, tag_reader, metadata_client, toc_reader, player_tx, ripper_tx);
        }

        CommanderCmd::Eject => {
            let _ = player_tx.send(PlayerCmd::Eject);
            let _ = ripper_tx.send(RipperCmd::Eject);
            watch.waiting = false;
        }

        CommanderCmd::Play => {
            let _ = player_tx.send(PlayerCmd::Play);
            watch.waiting = false;
        }
        CommanderCmd::Stop => {
            let _ = player_tx.send(PlayerCmd::Stop);
        }
        CommanderCmd::Pause => {
            let _ = player_tx.send(PlayerCmd::Pause);
        }
        CommanderCmd::Next => {
            let _ = player_tx.send(PlayerCmd::Next);
        }
        CommanderCmd::Prev => {
            let _ = player_tx.send(PlayerCmd::Prev);
        }

        CommanderCmd::RipperStatus(status) => {
            let _ = player_tx.send(PlayerCmd::RipperUpdate(status.track_list));
            if watch.waiting {
                let _ = player_tx.send(PlayerCmd::Play);
            }
        }

        CommanderCmd::PlayerStatus(status) => {
            watch.waiting = status.state == PlayerState::WaitingForData;
        }
    }
    true
}

fn on_disc_inserted(
    config: &CommanderConfig,
    library: &Arc<Mutex<LibraryIndex>>,
    disc_identifier: &Arc<dyn DiscIdentifier>,
    tag_reader: &Arc<dyn LocalTagReader>,
    metadata_client: &Arc<dyn OnlineMetadataClient>,
    toc_reader: &Arc<dyn TocReader>,
    player_tx: &Sender<PlayerCmd>,
    ripper_tx: &Sender<RipperCmd>,
) {
    let Some(disc_id) = disc_identifier.read_disc_id(&config.cd_device) else {
        let _ = player_tx.send(PlayerCmd::UnknownDisc);
        return;
    };

    if let Some(indexed) = library.lock().unwrap().lookup(&disc_id).cloned() {
        // Known discs resolve metadata locally, from the tags already
        // written into their own ripped files: no network, no drive.
        match read_local_disc_meta(&disc_id, &indexed.track_list, tag_reader) {
            Some(disc_meta) => {
                let _ = ripper_tx.send(RipperCmd::KnownDisc);
                let _ = player_tx.send(PlayerCmd::Start {
                    track_list: indexed.track_list,
                    disc_meta,
                });
            }
            None => {
                let _ = player_tx.send(PlayerCmd::UnknownDisc);
            }
        }
        return;
    }

    match lookup_metadata(&disc_id, &config.cd_device, metadata_client, toc_reader) {
        Some(disc_meta) => {
            let _ = player_tx.send(PlayerCmd::Start {
                track_list: Vec::new(),
                disc_meta: disc_meta.clone(),
            });
            let _ = ripper_tx.send(RipperCmd::Start(disc_meta));
        }
        None => {
            let _ = player_tx.send(PlayerCmd::UnknownDisc);
        }
    }
}

/// Reconstructs a known disc's metadata by reading the tags `TagWriter`
/// already wrote into each of its ripped track files: no network or drive
/// access. Disc-level artist is `None` (various-artists) unless every
/// track shares the same one.
fn read_local_disc_meta(
    disc_id: &str,
    track_files: &[std::path::PathBuf],
    tag_reader: &Arc<dyn LocalTagReader>,
) -> Option<DiscMeta> {
    let mut tracks = Vec::with_capacity(track_files.len());
    let mut album = String::new();
    for path in track_files {
        let tags = tag_reader.read_tags(path)?;
        album = tags.album;
        tracks.push(Track {
            artist: tags.artist,
            title: tags.title,
            duration: tags.duration,
        });
    }
    if tracks.is_empty() {
        return None;
    }

    let duration = tracks.iter().map(|t| t.duration).sum();
    let artist = tracks
        .iter()
        .all(|t| t.artist == tracks[0].artist)
        .then(|| tracks[0].artist.clone());

    Some(DiscMeta {
        disc_id: disc_id.to_string(),
        title: album,
        artist,
        cd: 1,
        total_cds: 1,
        duration,
        tracks,
    })
}

/// Queries the online registry with exponential backoff (base 200ms,
/// doubling, capped at 5 attempts), then falls back to the disc's own TOC.
fn lookup_metadata(
    disc_id: &str,
    cd_device: &str,
    metadata_client: &Arc<dyn OnlineMetadataClient>,
    toc_reader: &Arc<dyn TocReader>,
) -> Option<crate::model::DiscMeta> {
    let mut delay = LOOKUP_BASE_DELAY;
    for attempt in 0..LOOKUP_MAX_ATTEMPTS {
        if let Some(meta) = metadata_client.lookup(disc_id) {
            return Some(meta);
        }
        if attempt + 1 < LOOKUP_MAX_ATTEMPTS {
            thread::sleep(delay);
            delay *= 2;
        }
    }
    toc_reader.read_toc(cd_device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::fakes::{
        FixedDiscIdentifier, FixedMetadataClient, FixedTagReader, FixedTocReader,
    };
    use crate::interfaces::TrackTags;
    use crate::library::IndexedDisc;
    use std::path::PathBuf;

    fn disc_meta() -> DiscMeta {
        DiscMeta {
            disc_id: "abc123".into(),
            title: "Album".into(),
            artist: Some("Artist".into()),
            cd: 1,
            total_cds: 1,
            duration: 1000,
            tracks: vec![Track {
                artist: "Artist".into(),
                title: "Track".into(),
                duration: 1000,
            }],
        }
    }

    fn config() -> CommanderConfig {
        CommanderConfig {
            cd_device: "/dev/cdrom".into(),
        }
    }

    fn channels() -> (
        (Sender<PlayerCmd>, Receiver<PlayerCmd>),
        (Sender<RipperCmd>, Receiver<RipperCmd>),
    ) {
        (bounded(16), bounded(16))
    }

    #[test]
    fn known_disc_sends_start_with_local_track_list_and_local_metadata() {
        let library = Arc::new(Mutex::new(LibraryIndex::new()));
        library.lock().unwrap().insert(IndexedDisc {
            folder: PathBuf::from("/lib/Artist - Album"),
            disc_id: "abc123".into(),
            track_list: vec![PathBuf::from("/lib/Artist - Album/01 Track.flac")],
        });

        let disc_identifier: Arc<dyn DiscIdentifier> =
            Arc::new(FixedDiscIdentifier(Some("abc123".into())));
        let tag_reader: Arc<dyn LocalTagReader> = Arc::new(FixedTagReader(Some(TrackTags {
            artist: "Artist".into(),
            title: "Track".into(),
            album: "Album".into(),
            duration: 1000,
        })));
        // Configured to fail so the test would see an online/TOC lookup
        // if the known-disc branch wrongly fell back to it.
        let metadata_client: Arc<dyn OnlineMetadataClient> = Arc::new(FixedMetadataClient(None));
        let toc_reader: Arc<dyn TocReader> = Arc::new(FixedTocReader(None));

        let ((player_tx, player_rx), (ripper_tx, ripper_rx)) = channels();
        let mut watch = WaitingForDataWatch::default();
        handle_commander_cmd(
            CommanderCmd::DiscInserted,
            &config(),
            &library,
            &disc_identifier,
            &tag_reader,
            &metadata_client,
            &toc_reader,
            &player_tx,
            &ripper_tx,
            &mut watch,
        );

        assert!(matches!(ripper_rx.try_recv(), Ok(RipperCmd::KnownDisc)));
        match player_rx.try_recv() {
            Ok(PlayerCmd::Start { track_list, disc_meta }) => {
                assert_eq!(track_list.len(), 1);
                assert_eq!(disc_meta.title, "Album");
                assert_eq!(disc_meta.artist.as_deref(), Some("Artist"));
                assert_eq!(disc_meta.duration, 1000);
            }
            other => panic!("expected Start, got {other:?}"),
        }
    }

    #[test]
    fn known_disc_with_unreadable_tags_sends_unknown_disc() {
        let library = Arc::new(Mutex::new(LibraryIndex::new()));
        library.lock().unwrap().insert(IndexedDisc {
            folder: PathBuf::from("/lib/Artist - Album"),
            disc_id: "abc123".into(),
            track_list: vec![PathBuf::from("/lib/Artist - Album/01 Track.flac")],
        });

        let disc_identifier: Arc<dyn DiscIdentifier> =
            Arc::new(FixedDiscIdentifier(Some("abc123".into())));
        let tag_reader: Arc<dyn LocalTagReader> = Arc::new(FixedTagReader(None));
        let metadata_client: Arc<dyn OnlineMetadataClient> = Arc::new(FixedMetadataClient(None));
        let toc_reader: Arc<dyn TocReader> = Arc::new(FixedTocReader(None));

        let ((player_tx, player_rx), (ripper_tx, ripper_rx)) = channels();
        let mut watch = WaitingForDataWatch::default();
        handle_commander_cmd(
            CommanderCmd::DiscInserted,
            &config(),
            &library,
            &disc_identifier,
            &tag_reader,
            &metadata_client,
            &toc_reader,
            &player_tx,
            &ripper_tx,
            &mut watch,
        );

        assert!(matches!(player_rx.try_recv(), Ok(PlayerCmd::UnknownDisc)));
        assert!(ripper_rx.try_recv().is_err());
    }

    #[test]
    fn unknown_disc_id_sends_unknown_disc_to_player_only() {
        let library = Arc::new(Mutex::new(LibraryIndex::new()));
        let disc_identifier: Arc<dyn DiscIdentifier> = Arc::new(FixedDiscIdentifier(None));
        let tag_reader: Arc<dyn LocalTagReader> = Arc::new(FixedTagReader(None));
        let metadata_client: Arc<dyn OnlineMetadataClient> = Arc::new(FixedMetadataClient(None));
        let toc_reader: Arc<dyn TocReader> = Arc::new(FixedTocReader(None));

        let ((player_tx, player_rx), (ripper_tx, ripper_rx)) = channels();
        let mut watch = WaitingForDataWatch::default();
        handle_commander_cmd(
            CommanderCmd::DiscInserted,
            &config(),
            &library,
            &disc_identifier,
            &tag_reader,
            &metadata_client,
            &toc_reader,
            &player_tx,
            &ripper_tx,
            &mut watch,
        );

        assert!(matches!(player_rx.try_recv(), Ok(PlayerCmd::UnknownDisc)));
        assert!(ripper_rx.try_recv().is_err());
    }

    #[test]
    fn new_disc_falls_back_to_toc_when_online_lookup_fails() {
        let library = Arc::new(Mutex::new(LibraryIndex::new()));
        let disc_identifier: Arc<dyn DiscIdentifier> =
            Arc::new(FixedDiscIdentifier(Some("new-disc".into())));
        let metadata_client: Arc<dyn OnlineMetadataClient> = Arc::new(FixedMetadataClient(None));
        let toc_reader: Arc<dyn TocReader> = Arc::new(FixedTocReader(Some(disc_meta())));

        let meta = lookup_metadata("new-disc", "/dev/cdrom", &metadata_client, &toc_reader);
        assert!(meta.is_some());
        let _ = library;
        let _ = disc_identifier;
    }

    #[test]
    fn eject_routes_to_both_player_and_ripper() {
        let library = Arc::new(Mutex::new(LibraryIndex::new()));
        let disc_identifier: Arc<dyn DiscIdentifier> = Arc::new(FixedDiscIdentifier(None));
        let tag_reader: Arc<dyn LocalTagReader> = Arc::new(FixedTagReader(None));
        let metadata_client: Arc<dyn OnlineMetadataClient> = Arc::new(FixedMetadataClient(None));
        let toc_reader: Arc<dyn TocReader> = Arc::new(FixedTocReader(None));

        let ((player_tx, player_rx), (ripper_tx, ripper_rx)) = channels();
        let mut watch = WaitingForDataWatch { waiting: true };
        handle_commander_cmd(
            CommanderCmd::Eject,
            &config(),
            &library,
            &disc_identifier,
            &tag_reader,
            &metadata_client,
            &toc_reader,
            &player_tx,
            &ripper_tx,
            &mut watch,
        );

        assert!(matches!(player_rx.try_recv(), Ok(PlayerCmd::Eject)));
        assert!(matches!(ripper_rx.try_recv(), Ok(RipperCmd::Eject)));
        assert!(!watch.waiting);
    }

    #[test]
    fn ripper_status_while_waiting_for_data_also_sends_play() {
        let library = Arc::new(Mutex::new(LibraryIndex::new()));
        let disc_identifier: Arc<dyn DiscIdentifier> = Arc::new(FixedDiscIdentifier(None));
        let tag_reader: Arc<dyn LocalTagReader> = Arc::new(FixedTagReader(None));
        let metadata_client: Arc<dyn OnlineMetadataClient> = Arc::new(FixedMetadataClient(None));
        let toc_reader: Arc<dyn TocReader> = Arc::new(FixedTocReader(None));

        let ((player_tx, player_rx), (ripper_tx, _ripper_rx)) = channels();
        let mut watch = WaitingForDataWatch { waiting: true };
        let status = RipperSnapshot {
            state: crate::model::RipperState::Ripping,
            disc_meta: None,
            current_track_index: 1,
            folder: None,
            track_list: vec![PathBuf::from("/lib/Album/01 Track.flac")],
        };
        handle_commander_cmd(
            CommanderCmd::RipperStatus(status),
            &config(),
            &library,
            &disc_identifier,
            &tag_reader,
            &metadata_client,
            &toc_reader,
            &player_tx,
            &ripper_tx,
            &mut watch,
        );

        assert!(matches!(player_rx.try_recv(), Ok(PlayerCmd::RipperUpdate(_))));
        assert!(matches!(player_rx.try_recv(), Ok(PlayerCmd::Play)));
    }
}
