// Translates between bus `Message`s (a command/identity name frame plus
// an optional JSON payload frame) and the typed command enums each state
// machine's loop actually consumes. Kept out of `src/bin/*.rs` so the
// per-process binaries stay thin wiring.

use crate::bus::{frame, message_name, Message};
use crate::commander::CommanderCmd;
use crate::model::{DiscMeta, PlayerSnapshot, RipperSnapshot};
use crate::player::PlayerCmd;
use crate::ripper::RipperCmd;

#[derive(serde::Serialize, serde::Deserialize)]
struct StartPayload {
    track_list: Vec<std::path::PathBuf>,
    disc_meta: DiscMeta,
}

pub fn player_cmd_from_message(msg: &Message) -> Option<PlayerCmd> {
    let name = message_name(msg);
    match name.as_str() {
        "start" => {
            let payload: StartPayload = serde_json::from_slice(msg.get(1)?).ok()?;
            Some(PlayerCmd::Start {
                track_list: payload.track_list,
                disc_meta: payload.disc_meta,
            })
        }
        "unknown_disc" => Some(PlayerCmd::UnknownDisc),
        "play" => Some(PlayerCmd::Play),
        "stop" => Some(PlayerCmd::Stop),
        "pause" => Some(PlayerCmd::Pause),
        "next" => Some(PlayerCmd::Next),
        "prev" => Some(PlayerCmd::Prev),
        "eject" => Some(PlayerCmd::Eject),
        "ripper_update" => {
            let list: Vec<std::path::PathBuf> = serde_json::from_slice(msg.get(1)?).ok()?;
            Some(PlayerCmd::RipperUpdate(list))
        }
        _ => {
            log::error!("player: unknown command name {name:?} on command_playback queue");
            None
        }
    }
}

pub fn ripper_cmd_from_message(msg: &Message) -> Option<RipperCmd> {
    let name = message_name(msg);
    match name.as_str() {
        "start" => {
            let disc_meta: DiscMeta = serde_json::from_slice(msg.get(1)?).ok()?;
            Some(RipperCmd::Start(disc_meta))
        }
        "known_disc" => Some(RipperCmd::KnownDisc),
        "eject" => Some(RipperCmd::Eject),
        _ => {
            log::error!("ripper: unknown command name {name:?} on command_ripping queue");
            None
        }
    }
}

pub fn commander_cmd_from_message(msg: &Message) -> Option<CommanderCmd> {
    let name = message_name(msg);
    match name.as_str() {
        "disc" => Some(CommanderCmd::DiscInserted),
        "eject" => Some(CommanderCmd::Eject),
        "play" => Some(CommanderCmd::Play),
        "stop" => Some(CommanderCmd::Stop),
        "pause" => Some(CommanderCmd::Pause),
        "next" => Some(CommanderCmd::Next),
        "prev" => Some(CommanderCmd::Prev),
        _ => {
            log::error!("commander: unknown command name {name:?} on command queue");
            None
        }
    }
}

/// Dispatches a `state` topic message by publisher identity into the
/// matching `CommanderCmd` variant, so the Commander's single event loop can
/// treat Player and Ripper status exactly like any other trigger.
pub fn commander_cmd_from_state_topic(msg: &Message) -> Option<CommanderCmd> {
    let identity = message_name(msg);
    let payload = msg.get(1)?;
    match identity.as_str() {
        "player" => {
            let snapshot: PlayerSnapshot = serde_json::from_slice(payload).ok()?;
            Some(CommanderCmd::PlayerStatus(snapshot))
        }
        "ripper" => {
            let snapshot: RipperSnapshot = serde_json::from_slice(payload).ok()?;
            Some(CommanderCmd::RipperStatus(snapshot))
        }
        other => {
            log::debug!("commander: state message from unrecognised publisher {other:?}");
            None
        }
    }
}

pub fn state_message(identity: &str, snapshot: &impl serde::Serialize) -> Message {
    vec![frame(identity), serde_json::to_vec(snapshot).unwrap_or_default()]
}

/// Encodes the subset of `PlayerCmd` the Commander ever sends across the
/// wire. `Playing`/`Finish` are internal, Audio-Sink-only triggers and have
/// no wire form.
pub fn message_from_player_cmd(cmd: &PlayerCmd) -> Option<Message> {
    match cmd {
        PlayerCmd::Start { track_list, disc_meta } => {
            let payload = StartPayload {
                track_list: track_list.clone(),
                disc_meta: disc_meta.clone(),
            };
            Some(vec![frame("start"), serde_json::to_vec(&payload).ok()?])
        }
        PlayerCmd::UnknownDisc => Some(vec![frame("unknown_disc")]),
        PlayerCmd::Play => Some(vec![frame("play")]),
        PlayerCmd::Stop => Some(vec![frame("stop")]),
        PlayerCmd::Pause => Some(vec![frame("pause")]),
        PlayerCmd::Next => Some(vec![frame("next")]),
        PlayerCmd::Prev => Some(vec![frame("prev")]),
        PlayerCmd::Eject => Some(vec![frame("eject")]),
        PlayerCmd::RipperUpdate(list) => {
            Some(vec![frame("ripper_update"), serde_json::to_vec(list).ok()?])
        }
        PlayerCmd::Playing(_) | PlayerCmd::Finish | PlayerCmd::Quit => None,
    }
}

/// Encodes the subset of `RipperCmd` the Commander ever sends across the
/// wire. `RipTrack`/`Quit` are internal to the Ripper's own executor loop.
pub fn message_from_ripper_cmd(cmd: &RipperCmd) -> Option<Message> {
    match cmd {
        RipperCmd::Start(disc_meta) => Some(vec![frame("start"), serde_json::to_vec(disc_meta).ok()?]),
        RipperCmd::KnownDisc => Some(vec![frame("known_disc")]),
        RipperCmd::Eject => Some(vec![frame("eject")]),
        RipperCmd::RipTrack | RipperCmd::Quit => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Track;

    #[test]
    fn start_message_round_trips_into_player_cmd() {
        let disc = DiscMeta {
            disc_id: "d1".into(),
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
        };
        let payload = serde_json::to_vec(&StartPayload {
            track_list: vec![std::path::PathBuf::from("/t/01.flac")],
            disc_meta: disc.clone(),
        })
        .unwrap();
        let msg: Message = vec![frame("start"), payload];
        match player_cmd_from_message(&msg) {
            Some(PlayerCmd::Start { track_list, disc_meta }) => {
                assert_eq!(track_list.len(), 1);
                assert_eq!(disc_meta, disc);
            }
            _ => panic!("expected Start"),
        }
    }

    #[test]
    fn unknown_command_name_is_rejected() {
        let msg: Message = vec![frame("frobnicate")];
        assert!(player_cmd_from_message(&msg).is_none());
    }

    #[test]
    fn state_topic_dispatches_by_publisher_identity() {
        let snapshot = PlayerSnapshot::init();
        let msg = state_message("player", &snapshot);
        assert!(matches!(
            commander_cmd_from_state_topic(&msg),
            Some(CommanderCmd::PlayerStatus(_))
        ));
    }
}
