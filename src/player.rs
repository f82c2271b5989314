// Player state machine: a gapless-playback engine driving the Audio
// Sink across a disc's track list. Runs on its own thread; commands and
// Audio Sink notifications are both funnelled onto the same command
// channel, which is what "marshal every callback onto the Player's own
// event loop" reduces to once there's a single receiver.
//
// Shaped directly on player::{spawn_player, player_loop, handle_cmd,
// send_status} in this codebase's own SID player thread: a dedicated
// thread owns all mutable state, `select!` over the command channel while
// idle, and a status snapshot is pushed after every state-affecting step.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};

use crate::audio_sink::{AudioSink, SinkEvent};
use crate::interfaces::PcmDecoder;
use crate::model::{
    DiscMeta, PlayerSnapshot, PlayerState, NEXT_TRACK_BUFFER_THRESHOLD_SECONDS, SAMPLE_RATE,
    TRACK_BOUNDARY_TOLERANCE_FRAMES,
};

#[derive(Debug, Clone)]
pub enum PlayerCmd {
    Start {
        track_list: Vec<PathBuf>,
        disc_meta: DiscMeta,
    },
    UnknownDisc,
    Play,
    Stop,
    Pause,
    Next,
    Prev,
    Eject,
    RipperUpdate(Vec<PathBuf>),
    /// Internal: forwarded from the Audio Sink's notification executor.
    Playing(u64),
    /// Internal: forwarded from the Audio Sink's notification executor.
    Finish,
    Quit,
}

pub fn spawn_player(decoder: Arc<dyn PcmDecoder>) -> (Sender<PlayerCmd>, Receiver<PlayerSnapshot>) {
    let (cmd_tx, cmd_rx) = bounded::<PlayerCmd>(64);
    let (status_tx, status_rx) = bounded::<PlayerSnapshot>(16);

    let loop_cmd_tx = cmd_tx.clone();
    thread::Builder::new()
        .name("player".into())
        .spawn(move || {
            player_loop(cmd_rx, loop_cmd_tx, status_tx, decoder);
        })
        .expect("failed to spawn player thread");

    (cmd_tx, status_rx)
}

struct Player {
    state: PlayerState,
    disc_meta: Option<DiscMeta>,
    track_list: Vec<PathBuf>,
    current_track: u32,
    current_frame: Option<u64>,
    total_frames: Option<u64>,
    next_track_frames: Option<u64>,
    sink: Option<AudioSink>,
    sink_event_forward: Option<thread::JoinHandle<()>>,
    /// Non-reentrant guard around position/look-ahead accounting.
    /// Every mutation already runs serialized on this single thread,
    /// so this is never actually contended -- it documents the invariant
    /// the original design relied on rather than enforcing a new one.
    updating: AtomicBool,
}

impl Player {
    fn new() -> Self {
        Self {
            state: PlayerState::Init,
            disc_meta: None,
            track_list: Vec::new(),
            current_track: 1,
            current_frame: None,
            total_frames: None,
            next_track_frames: None,
            sink: None,
            sink_event_forward: None,
            updating: AtomicBool::new(false),
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            state: self.state,
            disc_meta: self.disc_meta.clone(),
            current_track: self.current_track,
            current_frame: self.current_frame,
            total_frames: self.total_frames,
            next_track_frames: self.next_track_frames,
        }
    }

    fn track_available(&self, n: u32) -> bool {
        n >= 1 && (n as usize) <= self.track_list.len()
    }

    fn has_next(&self) -> bool {
        self.disc_meta
            .as_ref()
            .map(|d| self.current_track < d.tracks.len() as u32)
            .unwrap_or(false)
    }

    fn has_prev(&self) -> bool {
        self.current_track > 1
    }

    fn next_available(&self) -> bool {
        self.track_available(self.current_track + 1)
    }

    fn clear_disc_state(&mut self) {
        self.disc_meta = None;
        self.track_list.clear();
        self.current_track = 1;
        self.current_frame = None;
        self.total_frames = None;
        self.next_track_frames = None;
    }

    fn clear_cursor(&mut self) {
        self.current_frame = None;
        self.total_frames = None;
        self.next_track_frames = None;
    }

    /// Tears down the Audio Sink, if any. Blocking on the forwarder thread
    /// is safe here: releasing the sink causes its device thread to stop
    /// producing frames, which ends the forwarder's channel iteration.
    fn stop_playback(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.release();
            drop(sink);
        }
        if let Some(handle) = self.sink_event_forward.take() {
            let _ = handle.join();
        }
    }

    fn start_playback(
        &mut self,
        decoder: &Arc<dyn PcmDecoder>,
        cmd_tx: &Sender<PlayerCmd>,
    ) -> crate::error::Result<()> {
        if self.sink.is_some() {
            return Err(crate::error::PlatterError::State(
                "audio sink already exists",
            ));
        }

        let sink = AudioSink::new(Arc::clone(decoder))?;
        let events = sink.events();
        let forward_tx = cmd_tx.clone();
        let handle = thread::Builder::new()
            .name("sink-events".into())
            .spawn(move || forward_sink_events(events, forward_tx))
            .expect("failed to spawn sink event forwarder");

        self.current_frame = Some(0);
        self.next_track_frames = None;
        let path = self.track_list[(self.current_track - 1) as usize].clone();
        let frames = sink.buffer_track(&path)?;
        self.total_frames = Some(frames);
        sink.resume();

        self.sink = Some(sink);
        self.sink_event_forward = Some(handle);
        Ok(())
    }

    fn advance_to_next_track_in_place(&mut self) {
        self.current_track += 1;
        self.clear_cursor();
    }

    fn retreat_to_prev_track_in_place(&mut self) {
        self.current_track -= 1;
        self.clear_cursor();
    }

    /// Position accounting and look-ahead, guarded by a non-reentrant
    /// try-lock: if another update is already in progress the callback
    /// returns immediately and the next one converges on the same state.
    fn update_position(&mut self, frames: u64) {
        if self
            .updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let current = self.current_frame.unwrap_or(0) + frames;
        self.current_frame = Some(current);

        let total = self.total_frames.unwrap_or(0);

        if self.next_track_frames.is_none() {
            let remaining = total.saturating_sub(current);
            let threshold = (NEXT_TRACK_BUFFER_THRESHOLD_SECONDS as u64) * (SAMPLE_RATE as u64);
            if remaining < threshold && self.next_available() {
                // 0-based index for the not-yet-incremented current track
                // addresses the next track's file.
                let path = self.track_list[self.current_track as usize].clone();
                if let Some(ref sink) = self.sink {
                    if let Ok(frames) = sink.buffer_track(&path) {
                        self.next_track_frames = Some(frames);
                    }
                }
            }
        }

        if current.saturating_sub(total) > TRACK_BOUNDARY_TOLERANCE_FRAMES {
            self.current_frame = Some(current - total);
            self.total_frames = self.next_track_frames;
            self.next_track_frames = None;
            self.current_track += 1;
        }

        self.updating.store(false, Ordering::SeqCst);
    }

    fn handle(
        &mut self,
        cmd: PlayerCmd,
        decoder: &Arc<dyn PcmDecoder>,
        cmd_tx: &Sender<PlayerCmd>,
    ) -> crate::error::Result<bool> {
        use PlayerState::*;
        match cmd {
            PlayerCmd::Quit => return Ok(false),

            PlayerCmd::Start {
                track_list,
                disc_meta,
            } => {
                if self.state == NoDisc || self.state == Init {
                    self.track_list = track_list;
                    self.disc_meta = Some(disc_meta);
                    self.current_track = 1;
                    self.state = Stopped;
                } else {
                    log::debug!("start rejected in state {:?}", self.state);
                }
            }

            PlayerCmd::UnknownDisc => {
                if self.state == NoDisc || self.state == Init {
                    self.state = UnknownDisc;
                } else {
                    log::debug!("unknown_disc rejected in state {:?}", self.state);
                }
            }

            PlayerCmd::Play => match self.state {
                Stopped | WaitingForData => {
                    if self.track_available(self.current_track) {
                        self.start_playback(decoder, cmd_tx)?;
                        self.state = Playing;
                    } else {
                        self.state = WaitingForData;
                    }
                }
                Paused => {
                    if let Some(ref sink) = self.sink {
                        sink.resume();
                    }
                    self.state = Playing;
                }
                Playing => {} // idempotent
                _ => log::debug!("play rejected in state {:?}", self.state),
            },

            PlayerCmd::Pause => {
                if self.state == Playing {
                    if let Some(ref sink) = self.sink {
                        sink.pause();
                    }
                    self.state = Paused;
                } else if self.state != Paused {
                    log::debug!("pause rejected in state {:?}", self.state);
                }
            }

            PlayerCmd::Stop => match self.state {
                Playing | Paused | WaitingForData => {
                    self.stop_playback();
                    self.clear_cursor();
                    self.state = Stopped;
                }
                Stopped => {} // idempotent
                _ => log::debug!("stop rejected in state {:?}", self.state),
            },

            PlayerCmd::Finish => {
                if self.state == Playing {
                    self.stop_playback();
                    if self.has_next() {
                        self.advance_to_next_track_in_place();
                        self.state = WaitingForData;
                    } else {
                        self.clear_cursor();
                        self.state = Stopped;
                    }
                }
            }

            PlayerCmd::Next => match self.state {
                Playing if self.has_next() && self.next_available() => {
                    self.stop_playback();
                    self.advance_to_next_track_in_place();
                    self.start_playback(decoder, cmd_tx)?;
                }
                Playing if self.has_next() => {
                    self.stop_playback();
                    self.advance_to_next_track_in_place();
                    self.state = WaitingForData;
                }
                Stopped if self.has_next() => self.advance_to_next_track_in_place(),
                Paused if self.has_next() => {
                    self.stop_playback();
                    self.advance_to_next_track_in_place();
                    self.state = Stopped;
                }
                WaitingForData if self.has_next() => {
                    self.advance_to_next_track_in_place();
                    if self.track_available(self.current_track) {
                        self.start_playback(decoder, cmd_tx)?;
                        self.state = Playing;
                    }
                }
                _ => log::debug!("next rejected in state {:?}", self.state),
            },

            PlayerCmd::Prev => match self.state {
                Playing if self.has_prev() => {
                    self.stop_playback();
                    self.retreat_to_prev_track_in_place();
                    self.start_playback(decoder, cmd_tx)?;
                }
                Stopped if self.has_prev() => self.retreat_to_prev_track_in_place(),
                Paused if self.has_prev() => {
                    self.stop_playback();
                    self.retreat_to_prev_track_in_place();
                    self.state = Stopped;
                }
                WaitingForData if self.has_prev() => {
                    self.retreat_to_prev_track_in_place();
                    if self.track_available(self.current_track) {
                        self.start_playback(decoder, cmd_tx)?;
                        self.state = Playing;
                    }
                }
                _ => log::debug!("prev rejected in state {:?}", self.state),
            },

            PlayerCmd::Eject => {
                self.stop_playback();
                self.clear_disc_state();
                self.state = NoDisc;
            }

            PlayerCmd::RipperUpdate(list) => {
                self.track_list = list;
            }

            PlayerCmd::Playing(frames) => {
                if self.state == Playing {
                    self.update_position(frames);
                }
            }
        }
        Ok(true)
    }
}

fn forward_sink_events(events: Receiver<SinkEvent>, cmd_tx: Sender<PlayerCmd>) {
    for ev in events {
        let cmd = match ev {
            SinkEvent::FramesPlayed(n) => PlayerCmd::Playing(n),
            SinkEvent::PlaybackStopped => PlayerCmd::Finish,
        };
        if cmd_tx.send(cmd).is_err() {
            return;
        }
    }
}

fn player_loop(
    cmd_rx: Receiver<PlayerCmd>,
    cmd_tx: Sender<PlayerCmd>,
    status_tx: Sender<PlayerSnapshot>,
    decoder: Arc<dyn PcmDecoder>,
) {
    let mut player = Player::new();
    player.state = PlayerState::NoDisc;
    let idle_tick = tick(std::time::Duration::from_millis(200));

    let _ = status_tx.try_send(player.snapshot());

    loop {
        select! {
            recv(cmd_rx) -> msg => {
                let Ok(cmd) = msg else { break };
                match player.handle(cmd, &decoder, &cmd_tx) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        log::error!("player: fatal error: {e}");
                        break;
                    }
                }
                let _ = status_tx.try_send(player.snapshot());
            }
            recv(idle_tick) -> _ => {
                let _ = status_tx.try_send(player.snapshot());
            }
        }
    }

    player.stop_playback();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::fakes::SilentDecoder;
    use crate::model::Track;

    fn make_disc(track_frames: &[u64]) -> DiscMeta {
        DiscMeta {
            disc_id: "d1".into(),
            title: "Album".into(),
            artist: Some("Artist".into()),
            cd: 1,
            total_cds: 1,
            duration: track_frames.iter().sum(),
            tracks: track_frames
                .iter()
                .map(|&d| Track {
                    artist: "Artist".into(),
                    title: "Track".into(),
                    duration: d,
                })
                .collect(),
        }
    }

    fn drive(player: &mut Player, cmds: Vec<PlayerCmd>, decoder: &Arc<dyn PcmDecoder>) {
        let (tx, _rx) = bounded::<PlayerCmd>(64);
        for cmd in cmds {
            player.handle(cmd, decoder, &tx).unwrap();
        }
    }

    #[test]
    fn waiting_for_data_when_no_tracks_ripped_yet() {
        let decoder: Arc<dyn PcmDecoder> = Arc::new(SilentDecoder { frames: 1000 });
        let mut player = Player::new();
        player.state = PlayerState::NoDisc;
        drive(
            &mut player,
            vec![
                PlayerCmd::Start {
                    track_list: vec![],
                    disc_meta: make_disc(&[1000, 1000]),
                },
                PlayerCmd::Play,
            ],
            &decoder,
        );
        assert_eq!(player.state, PlayerState::WaitingForData);
        assert_eq!(player.current_track, 1);
    }

    #[test]
    fn ripper_update_then_play_transitions_to_waiting_for_data_resolution() {
        let decoder: Arc<dyn PcmDecoder> = Arc::new(SilentDecoder { frames: 1000 });
        let mut player = Player::new();
        player.state = PlayerState::NoDisc;
        drive(
            &mut player,
            vec![
                PlayerCmd::Start {
                    track_list: vec![],
                    disc_meta: make_disc(&[1000, 1000, 1000, 1000]),
                },
                PlayerCmd::Play,
            ],
            &decoder,
        );
        assert_eq!(player.state, PlayerState::WaitingForData);

        player.track_list = vec![PathBuf::from("/t/01.flac")];
        assert!(player.track_available(1));
    }

    #[test]
    fn eject_clears_all_disc_scoped_state() {
        let decoder: Arc<dyn PcmDecoder> = Arc::new(SilentDecoder { frames: 1000 });
        let mut player = Player::new();
        player.state = PlayerState::NoDisc;
        drive(
            &mut player,
            vec![
                PlayerCmd::Start {
                    track_list: vec![PathBuf::from("/t/01.flac")],
                    disc_meta: make_disc(&[1000]),
                },
                PlayerCmd::Eject,
            ],
            &decoder,
        );
        assert_eq!(player.state, PlayerState::NoDisc);
        assert!(player.disc_meta.is_none());
        assert!(player.track_list.is_empty());
        assert_eq!(player.current_track, 1);
    }

    #[test]
    fn next_then_prev_from_stopped_is_a_no_op_on_track_number() {
        let decoder: Arc<dyn PcmDecoder> = Arc::new(SilentDecoder { frames: 1000 });
        let mut player = Player::new();
        player.state = PlayerState::NoDisc;
        drive(
            &mut player,
            vec![PlayerCmd::Start {
                track_list: vec![
                    PathBuf::from("/t/01.flac"),
                    PathBuf::from("/t/02.flac"),
                ],
                disc_meta: make_disc(&[1000, 1000]),
            }],
            &decoder,
        );
        assert_eq!(player.state, PlayerState::Stopped);
        drive(&mut player, vec![PlayerCmd::Next, PlayerCmd::Prev], &decoder);
        assert_eq!(player.current_track, 1);
    }

    #[test]
    fn unavailable_unknown_disc_rejected_while_playing_state_persists() {
        let decoder: Arc<dyn PcmDecoder> = Arc::new(SilentDecoder { frames: 1000 });
        let mut player = Player::new();
        player.state = PlayerState::NoDisc;
        drive(
            &mut player,
            vec![PlayerCmd::Start {
                track_list: vec![PathBuf::from("/t/01.flac")],
                disc_meta: make_disc(&[1000]),
            }],
            &decoder,
        );
        // UnknownDisc is only valid from NO_DISC/INIT; Stopped must reject it.
        drive(&mut player, vec![PlayerCmd::UnknownDisc], &decoder);
        assert_eq!(player.state, PlayerState::Stopped);
    }
}
