// Shared data model: disc/track metadata and the externally-visible state
// snapshots of the Player and Ripper state machines. Every duration here is
// in PCM frames (one stereo sample pair), never single-channel samples.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const SAMPLE_RATE: u32 = 44_100;
pub const CHANNELS: u16 = 2;
pub const SAMPLE_WIDTH: u16 = 2;

/// Seconds of remaining audio in the current track that triggers
/// pre-buffering of the next one.
pub const NEXT_TRACK_BUFFER_THRESHOLD_SECONDS: u32 = 30;

/// Half a second of tolerated over-read past a track's reported frame
/// count before the cursor is considered to have crossed into the next
/// track. Absorbs one Audio Sink callback quantum.
pub const TRACK_BOUNDARY_TOLERANCE_FRAMES: u64 = (SAMPLE_RATE / 2) as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub artist: String,
    pub title: String,
    /// Duration in PCM frames.
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscMeta {
    pub disc_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default = "default_cd")]
    pub cd: u32,
    #[serde(default = "default_cd")]
    pub total_cds: u32,
    /// Duration in PCM frames.
    pub duration: u64,
    pub tracks: Vec<Track>,
}

fn default_cd() -> u32 {
    1
}

impl DiscMeta {
    /// True when the disc has no well-defined album-level artist (a
    /// various-artists compilation), which changes the Ripper's folder
    /// naming template.
    pub fn is_various_artists(&self) -> bool {
        self.artist.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Init,
    NoDisc,
    UnknownDisc,
    Stopped,
    Playing,
    Paused,
    WaitingForData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_meta: Option<DiscMeta>,
    /// 1-based.
    pub current_track: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_track_frames: Option<u64>,
}

impl PlayerSnapshot {
    pub fn init() -> Self {
        Self {
            state: PlayerState::Init,
            disc_meta: None,
            current_track: 1,
            current_frame: None,
            total_frames: None,
            next_track_frames: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RipperState {
    Idle,
    KnownDisc,
    Ripping,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RipperSnapshot {
    pub state: RipperState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_meta: Option<DiscMeta>,
    /// 0-based index of the next track to rip.
    pub current_track_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
    pub track_list: Vec<PathBuf>,
}

impl RipperSnapshot {
    pub fn idle() -> Self {
        Self {
            state: RipperState::Idle,
            disc_meta: None,
            current_track_index: 0,
            folder: None,
            track_list: Vec::new(),
        }
    }
}
