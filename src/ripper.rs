// Ripper state machine: sequential track extraction into a tagged,
// templated on-disk layout. Runs its rip loop on a single-threaded executor
// owned by the Ripper so it never blocks the command receiver, shaped on
// this codebase's own spawn_player/player_loop thread-plus-channel pattern.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use tempfile::NamedTempFile;

use crate::interfaces::{LosslessEncoder, TagWriter, TrackGrabber};
use crate::model::{DiscMeta, RipperSnapshot, RipperState};

#[derive(Debug, Clone)]
pub enum RipperCmd {
    Start(DiscMeta),
    KnownDisc,
    Eject,
    /// Drives one track of the rip loop; re-sent by the loop itself after
    /// each successful or retried track until the disc is DONE.
    RipTrack,
    Quit,
}

pub struct RipperConfig {
    pub library_root: PathBuf,
    pub cd_device: String,
    pub album_folder_template: String,
    pub va_album_folder_template: String,
    pub track_filename_template: String,
    pub rip_retry_limit: u32,
}

pub fn spawn_ripper(
    config: RipperConfig,
    grabber: Arc<dyn TrackGrabber>,
    encoder: Arc<dyn LosslessEncoder>,
    tagger: Arc<dyn TagWriter>,
) -> (Sender<RipperCmd>, Receiver<RipperSnapshot>) {
    let (cmd_tx, cmd_rx) = bounded::<RipperCmd>(64);
    let (status_tx, status_rx) = bounded::<RipperSnapshot>(16);

    let loop_cmd_tx = cmd_tx.clone();
    thread::Builder::new()
        .name("ripper".into())
        .spawn(move || {
            ripper_loop(cmd_rx, loop_cmd_tx, status_tx, config, grabber, encoder, tagger);
        })
        .expect("failed to spawn ripper thread");

    (cmd_tx, status_rx)
}

struct Ripper {
    state: RipperState,
    disc_meta: Option<DiscMeta>,
    current_track_index: u32,
    folder: Option<PathBuf>,
    track_list: Vec<PathBuf>,
    retries_remaining: u32,
}

impl Ripper {
    fn new() -> Self {
        Self {
            state: RipperState::Idle,
            disc_meta: None,
            current_track_index: 0,
            folder: None,
            track_list: Vec::new(),
            retries_remaining: 0,
        }
    }

    fn snapshot(&self) -> RipperSnapshot {
        RipperSnapshot {
            state: self.state,
            disc_meta: self.disc_meta.clone(),
            current_track_index: self.current_track_index,
            folder: self.folder.clone(),
            track_list: self.track_list.clone(),
        }
    }
}

/// Replaces characters that can't appear in a path segment with a space.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { ' ' } else { c })
        .collect()
}

fn render_folder(config: &RipperConfig, disc: &DiscMeta) -> PathBuf {
    let name = if let Some(artist) = &disc.artist {
        config
            .album_folder_template
            .replace("{artist}", artist)
            .replace("{title}", &disc.title)
    } else {
        config.va_album_folder_template.replace("{title}", &disc.title)
    };
    let mut folder = config.library_root.join(sanitize(&name));
    if disc.total_cds > 1 {
        folder = folder.join(format!("CD{}", disc.cd));
    }
    folder
}

fn render_track_filename(config: &RipperConfig, disc: &DiscMeta, track_number: u32, ext: &str) -> String {
    let track = &disc.tracks[(track_number - 1) as usize];
    let name = config
        .track_filename_template
        .replace("{track:02}", &format!("{:02}", track_number))
        .replace("{artist}", &track.artist)
        .replace("{title}", &track.title);
    format!("{}.{ext}", sanitize(&name))
}

fn rip_one_track(
    config: &RipperConfig,
    ripper: &Ripper,
    grabber: &Arc<dyn TrackGrabber>,
    encoder: &Arc<dyn LosslessEncoder>,
    tagger: &Arc<dyn TagWriter>,
) -> std::io::Result<PathBuf> {
    let disc = ripper.disc_meta.as_ref().expect("rip_track without disc_meta");
    let folder = ripper.folder.as_ref().expect("rip_track without folder");
    let track_number = ripper.current_track_index + 1;

    let raw = NamedTempFile::new_in(folder)?;
    grabber.grab_track(&config.cd_device, track_number, raw.path())?;

    let filename = render_track_filename(config, disc, track_number, encoder.extension());
    let final_path = folder.join(filename);
    let encoded = NamedTempFile::new_in(folder)?;
    encoder.encode(raw.path(), encoded.path())?;

    tagger.write_tags(
        encoded.path(),
        &disc.tracks[(track_number - 1) as usize],
        disc,
        track_number,
    )?;

    encoded.persist(&final_path).map_err(|e| e.error)?;
    Ok(final_path)
}

fn write_marker(folder: &Path, disc_id: &str) -> std::io::Result<()> {
    std::fs::write(folder.join(".disc_id"), disc_id)
}

fn ripper_loop(
    cmd_rx: Receiver<RipperCmd>,
    cmd_tx: Sender<RipperCmd>,
    status_tx: Sender<RipperSnapshot>,
    config: RipperConfig,
    grabber: Arc<dyn TrackGrabber>,
    encoder: Arc<dyn LosslessEncoder>,
    tagger: Arc<dyn TagWriter>,
) {
    let mut ripper = Ripper::new();
    let idle_tick = tick(std::time::Duration::from_millis(500));
    let _ = status_tx.try_send(ripper.snapshot());

    loop {
        select! {
            recv(cmd_rx) -> msg => {
                let Ok(cmd) = msg else { break };
                if !handle_ripper_cmd(&mut ripper, cmd, &config, &cmd_tx, &grabber, &encoder, &tagger) {
                    break;
                }
                let _ = status_tx.try_send(ripper.snapshot());
            }
            recv(idle_tick) -> _ => {
                let _ = status_tx.try_send(ripper.snapshot());
            }
        }
    }
}

fn handle_ripper_cmd(
    ripper: &mut Ripper,
    cmd: RipperCmd,
    config: &RipperConfig,
    cmd_tx: &Sender<RipperCmd>,
    grabber: &Arc<dyn TrackGrabber>,
    encoder: &Arc<dyn LosslessEncoder>,
    tagger: &Arc<dyn TagWriter>,
) -> bool {
    use RipperState::*;
    match cmd {
        RipperCmd::Quit => return false,

        RipperCmd::Start(disc_meta) => {
            if ripper.state == Idle {
                let folder = render_folder(config, &disc_meta);
                if let Err(e) = std::fs::create_dir_all(&folder) {
                    log::error!("ripper: cannot create {}: {e}", folder.display());
                    return true;
                }
                ripper.track_list.clear();
                ripper.current_track_index = 0;
                ripper.retries_remaining = config.rip_retry_limit;
                ripper.folder = Some(folder);
                ripper.disc_meta = Some(disc_meta);
                ripper.state = Ripping;
                let _ = cmd_tx.send(RipperCmd::RipTrack);
            } else {
                log::debug!("start rejected in state {:?}", ripper.state);
            }
        }

        RipperCmd::KnownDisc => {
            if ripper.state == Idle {
                ripper.state = KnownDisc;
            } else {
                log::debug!("known_disc rejected in state {:?}", ripper.state);
            }
        }

        RipperCmd::RipTrack => {
            if ripper.state != Ripping {
                return true;
            }
            let total_tracks = ripper
                .disc_meta
                .as_ref()
                .map(|d| d.tracks.len() as u32)
                .unwrap_or(0);

            if ripper.current_track_index >= total_tracks {
                if ripper.current_track_index == total_tracks {
                    let disc_id = ripper.disc_meta.as_ref().unwrap().disc_id.clone();
                    let folder = ripper.folder.clone().unwrap();
                    if let Err(e) = write_marker(&folder, &disc_id) {
                        log::error!("ripper: cannot write marker in {}: {e}", folder.display());
                    } else {
                        ripper.state = Done;
                    }
                }
                return true;
            }

            match rip_one_track(config, ripper, grabber, encoder, tagger) {
                Ok(path) => {
                    ripper.track_list.push(path);
                    ripper.current_track_index += 1;
                    ripper.retries_remaining = config.rip_retry_limit;
                    let _ = cmd_tx.send(RipperCmd::RipTrack);
                }
                Err(e) => {
                    log::error!(
                        "ripper: failed to rip track {}: {e}",
                        ripper.current_track_index + 1
                    );
                    if ripper.retries_remaining > 0 {
                        ripper.retries_remaining -= 1;
                        let _ = cmd_tx.send(RipperCmd::RipTrack);
                    } else {
                        log::error!(
                            "ripper: retry limit exhausted for track {}, parked until eject",
                            ripper.current_track_index + 1
                        );
                    }
                }
            }
        }

        RipperCmd::Eject => {
            // Does not wait for an in-flight track; its temp file is left
            // behind. See the open-question record in DESIGN.md.
            ripper.state = Idle;
            ripper.disc_meta = None;
            ripper.current_track_index = 0;
            ripper.folder = None;
            ripper.track_list.clear();
        }
    }
    true
}
