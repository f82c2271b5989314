// Audio Sink: owns the output device and a FIFO byte buffer. Gapless
// playback falls out naturally because successive `buffer_track` calls
// append to the same buffer without any gap marker -- the Sink has no
// notion of track boundaries at all; that's the Player's job.
//
// Grounded on original_source/hifi_appliance/audio/miniaudio.py's pause
// gate checked inside the frame-producing callback, and on this codebase's
// own warning against calling back into a hot device loop: the
// frames-played/playback-stopped notifications are handed off through a
// bounded channel to a dedicated executor thread rather than invoked
// directly from the cpal callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{PlatterError, Result};
use crate::interfaces::PcmDecoder;
use crate::model::{CHANNELS, SAMPLE_RATE, SAMPLE_WIDTH};

/// Notifications pushed by the device callback, drained on a dedicated
/// executor thread rather than handled on the device thread itself.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    FramesPlayed(u64),
    PlaybackStopped,
}

struct Shared {
    buffer: Mutex<VecDeque<u8>>,
    playing: AtomicBool,
    released: AtomicBool,
}

pub struct AudioSink {
    shared: Arc<Shared>,
    events: Receiver<SinkEvent>,
    _stream: cpal::Stream,
    decoder: Arc<dyn PcmDecoder>,
}

impl AudioSink {
    pub fn new(decoder: Arc<dyn PcmDecoder>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlatterError::External("no default output device".into()))?;

        let config = cpal::StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(Shared {
            buffer: Mutex::new(VecDeque::new()),
            playing: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });

        let (event_tx, event_rx) = bounded::<SinkEvent>(256);

        let cb_shared = Arc::clone(&shared);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                    fill_frames(&cb_shared, &event_tx, data);
                },
                |err| log::error!("audio sink stream error: {err}"),
                None,
            )
            .map_err(|e| PlatterError::External(format!("cannot build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| PlatterError::External(format!("cannot start output stream: {e}")))?;

        Ok(Self {
            shared,
            events: event_rx,
            _stream: stream,
            decoder,
        })
    }

    /// Appends the PCM decoding of `path` to the buffer and returns the
    /// number of frames appended.
    pub fn buffer_track(&self, path: &std::path::Path) -> Result<u64> {
        let pcm = self
            .decoder
            .decode(path)
            .map_err(|e| PlatterError::External(format!("decoding {}: {e}", path.display())))?;
        let mut buf = self.shared.buffer.lock().unwrap();
        buf.extend(pcm.iter().copied());
        let bytes_per_frame = CHANNELS as usize * SAMPLE_WIDTH as usize;
        Ok((pcm.len() / bytes_per_frame) as u64)
    }

    pub fn pause(&self) {
        self.shared.playing.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.playing.store(true, Ordering::SeqCst);
    }

    /// Non-blocking receiver for frames-played/playback-stopped
    /// notifications; the Player drains this on its own event loop rather
    /// than being called back from the device thread directly.
    pub fn events(&self) -> Receiver<SinkEvent> {
        self.events.clone()
    }

    pub fn release(&self) {
        self.shared.released.store(true, Ordering::SeqCst);
        self.shared.playing.store(false, Ordering::SeqCst);
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.release();
    }
}

/// Runs on the cpal device thread. Pulls bytes out of the shared buffer and
/// writes PCM samples into `data`; pushes notifications instead of invoking
/// callbacks directly, since this thread must never re-enter the Player.
fn fill_frames(shared: &Arc<Shared>, events: &Sender<SinkEvent>, data: &mut [i16]) {
    if shared.released.load(Ordering::SeqCst) || !shared.playing.load(Ordering::SeqCst) {
        data.fill(0);
        return;
    }

    let needed_bytes = data.len() * SAMPLE_WIDTH as usize;
    let mut buf = shared.buffer.lock().unwrap();

    if buf.is_empty() {
        drop(buf);
        data.fill(0);
        let _ = events.try_send(SinkEvent::PlaybackStopped);
        return;
    }

    let take = needed_bytes.min(buf.len());
    let mut bytes = Vec::with_capacity(take);
    for _ in 0..take {
        bytes.push(buf.pop_front().unwrap());
    }
    drop(buf);

    for (i, chunk) in bytes.chunks(2).enumerate() {
        if chunk.len() == 2 {
            data[i] = i16::from_le_bytes([chunk[0], chunk[1]]);
        }
    }
    for sample in data.iter_mut().skip(bytes.len() / 2) {
        *sample = 0;
    }

    let frames = (take / (CHANNELS as usize * SAMPLE_WIDTH as usize)) as u64;
    if frames > 0 {
        let _ = events.try_send(SinkEvent::FramesPlayed(frames));
    }
}

#[cfg(test)]
pub fn spawn_event_executor(
    events: Receiver<SinkEvent>,
    forward: Sender<SinkEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for ev in events {
            if forward.send(ev).is_err() {
                return;
            }
        }
    })
}
