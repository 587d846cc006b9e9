//! Audio bindings: devices, playbacks and a tone mixer
//!
//! The host owns its devices; scripts see them as Borrowed handles. Opening
//! a device yields a playback co-owned by every handle and mixer that refers
//! to it (Shared). Mixers are owned by their handle.
//!
//! There is no sound card behind this module. A playback counts the frames
//! a mixer renders into it, which is enough to drive and observe playback
//! state from scripts.

use std::sync::Arc;

use kiln_sdk::{BridgeError, BridgeResult, ScriptContext, ScriptValue};
use parking_lot::Mutex;
use tracing::debug;

use crate::args::{arg, check_number};
use crate::config::AudioConfig;
use crate::dispatch::DispatchTable;
use crate::handle::{allocate, allocate_optional, Slot};
use crate::namespace::Namespace;
use crate::registry::check_handle;

/// Tag carried by device handles
pub const DEVICE_TAG: &str = "kiln.AudioDevice";
/// Tag carried by playback handles
pub const PLAYBACK_TAG: &str = "kiln.AudioPlayback";
/// Tag carried by mixer handles
pub const MIXER_TAG: &str = "kiln.AudioMixer";

// ============================================================================
// Host and devices
// ============================================================================

/// Output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Device name
    pub name: String,
    /// Output channels
    pub channels: u16,
    /// Sample rate playbacks on this device run at
    pub sample_rate: u32,
}

/// Owner of the output devices
#[derive(Debug)]
pub struct AudioHost {
    devices: Vec<Arc<AudioDevice>>,
}

impl AudioHost {
    /// Host with the devices listed in `config`
    pub fn from_config(config: &AudioConfig) -> Self {
        let devices = config
            .devices
            .iter()
            .map(|d| {
                Arc::new(AudioDevice {
                    name: d.name.clone(),
                    channels: d.channels,
                    sample_rate: config.sample_rate,
                })
            })
            .collect();
        Self { devices }
    }

    /// All devices
    pub fn devices(&self) -> &[Arc<AudioDevice>] {
        &self.devices
    }

    /// First device, if any
    pub fn default_device(&self) -> Option<&Arc<AudioDevice>> {
        self.devices.first()
    }
}

// ============================================================================
// Playback and mixer
// ============================================================================

#[derive(Debug, Default)]
struct PlaybackState {
    active: bool,
    stopped: bool,
    frames: u64,
}

/// Open output stream on a device
#[derive(Debug)]
pub struct AudioPlayback {
    device_name: String,
    sample_rate: u32,
    state: Mutex<PlaybackState>,
}

impl AudioPlayback {
    /// Open a playback on `device`
    pub fn open(device: &AudioDevice) -> Self {
        debug!(device = %device.name, "opened playback");
        Self {
            device_name: device.name.clone(),
            sample_rate: device.sample_rate,
            state: Mutex::new(PlaybackState::default()),
        }
    }

    /// Name of the device this playback runs on
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Whether a mixer is currently producing sound
    pub fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.active && !state.stopped
    }

    /// Stop the playback; it cannot be restarted
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.active = false;
    }

    /// Whether [`stop`](Self::stop) was called
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Frames rendered so far
    pub fn frames(&self) -> u64 {
        self.state.lock().frames
    }

    fn render(&self, frames: u64, active: bool) {
        let mut state = self.state.lock();
        if !state.stopped {
            state.frames += frames;
            state.active = active;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Voice {
    hz: f64,
    remaining: u64,
}

/// Sums tones into a playback
#[derive(Debug)]
pub struct AudioMixer {
    playback: Arc<AudioPlayback>,
    voices: Vec<Voice>,
}

impl AudioMixer {
    /// Mixer feeding `playback`
    pub fn new(playback: Arc<AudioPlayback>) -> Self {
        Self {
            playback,
            voices: Vec::new(),
        }
    }

    /// The playback this mixer feeds
    pub fn playback(&self) -> &Arc<AudioPlayback> {
        &self.playback
    }

    fn frames_for(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * f64::from(self.playback.sample_rate)).round() as u64
    }

    /// Queue a sine tone
    pub fn play_tone(&mut self, hz: f64, seconds: f64) -> BridgeResult<()> {
        if self.playback.is_stopped() {
            return Err(BridgeError::NativeOperation(format!(
                "playback on '{}' has been stopped",
                self.playback.device_name
            )));
        }
        if !(hz.is_finite() && hz > 0.0) {
            return Err(BridgeError::Argument(format!("invalid tone frequency {}", hz)));
        }
        let remaining = self.frames_for(seconds);
        if remaining > 0 {
            self.voices.push(Voice { hz, remaining });
            self.playback.render(0, true);
        }
        Ok(())
    }

    /// Render `seconds` of audio; returns the number of frames rendered
    pub fn advance(&mut self, seconds: f64) -> u64 {
        let frames = self.frames_for(seconds);
        let rendered = self
            .voices
            .iter()
            .map(|v| v.remaining.min(frames))
            .max()
            .unwrap_or(0);
        for voice in &mut self.voices {
            voice.remaining = voice.remaining.saturating_sub(frames);
        }
        self.voices.retain(|v| v.remaining > 0);
        self.playback.render(rendered, !self.voices.is_empty());
        rendered
    }

    /// Whether any tone is still queued
    pub fn is_playing(&self) -> bool {
        !self.voices.is_empty() && !self.playback.is_stopped()
    }

    /// Frequencies of the queued tones
    pub fn tones(&self) -> Vec<f64> {
        self.voices.iter().map(|v| v.hz).collect()
    }
}

// ============================================================================
// Bindings
// ============================================================================

fn playback_table() -> BridgeResult<Arc<DispatchTable<AudioPlayback>>> {
    DispatchTable::<AudioPlayback>::builder(PLAYBACK_TAG)
        .field("deviceName", |p| p.device_name().into())
        .method("isPlaying", |_ctx, handle, _args| {
            handle.with(|p| p.is_playing().into())
        })
        .method("stop", |_ctx, handle, _args| {
            handle.with(|p| p.stop())?;
            Ok(ScriptValue::Nil)
        })
        .build()
}

fn device_table(
    playbacks: Arc<DispatchTable<AudioPlayback>>,
) -> BridgeResult<Arc<DispatchTable<AudioDevice>>> {
    DispatchTable::<AudioDevice>::builder(DEVICE_TAG)
        .field("name", |d| d.name.as_str().into())
        .field("channels", |d| u32::from(d.channels).into())
        .method("open", move |ctx, handle, _args| {
            let playback = handle.with(|d| Arc::new(AudioPlayback::open(d)))?;
            allocate(ctx, &playbacks, Slot::shared(playback))
        })
        .build()
}

fn mixer_table(
    playbacks: Arc<DispatchTable<AudioPlayback>>,
) -> BridgeResult<Arc<DispatchTable<AudioMixer>>> {
    DispatchTable::<AudioMixer>::builder(MIXER_TAG)
        .getter("playback", move |ctx, handle| {
            let playback = handle.with(|m| Arc::clone(m.playback()))?;
            allocate(ctx, &playbacks, Slot::shared(playback))
        })
        .method("playTone", |_ctx, handle, args| {
            let hz = check_number(args, 0, "playTone")?;
            let seconds = check_number(args, 1, "playTone")?;
            handle.with_mut(|m| m.play_tone(hz, seconds))??;
            Ok(ScriptValue::Nil)
        })
        .method("advance", |_ctx, handle, args| {
            let seconds = check_number(args, 0, "advance")?;
            let frames = handle.with_mut(|m| m.advance(seconds))?;
            Ok(ScriptValue::Integer(i64::try_from(frames).unwrap_or(i64::MAX)))
        })
        .method("isPlaying", |_ctx, handle, _args| {
            handle.with(|m| m.is_playing().into())
        })
        .build()
}

fn device_list(
    ctx: &mut dyn ScriptContext,
    host: &AudioHost,
    devices: &Arc<DispatchTable<AudioDevice>>,
) -> BridgeResult<ScriptValue> {
    let list = ctx.create_table();
    for (i, device) in host.devices().iter().enumerate() {
        let handle = allocate(ctx, devices, Slot::borrowed(device))?;
        ctx.raw_set(&list, ScriptValue::Integer(i as i64 + 1), handle)?;
    }
    Ok(list)
}

/// Add the audio functions to `ns`
pub fn register(ns: Namespace, host: Arc<AudioHost>) -> BridgeResult<Namespace> {
    let playbacks = playback_table()?;
    let devices = device_table(Arc::clone(&playbacks))?;
    let mixers = mixer_table(Arc::clone(&playbacks))?;

    let list_host = Arc::clone(&host);
    let list_devices = Arc::clone(&devices);
    Ok(ns
        .function("getDevices", move |ctx, _args| {
            device_list(ctx, &list_host, &list_devices)
        })
        .function("getDefaultDevice", move |ctx, _args| {
            allocate_optional(ctx, &devices, host.default_device().map(Slot::borrowed))
        })
        .function("newMixer", move |ctx, args| {
            let playback = check_handle::<AudioPlayback>(ctx, arg(args, 0))?.shared()?;
            allocate(ctx, &mixers, Slot::owned(AudioMixer::new(playback)))
        }))
}
