//! Real audio output using CPAL (Cross-Platform Audio Library).

use crate::audio::output::{AudioOutput, ClipCompletion};
use crate::audio::wav::{interleave_mono, resample};
use crate::error::{Result, RiddiError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL prints ALSA/JACK chatter while probing backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are rarely the user's speakers.
const FILTERED_PATTERNS: &[&str] = &["surround", "rear:", "center:", "side:", "S/PDIF"];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List output devices, marking PipeWire/Pulse ones as recommended.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = with_suppressed_stderr(cpal::default_host);
    let devices = with_suppressed_stderr(|| host.output_devices());
    let devices = devices.map_err(|e| RiddiError::AudioOutput {
        message: format!("Failed to enumerate output devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                names.push(format!("{} [recommended]", name));
            } else {
                names.push(name);
            }
        }
    }
    Ok(names)
}

fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.output_devices().map_err(|e| RiddiError::AudioOutput {
            message: format!("Failed to enumerate output devices: {}", e),
        })?;

        let mut preferred = None;
        for device in devices {
            let Ok(name) = device.name() else { continue };
            match device_name {
                Some(wanted) if name == wanted => return Ok(device),
                None if preferred.is_none() && is_preferred_device(&name) => {
                    preferred = Some(device)
                }
                _ => {}
            }
        }

        if let Some(wanted) = device_name {
            return Err(RiddiError::AudioDeviceNotFound {
                device: wanted.to_string(),
            });
        }
        preferred
            .or_else(|| host.default_output_device())
            .ok_or_else(|| RiddiError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched while holding the Mutex in
/// [`CpalOutput`], one thread at a time.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Samples queued for the device callback.
struct Clip {
    frames: Vec<f32>,
    position: usize,
    done: Option<oneshot::Sender<()>>,
}

impl Clip {
    /// Copy the next block into `out`, padding with silence at the end.
    fn fill(&mut self, out: &mut [f32]) {
        let available = self.frames.len().saturating_sub(self.position);
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.frames[self.position..self.position + n]);
        out[n..].fill(0.0);
        self.position += n;
        if self.position >= self.frames.len()
            && let Some(done) = self.done.take()
        {
            done.send(()).ok();
        }
    }
}

/// Speaker output through CPAL.
///
/// Mono model audio is resampled to the device's native rate and duplicated
/// across its channels in software. Each clip gets its own stream.
pub struct CpalOutput {
    device: cpal::Device,
    name: String,
    stream: Mutex<Option<SendableStream>>,
}

impl CpalOutput {
    /// Open `device_name`, or the best default device (PipeWire/Pulse first).
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!(device = %name, "Opened audio output");
        Ok(Self {
            device,
            name,
            stream: Mutex::new(None),
        })
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<SendableStream>> {
        self.stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_stream(
        &self,
        clip: Arc<Mutex<Clip>>,
        config: &cpal::SupportedStreamConfig,
    ) -> Result<cpal::Stream> {
        let stream_config: cpal::StreamConfig = config.clone().into();
        let err_callback = |err| {
            tracing::warn!("Audio stream error: {}", err);
        };

        match config.sample_format() {
            cpal::SampleFormat::F32 => self
                .device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if let Ok(mut clip) = clip.lock() {
                            clip.fill(data);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| RiddiError::AudioOutput {
                    message: format!("Failed to build f32 output stream: {}", e),
                }),
            cpal::SampleFormat::I16 => {
                let mut scratch = Vec::new();
                self.device
                    .build_output_stream(
                        &stream_config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            scratch.resize(data.len(), 0.0f32);
                            if let Ok(mut clip) = clip.lock() {
                                clip.fill(&mut scratch);
                            }
                            for (out, &s) in data.iter_mut().zip(&scratch) {
                                *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            }
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| RiddiError::AudioOutput {
                        message: format!("Failed to build i16 output stream: {}", e),
                    })
            }
            fmt => Err(RiddiError::AudioOutput {
                message: format!(
                    "Unsupported output sample format: {:?}. Try another device with --device.",
                    fmt
                ),
            }),
        }
    }
}

impl AudioOutput for CpalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<ClipCompletion> {
        let config = self
            .device
            .default_output_config()
            .map_err(|e| RiddiError::AudioOutput {
                message: format!("Failed to query default output config: {}", e),
            })?;
        let device_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let mono = resample(&samples, sample_rate, device_rate);
        let (done_tx, done_rx) = oneshot::channel();
        let clip = Arc::new(Mutex::new(Clip {
            frames: interleave_mono(&mono, channels),
            position: 0,
            done: Some(done_tx),
        }));

        let stream = self.build_stream(clip, &config)?;
        stream.play().map_err(|e| RiddiError::AudioOutput {
            message: format!("Failed to start output stream: {}", e),
        })?;
        // Replacing drops the previous clip's stream, which silences it.
        *self.lock_stream() = Some(SendableStream(stream));
        Ok(done_rx)
    }

    fn abort(&self) {
        self.lock_stream().take();
    }

    fn suspend(&self) {
        if let Some(stream) = self.lock_stream().as_ref()
            && let Err(e) = stream.0.pause()
        {
            tracing::warn!("Failed to pause output stream: {}", e);
        }
    }

    fn resume(&self) {
        if let Some(stream) = self.lock_stream().as_ref()
            && let Err(e) = stream.0.play()
        {
            tracing::warn!("Failed to resume output stream: {}", e);
        }
    }
}
