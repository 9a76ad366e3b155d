//! Reading session assembly.
//!
//! Wires text chunking, inference, voice styles, playback and events into
//! one [`ReaderSession`]:
//! text → chunks → inference → buffer → sequencer → device
//!
//! The CLI runners at the bottom of this file build a session from the user
//! configuration and drive it from the terminal.

use crate::audio::output::{AudioOutput, SimulatedOutput};
use crate::audio::wav::{concat_with_silence, write_wav};
use crate::error::{Result, RiddiError};
use crate::playback::sequencer::PlaybackSequencer;
use crate::playback::state::PlaybackState;
use crate::streaming::coordinator::{CoordinatorConfig, StreamingCoordinator, SynthesisSummary};
use crate::streaming::events::EventSink;
use crate::streaming::types::{PlaybackSettings, SynthesisRequest, SynthesizedChunk};
use crate::tts::pipeline::InferencePipeline;
use crate::tts::style::{StyleLoader, StyleSource};
use std::path::Path;
use std::sync::Arc;

/// A ready-to-use reader: one coordinator and the handles around it.
pub struct ReaderSession {
    coordinator: Arc<StreamingCoordinator>,
    pipeline: Arc<InferencePipeline>,
}

/// Builder for [`ReaderSession`].
///
/// Pipeline and style source are required. Output defaults to a
/// [`SimulatedOutput`], which only keeps time.
#[derive(Default)]
pub struct ReaderSessionBuilder {
    pipeline: Option<InferencePipeline>,
    styles: Option<Arc<dyn StyleSource>>,
    output: Option<Arc<dyn AudioOutput>>,
    events: Option<EventSink>,
    config: CoordinatorConfig,
}

impl ReaderSessionBuilder {
    pub fn pipeline(mut self, pipeline: InferencePipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn styles(mut self, styles: Arc<dyn StyleSource>) -> Self {
        self.styles = Some(styles);
        self
    }

    pub fn output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ReaderSession> {
        let pipeline = self
            .pipeline
            .ok_or_else(|| RiddiError::Other("reader session needs an inference pipeline".into()))?;
        let styles = self
            .styles
            .ok_or_else(|| RiddiError::Other("reader session needs a voice style source".into()))?;
        let output = self
            .output
            .unwrap_or_else(|| Arc::new(SimulatedOutput::new()));

        let pipeline = Arc::new(pipeline);
        let state = PlaybackState::new();
        let sequencer = Arc::new(PlaybackSequencer::new(output, state.clone()));
        let coordinator = Arc::new(StreamingCoordinator::new(
            Arc::clone(&pipeline),
            Arc::new(StyleLoader::new(styles)),
            sequencer,
            state,
            self.events.unwrap_or_else(EventSink::disabled),
            self.config,
        ));
        Ok(ReaderSession {
            coordinator,
            pipeline,
        })
    }
}

impl ReaderSession {
    pub fn builder() -> ReaderSessionBuilder {
        ReaderSessionBuilder::default()
    }

    pub fn coordinator(&self) -> &Arc<StreamingCoordinator> {
        &self.coordinator
    }

    pub fn state(&self) -> &PlaybackState {
        self.coordinator.state()
    }

    /// Load the model now instead of on the first request.
    pub async fn warm_up(&self) -> Result<()> {
        self.pipeline.model().await.map(|_| ())
    }

    /// Read `text` aloud under a fresh request id.
    pub async fn speak(&self, text: &str, settings: PlaybackSettings) -> Result<SynthesisSummary> {
        let request = SynthesisRequest::new(self.coordinator.next_request_id(), text, settings);
        self.coordinator.synthesize(request).await
    }

    pub fn pause(&self) {
        self.coordinator.pause();
    }

    pub fn resume(&self) {
        self.coordinator.resume();
    }

    pub fn toggle_pause(&self) {
        self.coordinator.toggle_pause();
    }

    pub fn stop(&self) {
        self.coordinator.stop();
    }

    /// Write the chunks retained by the last request as one WAV file.
    ///
    /// Returns the number of seconds written.
    pub fn export_wav(&self, path: &Path, silence_secs: f32) -> Result<f32> {
        let chunks = self.coordinator.take_rendered();
        export_chunks(&chunks, path, silence_secs)
    }
}

/// Concatenate rendered chunks with silence between them and write a WAV.
pub fn export_chunks(chunks: &[SynthesizedChunk], path: &Path, silence_secs: f32) -> Result<f32> {
    let Some(first) = chunks.first() else {
        return Err(RiddiError::WavEncode {
            message: "no rendered audio to export".to_string(),
        });
    };
    let sample_rate = first.sample_rate;
    let parts: Vec<Vec<f32>> = chunks.iter().map(|c| c.samples.to_vec()).collect();
    let samples = concat_with_silence(&parts, sample_rate, silence_secs);
    write_wav(path, &samples, sample_rate)?;
    let secs = samples.len() as f32 / sample_rate as f32;
    tracing::info!(path = %path.display(), chunks = chunks.len(), secs, "Exported WAV");
    Ok(secs)
}

#[cfg(all(feature = "cli", feature = "onnx"))]
pub use terminal::{SpeakOptions, run_chunks_command, run_speak_command, run_voices_command};

#[cfg(all(feature = "cli", feature = "onnx"))]
mod terminal {
    use super::*;
    use crate::config::Config;
    use crate::highlight::driver::HighlightDriver;
    use crate::highlight::page::{HighlightSurface, PageBlock, PageModel};
    use crate::playback::state::PlaybackStatus;
    use crate::streaming::events::SynthesisEvent;
    use crate::text::chunker::TextChunker;
    use crate::tts::model_config::{ModelPaths, VOICE_STYLES_DIR};
    use crate::tts::onnx::OnnxBackend;
    use crate::tts::style::{FileStyleSource, Voice};
    use owo_colors::OwoColorize;
    use std::io::{Read, Write};
    use std::path::PathBuf;

    /// Flags of `riddi speak`.
    #[derive(Debug, Clone, Default)]
    pub struct SpeakOptions {
        pub file: Option<PathBuf>,
        pub voice: Option<String>,
        pub speed: Option<f32>,
        pub steps: Option<usize>,
        pub export: Option<PathBuf>,
        pub no_play: bool,
        pub events: bool,
        pub highlight: bool,
        pub quiet: bool,
    }

    fn read_input(file: Option<&Path>) -> Result<String> {
        match file {
            Some(path) => Ok(std::fs::read_to_string(path)?),
            None => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                Ok(text)
            }
        }
    }

    fn resolve_settings(config: &Config, options: &SpeakOptions) -> Result<PlaybackSettings> {
        let mut settings = config.playback;
        if let Some(voice) = options.voice.as_deref() {
            settings.voice = voice.parse()?;
        }
        if let Some(speed) = options.speed {
            settings.speed = speed;
        }
        if let Some(steps) = options.steps {
            settings.steps = steps;
        }
        settings.validate()?;
        Ok(settings)
    }

    fn check_models(model_dir: &Path) -> Result<()> {
        let missing = ModelPaths::new(model_dir).missing();
        if let Some(first) = missing.first() {
            return Err(RiddiError::ModelLoad {
                path: first.display().to_string(),
                message: format!(
                    "{} model file(s) missing; run `riddi models download`",
                    missing.len()
                ),
            });
        }
        Ok(())
    }

    #[cfg(feature = "cpal-audio")]
    fn open_output(config: &Config) -> Result<Arc<dyn AudioOutput>> {
        Ok(Arc::new(crate::audio::device::CpalOutput::new(
            config.audio.device.as_deref(),
        )?))
    }

    #[cfg(not(feature = "cpal-audio"))]
    fn open_output(_config: &Config) -> Result<Arc<dyn AudioOutput>> {
        Err(RiddiError::AudioOutput {
            message: "built without audio output support; use --no-play".to_string(),
        })
    }

    /// Prints each highlighted word to stderr as it is spoken.
    struct TerminalWords {
        page: PageModel,
        printed: bool,
    }

    impl HighlightSurface for TerminalWords {
        fn blocks(&self) -> Vec<PageBlock> {
            self.page.blocks()
        }

        fn find_text(&self, needle: &str) -> Option<usize> {
            self.page.find_text(needle)
        }

        fn wrap_words(&mut self, block: usize) -> Result<Vec<String>> {
            self.restore();
            self.page.wrap_words(block)
        }

        fn set_active_word(&mut self, word: Option<usize>) {
            self.page.set_active_word(word);
            if let Some(text) = self.page.active_text() {
                let mut stderr = std::io::stderr().lock();
                if write!(stderr, "{} ", text.bold()).and_then(|_| stderr.flush()).is_ok() {
                    self.printed = true;
                }
            }
        }

        fn restore(&mut self) {
            if self.printed {
                eprintln!();
                self.printed = false;
            }
            self.page.restore();
        }
    }

    /// Consume coordinator events on a blocking thread until the channel closes.
    /// The highlight, when enabled, pauses and resumes with `status`.
    fn spawn_event_printer(
        rx: crossbeam_channel::Receiver<SynthesisEvent>,
        status: tokio::sync::watch::Receiver<PlaybackStatus>,
        options: &SpeakOptions,
        page_text: String,
    ) -> tokio::task::JoinHandle<()> {
        let as_json = options.events;
        let quiet = options.quiet;
        let driver = (options.highlight && !options.no_play).then(|| {
            Arc::new(HighlightDriver::new(TerminalWords {
                page: PageModel::from_text(&page_text),
                printed: false,
            }))
        });
        let follower = driver.as_ref().map(|driver| {
            let driver = Arc::clone(driver);
            tokio::spawn(async move { driver.follow(status).await })
        });
        tokio::task::spawn_blocking(move || {
            for event in rx.iter() {
                if let Some(driver) = &driver {
                    driver.handle_event(&event);
                }
                if as_json {
                    match event.to_json() {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
                    }
                    continue;
                }
                if quiet || driver.is_some() {
                    continue;
                }
                match &event {
                    SynthesisEvent::Started { chunks, .. } => {
                        eprintln!("{} {chunks} chunk(s)", "Reading".green());
                    }
                    SynthesisEvent::ChunkPlaying { index, text, .. } => {
                        eprintln!("{} {}", format!("[{}]", index + 1).dimmed(), text);
                    }
                    SynthesisEvent::ChunkSynthesized { index, .. } => {
                        tracing::debug!(index, "Chunk ready");
                    }
                    SynthesisEvent::Error { message, .. } => {
                        eprintln!("{} {message}", "Error:".red());
                    }
                    _ => {}
                }
            }
            if let Some(follower) = follower {
                follower.abort();
            }
        })
    }

    #[cfg(unix)]
    async fn pause_signal(signal: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
        match signal {
            Some(signal) => signal.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Run `riddi speak`: read text aloud, optionally exporting the audio.
    pub async fn run_speak_command(config: Config, options: SpeakOptions) -> Result<()> {
        let settings = resolve_settings(&config, &options)?;
        config.validate()?;
        let text = read_input(options.file.as_deref())?;

        let model_dir = config.models.resolve_dir();
        check_models(&model_dir)?;

        let output = if options.no_play {
            Arc::new(SimulatedOutput::new()) as Arc<dyn AudioOutput>
        } else {
            open_output(&config)?
        };

        let loader_dir = model_dir.clone();
        let pipeline = InferencePipeline::new(move || OnnxBackend::load_model(&loader_dir));
        let styles = Arc::new(FileStyleSource::new(model_dir.join(VOICE_STYLES_DIR)));
        let (tx, rx) = crossbeam_channel::unbounded();
        let coordinator_config = CoordinatorConfig {
            chunker: TextChunker::with_max_chars(config.text.max_chunk_chars),
            policy: config.streaming,
            play_audio: !options.no_play,
            retain_audio: options.export.is_some(),
        };
        let session = Arc::new(
            ReaderSession::builder()
                .pipeline(pipeline)
                .styles(styles)
                .output(output)
                .events(EventSink::new(tx))
                .config(coordinator_config)
                .build()?,
        );

        tracing::info!(
            version = %crate::version_string(),
            model_dir = %model_dir.display(),
            "Starting reader"
        );
        if !options.quiet && !options.events {
            eprintln!("Loading model from {}...", model_dir.display());
        }
        session.warm_up().await?;

        let status = session.state().subscribe();
        let printer = spawn_event_printer(rx, status, &options, text.clone());

        let speaking = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.speak(&text, settings).await })
        };
        tokio::pin!(speaking);

        #[cfg(unix)]
        let mut usr1 = {
            use tokio::signal::unix::{SignalKind, signal};
            signal(SignalKind::user_defined1())
                .map_err(|e| tracing::warn!(error = %e, "SIGUSR1 pause toggle unavailable"))
                .ok()
        };

        let outcome = loop {
            #[cfg(unix)]
            tokio::select! {
                joined = &mut speaking => break joined,
                _ = tokio::signal::ctrl_c() => {
                    if !options.quiet {
                        eprintln!("\nStopping...");
                    }
                    session.stop();
                }
                Some(()) = pause_signal(&mut usr1) => session.toggle_pause(),
            }
            #[cfg(not(unix))]
            tokio::select! {
                joined = &mut speaking => break joined,
                _ = tokio::signal::ctrl_c() => session.stop(),
            }
        };
        let result = outcome.map_err(|e| RiddiError::Other(format!("speak task failed: {e}")))?;
        let summary = match result {
            Ok(summary) => Some(summary),
            Err(RiddiError::Cancelled { .. }) => None,
            Err(e) => return Err(e),
        };

        if let Some(path) = options.export.as_deref() {
            match session.export_wav(path, config.audio.export_silence_secs) {
                Ok(secs) if !options.quiet => {
                    eprintln!("Wrote {secs:.1}s of audio to {}", path.display());
                }
                Ok(_) => {}
                Err(e) if summary.is_none() => tracing::warn!(error = %e, "Nothing exported"),
                Err(e) => return Err(e),
            }
        }

        // Dropping the session closes the event channel, ending the printer.
        drop(session);
        if let Err(e) = printer.await {
            tracing::warn!(error = %e, "Event printer failed");
        }

        match summary {
            Some(summary) if !options.quiet && !options.events => eprintln!(
                "{} {} chunk(s), {:.1}s of audio",
                "Done:".green(),
                summary.chunks,
                summary.audio_secs
            ),
            None if !options.quiet && !options.events => eprintln!("Stopped"),
            _ => {}
        }
        Ok(())
    }

    /// Run `riddi chunks`: print the normalized chunks of a text.
    pub fn run_chunks_command(config: &Config, file: Option<&Path>) -> Result<()> {
        let text = read_input(file)?;
        let chunker = TextChunker::with_max_chars(config.text.max_chunk_chars);
        let chunks = chunker.chunk(&text);
        if chunks.is_empty() {
            return Err(RiddiError::NoContent);
        }
        for chunk in &chunks {
            println!(
                "{} {}",
                format!("[{:>3}] {:>3} chars", chunk.index, chunk.len()).dimmed(),
                chunk.text
            );
        }
        Ok(())
    }

    /// Run `riddi voices`: list voices and whether their styles are installed.
    pub fn run_voices_command(config: &Config) {
        let paths = ModelPaths::new(config.models.resolve_dir());
        println!("Available voices:");
        for voice in Voice::ALL {
            let installed = paths.voice_style(voice.id()).is_file();
            let marker = if voice == config.playback.voice {
                "●".green().to_string()
            } else {
                " ".to_string()
            };
            let status = if installed {
                "[installed]".to_string()
            } else {
                "[not installed]".yellow().to_string()
            };
            println!("  {marker} {:4} {:16} {status}", voice.id(), voice.description());
        }
    }
}
