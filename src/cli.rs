//! Command-line interface for riddi
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Read text aloud with on-device neural speech
#[derive(Parser, Debug)]
#[command(name = "riddi", version, about = "Read text aloud with on-device neural speech")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a text file (or stdin) aloud
    Speak {
        /// Text file to read; stdin when omitted
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Voice: M1, M2, F1 or F2
        #[arg(long, value_name = "VOICE")]
        voice: Option<String>,

        /// Speaking-rate multiplier (0.5 to 2.0)
        #[arg(long, value_name = "RATE")]
        speed: Option<f32>,

        /// Denoising steps (1 to 50); more is slower and cleaner
        #[arg(long, value_name = "N")]
        steps: Option<usize>,

        /// Also write the audio to a WAV file
        #[arg(long, value_name = "PATH")]
        export: Option<PathBuf>,

        /// Synthesize without playing (use with --export)
        #[arg(long)]
        no_play: bool,

        /// Print synthesis events as JSON lines on stdout
        #[arg(long)]
        events: bool,

        /// Show each word as it is spoken
        #[arg(long, conflicts_with = "events")]
        highlight: bool,
    },

    /// Show how a text is split into synthesis chunks
    Chunks {
        /// Text file; stdin when omitted
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// List available voices
    Voices,

    /// List available audio output devices
    Devices,

    /// Manage model files
    Models {
        /// Action to perform
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Model management actions
#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// List model files and whether they are installed
    List,
    /// Download missing model files
    Download {
        /// Base URL to download from
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speak_defaults() {
        let cli = Cli::try_parse_from(["riddi", "speak"]).unwrap();
        match cli.command {
            Commands::Speak {
                file,
                voice,
                speed,
                steps,
                export,
                no_play,
                events,
                highlight,
            } => {
                assert!(file.is_none());
                assert!(voice.is_none());
                assert!(speed.is_none());
                assert!(steps.is_none());
                assert!(export.is_none());
                assert!(!no_play);
                assert!(!events);
                assert!(!highlight);
            }
            _ => panic!("Expected Speak command"),
        }
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_speak_with_options() {
        let cli = Cli::try_parse_from([
            "riddi",
            "speak",
            "article.txt",
            "--voice",
            "M2",
            "--speed",
            "1.3",
            "--steps",
            "8",
            "--export",
            "out.wav",
            "--no-play",
        ])
        .unwrap();

        match cli.command {
            Commands::Speak {
                file,
                voice,
                speed,
                steps,
                export,
                no_play,
                ..
            } => {
                assert_eq!(file, Some(PathBuf::from("article.txt")));
                assert_eq!(voice.as_deref(), Some("M2"));
                assert_eq!(speed, Some(1.3));
                assert_eq!(steps, Some(8));
                assert_eq!(export, Some(PathBuf::from("out.wav")));
                assert!(no_play);
            }
            _ => panic!("Expected Speak command"),
        }
    }

    #[test]
    fn test_events_conflicts_with_highlight() {
        let result = Cli::try_parse_from(["riddi", "speak", "--events", "--highlight"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["riddi", "-vv", "voices"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["riddi", "chunks", "-q", "--config", "/tmp/riddi.toml"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/riddi.toml")));
        assert!(matches!(cli.command, Commands::Chunks { file: None }));
    }

    #[test]
    fn test_parse_devices() {
        let cli = Cli::try_parse_from(["riddi", "devices"]).unwrap();
        assert!(matches!(cli.command, Commands::Devices));
    }

    #[test]
    fn test_parse_models_download_base_url() {
        let cli = Cli::try_parse_from([
            "riddi",
            "models",
            "download",
            "--base-url",
            "http://mirror.local/tts",
        ])
        .unwrap();
        match cli.command {
            Commands::Models {
                action: ModelsAction::Download { base_url },
            } => assert_eq!(base_url.as_deref(), Some("http://mirror.local/tts")),
            _ => panic!("Expected Models Download command"),
        }
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["riddi", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["riddi", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["riddi"]).is_err());
    }

    #[test]
    fn test_invalid_command_returns_error() {
        assert!(Cli::try_parse_from(["riddi", "transcribe"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
