use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use riddi::app::{SpeakOptions, run_chunks_command, run_speak_command, run_voices_command};
use riddi::cli::{Cli, Commands, ConfigAction, ModelsAction};
use riddi::config::Config;
use riddi::models::catalog::{DEFAULT_BASE_URL, check_installed, format_status};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

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
            let config = load_config(cli.config.as_deref())?;
            let options = SpeakOptions {
                file,
                voice,
                speed,
                steps,
                export,
                no_play,
                events,
                highlight,
                quiet: cli.quiet,
            };
            run_speak_command(config, options).await?;
        }
        Commands::Chunks { file } => {
            let config = load_config(cli.config.as_deref())?;
            run_chunks_command(&config, file.as_deref())?;
        }
        Commands::Voices => {
            let config = load_config(cli.config.as_deref())?;
            run_voices_command(&config);
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Models { action } => {
            let config = load_config(cli.config.as_deref())?;
            handle_models_command(action, &config, cli.quiet).await?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut riddi::cli::Cli::command(),
                "riddi",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// List available audio output devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = riddi::audio::device::list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("riddi was built without audio output support")
}

async fn handle_models_command(action: ModelsAction, config: &Config, quiet: bool) -> Result<()> {
    let model_dir = config.models.resolve_dir();
    match action {
        ModelsAction::List => {
            println!("Model directory: {}", model_dir.display());
            let statuses = check_installed(&model_dir);
            for status in &statuses {
                println!("  {}", format_status(status));
            }
            let missing = statuses.iter().filter(|s| !s.is_installed()).count();
            if missing == 0 {
                println!("{}", "All model files installed".green());
            } else {
                println!(
                    "{} missing; run {}",
                    format!("{missing} file(s)").yellow(),
                    "riddi models download".bold()
                );
            }
        }
        ModelsAction::Download { base_url } => {
            download_models(&model_dir, base_url.as_deref(), quiet).await?;
        }
    }
    Ok(())
}

#[cfg(feature = "model-download")]
async fn download_models(
    model_dir: &std::path::Path,
    base_url: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let base_url = base_url.unwrap_or(DEFAULT_BASE_URL);
    let fetched = riddi::models::download::download_missing(model_dir, base_url, !quiet).await?;
    if !quiet {
        if fetched.is_empty() {
            println!("All model files already installed in {}", model_dir.display());
        } else {
            println!(
                "{} {} file(s) into {}",
                "Downloaded".green(),
                fetched.len(),
                model_dir.display()
            );
        }
    }
    Ok(())
}

#[cfg(not(feature = "model-download"))]
async fn download_models(
    model_dir: &std::path::Path,
    base_url: Option<&str>,
    _quiet: bool,
) -> Result<()> {
    anyhow::bail!(
        "riddi was built without download support; fetch the files from {} into {}",
        base_url.unwrap_or(DEFAULT_BASE_URL),
        model_dir.display()
    )
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&std::path::Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
