//! Model download and installation.
//!
//! Fetches missing catalog assets over HTTPS into the model directory. Each
//! file is streamed to a `.part` sibling and renamed into place once
//! complete, so an interrupted download never looks installed.

use crate::error::{Result, RiddiError};
use crate::models::catalog::{ModelAsset, missing_assets};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Temporary path a download is written to before it is complete.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

fn progress_bar(total_size: u64) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    let pb = ProgressBar::new(total_size);
    pb.set_style(style);
    pb
}

/// Core download: fetch `url` and save it to `output_path`.
async fn download_to_path(
    client: &reqwest::Client,
    url: &str,
    output_path: &Path,
    progress: bool,
) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RiddiError::Other(format!("Failed to create model directory: {e}")))?;
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| RiddiError::Other(format!("Failed to start download: {e}")))?;

    if !response.status().is_success() {
        return Err(RiddiError::Other(format!(
            "Download of {url} failed with status: {}",
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = progress.then(|| progress_bar(total_size));

    let part = partial_path(output_path);
    let mut stream = response.bytes_stream();
    let mut file = fs::File::create(&part)
        .map_err(|e| RiddiError::Other(format!("Failed to create output file: {e}")))?;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| RiddiError::Other(format!("Failed to read download chunk: {e}")))?;

        file.write_all(&chunk)
            .map_err(|e| RiddiError::Other(format!("Failed to write to file: {e}")))?;

        if let Some(ref pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }
    file.flush()?;
    drop(file);
    fs::rename(&part, output_path)?;

    if let Some(pb) = pb {
        pb.finish_with_message("Downloaded");
    }
    Ok(())
}

/// Download one asset into `model_dir`, skipping it when already present.
pub async fn download_asset(
    client: &reqwest::Client,
    asset: &ModelAsset,
    model_dir: &Path,
    base_url: &str,
    progress: bool,
) -> Result<PathBuf> {
    let path = model_dir.join(&asset.local);
    if path.is_file() {
        return Ok(path);
    }
    if progress {
        eprintln!("Downloading {}...", asset.local);
    }
    let url = asset.url(base_url);
    tracing::info!(url = %url, path = %path.display(), "Downloading model asset");
    if let Err(e) = download_to_path(client, &url, &path, progress).await {
        let part = partial_path(&path);
        if part.exists()
            && let Err(rm) = fs::remove_file(&part)
        {
            tracing::warn!(path = %part.display(), error = %rm, "Failed to remove partial download");
        }
        return Err(e);
    }
    Ok(path)
}

/// Download every missing asset. Returns the paths written.
pub async fn download_missing(model_dir: &Path, base_url: &str, progress: bool) -> Result<Vec<PathBuf>> {
    let missing = missing_assets(model_dir);
    if missing.is_empty() {
        if progress {
            eprintln!("All model files are installed in {}", model_dir.display());
        }
        return Ok(Vec::new());
    }

    let client = reqwest::Client::new();
    let mut written = Vec::with_capacity(missing.len());
    for asset in &missing {
        written.push(download_asset(&client, asset, model_dir, base_url, progress).await?);
    }
    if progress {
        eprintln!("Model installed to: {}", model_dir.display());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::assets;

    #[test]
    fn test_partial_path_appends_suffix() {
        let path = Path::new("/models/voice_styles/F1.json");
        assert_eq!(
            partial_path(path),
            PathBuf::from("/models/voice_styles/F1.json.part")
        );
    }

    #[tokio::test]
    async fn test_nothing_to_download_when_installed() {
        let dir = tempfile::tempdir().unwrap();
        for asset in assets() {
            let path = dir.path().join(&asset.local);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }
        let written = download_missing(dir.path(), "http://127.0.0.1:9", false)
            .await
            .unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_installed_asset_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let asset = &assets()[0];
        fs::write(dir.path().join(&asset.local), b"{}").unwrap();
        let client = reqwest::Client::new();
        let path = download_asset(&client, asset, dir.path(), "http://127.0.0.1:9", false)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("tts.json"));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let asset = &assets()[0];
        let client = reqwest::Client::new();
        let result = download_asset(&client, asset, dir.path(), "http://127.0.0.1:9", false).await;
        assert!(result.is_err());
        assert!(!dir.path().join("tts.json").exists());
        assert!(!dir.path().join("tts.json.part").exists());
    }
}
