use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cw_core::{domain::MediaFile, errors::Error, ports::MediaFetcher, Result};

use crate::{run_ytdlp, YtDlpConfig};

const MEDIA_EXTENSIONS: [&str; 4] = ["mp4", "webm", "mkv", "mov"];

/// Downloads an item's video into a fresh scratch directory.
#[derive(Clone, Debug)]
pub struct YtDlpFetcher {
    cfg: YtDlpConfig,
}

impl YtDlpFetcher {
    pub fn new(cfg: YtDlpConfig) -> Self {
        Self { cfg }
    }

    fn download_args(&self, out_dir: &Path, url: &str) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            self.cfg.format.clone(),
            "-o".to_string(),
            out_dir.join("%(id)s.%(ext)s").to_string_lossy().into_owned(),
        ];
        if let Some(max) = self.cfg.max_filesize {
            args.push("--max-filesize".to_string());
            args.push(max.to_string());
        }
        // Feed-supplied urls must never be parsed as options.
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str) -> Result<MediaFile> {
        tokio::fs::create_dir_all(&self.cfg.media_dir).await?;
        // Removed automatically on every early return below.
        let scratch = tempfile::Builder::new()
            .prefix("dl-")
            .tempdir_in(&self.cfg.media_dir)?;

        let out = run_ytdlp(&self.cfg.binary, &self.download_args(scratch.path(), url)).await?;
        if !out.status.success() {
            return Err(Error::Media(out.failure("download failed")));
        }

        let Some(file) = pick_media_file(scratch.path())? else {
            // yt-dlp exits 0 when --max-filesize skips the download.
            return Err(Error::Media(format!(
                "yt-dlp produced no media file for {url}"
            )));
        };

        tracing::debug!(url, file = %file.display(), "media downloaded");
        let dir = scratch.keep();
        Ok(MediaFile::in_scratch_dir(file, dir))
    }
}

/// First media file in `dir` (sorted by name), ignoring partial downloads.
fn pick_media_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut files = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    files.sort();
    Ok(files.into_iter().next())
}
