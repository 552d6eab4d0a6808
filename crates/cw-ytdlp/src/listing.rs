use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use cw_core::{
    config::render_template, domain::ItemDescriptor, errors::Error, ports::SourceAdapter, Result,
};

use crate::run_ytdlp;

/// Lists a profile's newest items with `yt-dlp --flat-playlist --dump-json`.
#[derive(Clone, Debug)]
pub struct YtDlpListing {
    binary: PathBuf,
    profile_url_template: String,
}

/// The subset of a flat-playlist entry we care about.
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    description: Option<String>,
}

impl YtDlpListing {
    pub fn new(binary: impl Into<PathBuf>, profile_url_template: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            profile_url_template: profile_url_template.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for YtDlpListing {
    fn name(&self) -> &str {
        "ytdlp"
    }

    async fn list_latest(&self, handle: &str, limit: usize) -> Result<Vec<ItemDescriptor>> {
        let profile = render_template(&self.profile_url_template, handle);
        let args = vec![
            "--flat-playlist".to_string(),
            "--dump-json".to_string(),
            "--no-warnings".to_string(),
            "--playlist-end".to_string(),
            limit.to_string(),
            "--".to_string(),
            profile.clone(),
        ];

        let out = run_ytdlp(&self.binary, &args).await?;
        if !out.status.success() {
            return Err(Error::External(out.failure("profile listing failed")));
        }

        Ok(parse_flat_playlist(&out.stdout, &profile, limit))
    }
}

/// Parse `--dump-json` output (one JSON object per line), newest first.
fn parse_flat_playlist(stdout: &str, profile_url: &str, limit: usize) -> Vec<ItemDescriptor> {
    let profile = profile_url.trim_end_matches('/');
    let mut out = Vec::new();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let entry: FlatEntry = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("skipping unparsable yt-dlp line: {e}");
                continue;
            }
        };

        let url = entry
            .webpage_url
            .filter(|u| u.starts_with("http"))
            .or_else(|| entry.url.filter(|u| u.starts_with("http")))
            .or_else(|| {
                entry
                    .id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .map(|id| format!("{profile}/video/{id}"))
            });
        let Some(url) = url else {
            continue;
        };

        let title = entry
            .title
            .filter(|t| !t.trim().is_empty())
            .or(entry.description)
            .unwrap_or_default();

        out.push(ItemDescriptor { url, title });
        if out.len() >= limit {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = "https://www.tiktok.com/@creator";

    #[test]
    fn parses_entries_in_order() {
        let stdout = r#"
{"id": "300", "url": "https://www.tiktok.com/@creator/video/300", "title": "newest"}
{"id": "200", "webpage_url": "https://www.tiktok.com/@creator/video/200", "title": "", "description": "from description"}
not json
{"id": "100"}
"#;
        let items = parse_flat_playlist(stdout, PROFILE, 10);
        assert_eq!(
            items,
            vec![
                ItemDescriptor::new("https://www.tiktok.com/@creator/video/300", "newest"),
                ItemDescriptor::new(
                    "https://www.tiktok.com/@creator/video/200",
                    "from description"
                ),
                ItemDescriptor::new("https://www.tiktok.com/@creator/video/100", ""),
            ]
        );
    }

    #[test]
    fn respects_limit_and_skips_entries_without_location() {
        let stdout = r#"{"title": "no id or url"}
{"id": "1"}
{"id": "2"}
{"id": "3"}"#;
        let items = parse_flat_playlist(stdout, &format!("{PROFILE}/"), 2);
        let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.tiktok.com/@creator/video/1",
                "https://www.tiktok.com/@creator/video/2"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let l = YtDlpListing::new("false", "https://www.tiktok.com/@{handle}");
        assert!(l.list_latest("creator", 5).await.is_err());
    }
}
