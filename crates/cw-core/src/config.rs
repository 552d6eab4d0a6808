use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

const DEFAULT_RSS_URL_TEMPLATE: &str = "https://rsshub.app/tiktok/user/{handle}";
const DEFAULT_PROFILE_URL_TEMPLATE: &str = "https://www.tiktok.com/@{handle}";
const MAX_BATCH_SIZE: usize = 50;

/// Source listing strategy, in chain order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceStrategy {
    /// `yt-dlp --flat-playlist` against the profile page.
    YtDlp,
    /// An RSS mirror of the profile.
    Rss,
}

impl SourceStrategy {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ytdlp" | "yt-dlp" => Ok(Self::YtDlp),
            "rss" => Ok(Self::Rss),
            other => Err(Error::Config(format!("unknown source strategy: {other}"))),
        }
    }
}

/// Typed, immutable process configuration.
///
/// Loaded once at startup and injected into every component.
#[derive(Clone, Debug)]
pub struct Config {
    // Required
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub watch_handle: String,

    // Polling
    pub poll_interval: Duration,
    pub batch_size: usize,

    // Delivery state
    pub state_file: PathBuf,
    pub state_capacity: usize,

    // Sources
    pub source_strategies: Vec<SourceStrategy>,
    pub rss_url_template: String,
    pub profile_url_template: String,

    // Media
    pub ytdlp_path: PathBuf,
    pub ytdlp_format: String,
    pub media_dir: PathBuf,
    pub max_upload_bytes: u64,

    // Timeouts
    pub source_timeout: Duration,
    pub media_timeout: Duration,
    pub delivery_timeout: Duration,
    pub pass_timeout: Duration,

    // Telegram
    pub telegram_min_interval: Duration,

    // Behavior flags
    pub notify_startup: bool,
    pub notify_errors: bool,

    // Admin HTTP
    pub admin_secret: Option<String>,
    pub http_host: String,
    pub http_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars; the legacy deployment names are accepted as fallbacks.
        let telegram_bot_token = required(&["TELEGRAM_BOT_TOKEN", "BOT_TOKEN"])?;
        let telegram_chat_id = required(&["TELEGRAM_CHAT_ID", "CHAT_ID"])?;
        let watch_handle = normalize_handle(&required(&["WATCH_HANDLE", "TIKTOK_USERNAME"])?);
        if watch_handle.is_empty() {
            return Err(Error::Config("WATCH_HANDLE must not be empty".to_string()));
        }

        let poll_interval = Duration::from_secs(env_parse::<u64>("POLL_INTERVAL_SECS")?.unwrap_or(60));
        if poll_interval.is_zero() {
            return Err(Error::Config("POLL_INTERVAL_SECS must be > 0".to_string()));
        }

        let batch_size = env_parse::<usize>("BATCH_SIZE")?.unwrap_or(5);
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "BATCH_SIZE must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }

        let state_file = env_path("STATE_FILE").unwrap_or_else(|| PathBuf::from("data/delivered.json"));
        let state_capacity = env_parse::<usize>("STATE_CAPACITY")?.unwrap_or(400);
        if state_capacity == 0 {
            return Err(Error::Config("STATE_CAPACITY must be > 0".to_string()));
        }

        let source_strategies = match env_str("SOURCE_STRATEGIES").and_then(non_empty) {
            Some(v) => parse_strategies(&v)?,
            None => vec![SourceStrategy::YtDlp, SourceStrategy::Rss],
        };

        let rss_url_template = env_str("RSS_URL_TEMPLATE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_RSS_URL_TEMPLATE.to_string());
        let profile_url_template = env_str("PROFILE_URL_TEMPLATE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_PROFILE_URL_TEMPLATE.to_string());

        let ytdlp_path = env_path("YTDLP_PATH")
            .or_else(|| which_in_path("yt-dlp"))
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));
        let ytdlp_format = env_str("YTDLP_FORMAT")
            .and_then(non_empty)
            .unwrap_or_else(|| "best[ext=mp4]/best".to_string());
        let media_dir = env_path("MEDIA_DIR").unwrap_or_else(|| env::temp_dir().join("clipwatch"));
        let max_upload_bytes = env_parse::<u64>("MAX_UPLOAD_BYTES")?.unwrap_or(50 * 1024 * 1024);

        let source_timeout = secs("SOURCE_TIMEOUT_SECS", 30)?;
        let media_timeout = secs("MEDIA_TIMEOUT_SECS", 120)?;
        let delivery_timeout = secs("DELIVERY_TIMEOUT_SECS", 120)?;
        let pass_timeout = secs("PASS_TIMEOUT_SECS", 600)?;

        let telegram_min_interval =
            Duration::from_millis(env_parse::<u64>("TELEGRAM_MIN_INTERVAL_MS")?.unwrap_or(1050));

        let notify_startup = env_bool("NOTIFY_STARTUP").unwrap_or(true);
        let notify_errors = env_bool("NOTIFY_ERRORS").unwrap_or(true);

        let admin_secret = env_str("ADMIN_SECRET").and_then(non_empty);
        let http_host = env_str("HOST")
            .and_then(non_empty)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let http_port = env_parse::<u16>("PORT")?.unwrap_or(10_000);

        Ok(Self {
            telegram_bot_token,
            telegram_chat_id,
            watch_handle,
            poll_interval,
            batch_size,
            state_file,
            state_capacity,
            source_strategies,
            rss_url_template,
            profile_url_template,
            ytdlp_path,
            ytdlp_format,
            media_dir,
            max_upload_bytes,
            source_timeout,
            media_timeout,
            delivery_timeout,
            pass_timeout,
            telegram_min_interval,
            notify_startup,
            notify_errors,
            admin_secret,
            http_host,
            http_port,
        })
    }

    /// Whether the state file lives under the system temp dir, where a restart
    /// (or the host wiping it) loses the delivery history.
    pub fn state_is_ephemeral(&self) -> bool {
        self.state_file.starts_with(env::temp_dir())
    }
}

/// Fill `{handle}` in a URL template.
pub fn render_template(template: &str, handle: &str) -> String {
    template.replace("{handle}", handle)
}

pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_string()
}

fn parse_strategies(v: &str) -> Result<Vec<SourceStrategy>> {
    let mut out = Vec::new();
    for part in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let s = SourceStrategy::parse(part)?;
        if !out.contains(&s) {
            out.push(s);
        }
    }
    if out.is_empty() {
        return Err(Error::Config(
            "SOURCE_STRATEGIES must name at least one strategy".to_string(),
        ));
    }
    Ok(out)
}

fn required(keys: &[&str]) -> Result<String> {
    keys.iter()
        .find_map(|k| env_str(k).and_then(non_empty))
        .map(|v| v.trim().to_string())
        .ok_or_else(|| {
            Error::Config(format!("{} environment variable is required", keys[0]))
        })
}

fn secs(key: &str, default: u64) -> Result<Duration> {
    let v = env_parse::<u64>(key)?.unwrap_or(default);
    if v == 0 {
        return Err(Error::Config(format!("{key} must be > 0")));
    }
    Ok(Duration::from_secs(v))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Unset or blank is `None`; anything unparsable is a config error.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    let Some(raw) = env_str(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}")))
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        telegram_bot_token: "x".to_string(),
        telegram_chat_id: "1".to_string(),
        watch_handle: "creator".to_string(),
        poll_interval: Duration::from_secs(60),
        batch_size: 5,
        state_file: "/tmp/cw-test-delivered.json".into(),
        state_capacity: 400,
        source_strategies: vec![SourceStrategy::Rss],
        rss_url_template: DEFAULT_RSS_URL_TEMPLATE.to_string(),
        profile_url_template: DEFAULT_PROFILE_URL_TEMPLATE.to_string(),
        ytdlp_path: "yt-dlp".into(),
        ytdlp_format: "best".to_string(),
        media_dir: "/tmp/cw-test-media".into(),
        max_upload_bytes: 50 * 1024 * 1024,
        source_timeout: Duration::from_secs(5),
        media_timeout: Duration::from_secs(5),
        delivery_timeout: Duration::from_secs(5),
        pass_timeout: Duration::from_secs(30),
        telegram_min_interval: Duration::from_millis(0),
        notify_startup: false,
        notify_errors: true,
        admin_secret: None,
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_parse_in_order_and_dedupe() {
        let s = parse_strategies("rss, yt-dlp ,rss").unwrap();
        assert_eq!(s, vec![SourceStrategy::Rss, SourceStrategy::YtDlp]);
        assert!(parse_strategies("rss,carrier-pigeon").is_err());
        assert!(parse_strategies(" , ").is_err());
    }

    #[test]
    fn handle_is_normalized() {
        assert_eq!(normalize_handle("  @creator "), "creator");
        assert_eq!(normalize_handle("creator"), "creator");
    }

    #[test]
    fn template_renders_handle() {
        assert_eq!(
            render_template(DEFAULT_RSS_URL_TEMPLATE, "abc"),
            "https://rsshub.app/tiktok/user/abc"
        );
    }

    #[test]
    fn temp_state_is_flagged_ephemeral() {
        let mut cfg = test_config();
        cfg.state_file = env::temp_dir().join("delivered.json");
        assert!(cfg.state_is_ephemeral());
        cfg.state_file = PathBuf::from("data/delivered.json");
        assert!(!cfg.state_is_ephemeral());
    }
}
