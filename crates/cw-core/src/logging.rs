use crate::{errors::Error, Result};

const WORKSPACE_TARGETS: [&str; 6] = ["cw", "cw_core", "cw_admin", "cw_rss", "cw_telegram", "cw_ytdlp"];

/// Initialize tracing for the process.
///
/// Default: info for our crates, warn for everything else.
/// Can be overridden with `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}

fn default_directives(service_name: &str) -> String {
    let service = service_name.replace('-', "_");
    let mut targets: Vec<&str> = WORKSPACE_TARGETS.to_vec();
    if !service.is_empty() && !targets.contains(&service.as_str()) {
        targets.push(&service);
    }

    let mut out = String::from("warn");
    for t in targets {
        out.push(',');
        out.push_str(t);
        out.push_str("=info");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_service_is_listed_once() {
        let d = default_directives("cw");
        assert_eq!(d.matches("cw=info").count(), 1, "{d}");
        assert!(d.starts_with("warn,"));
    }

    #[test]
    fn foreign_service_is_appended() {
        let d = default_directives("clip-watch");
        assert!(d.ends_with(",clip_watch=info"), "{d}");
    }
}
