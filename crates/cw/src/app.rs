//! Wiring: turns a [`Config`] into a ready-to-run scheduler and admin state.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use cw_admin::AdminState;
use cw_core::{
    config::{Config, SourceStrategy},
    errors::Error,
    notify::{
        port::Notifier,
        throttled::{ThrottleConfig, ThrottledNotifier},
    },
    ports::SourceAdapter,
    scan::{ScanEngine, ScanSettings},
    scheduler::{Scheduler, SchedulerSettings},
    source_chain::SourceChain,
    store::DeliveryStore,
    Result,
};
use cw_rss::RssMirrorSource;
use cw_telegram::TelegramNotifier;
use cw_ytdlp::{YtDlpConfig, YtDlpFetcher, YtDlpListing};

pub struct App {
    pub scheduler: Scheduler,
    pub admin: AdminState,
    pub admin_addr: SocketAddr,
}

pub fn build(cfg: &Config) -> Result<App> {
    let telegram = TelegramNotifier::new(
        &cfg.telegram_bot_token,
        &cfg.telegram_chat_id,
        cfg.max_upload_bytes,
        cfg.delivery_timeout,
    )?;
    let notifier: Arc<dyn Notifier> = Arc::new(ThrottledNotifier::new(
        Arc::new(telegram),
        ThrottleConfig {
            min_interval: cfg.telegram_min_interval,
        },
    ));

    let source = Arc::new(SourceChain::new(sources(cfg)?, cfg.source_timeout));
    let fetcher = Arc::new(YtDlpFetcher::new(YtDlpConfig::from_config(cfg)));

    if cfg.state_is_ephemeral() {
        tracing::warn!(
            path = %cfg.state_file.display(),
            "state file is under the temp dir; delivery history will not survive a reboot"
        );
    }
    let store = DeliveryStore::load(&cfg.state_file, cfg.state_capacity);
    tracing::info!(
        path = %store.path().display(),
        known = store.len(),
        "delivery state loaded"
    );

    let engine = ScanEngine::new(
        ScanSettings::from(cfg),
        source,
        fetcher,
        notifier.clone(),
        store,
    );
    let scheduler = Scheduler::new(SchedulerSettings::from(cfg), engine, notifier);

    if cfg.admin_secret.is_none() {
        tracing::info!("ADMIN_SECRET unset; /scan trigger disabled");
    }

    Ok(App {
        admin: AdminState {
            scheduler: scheduler.clone(),
            secret: cfg.admin_secret.clone(),
        },
        scheduler,
        admin_addr: admin_addr(&cfg.http_host, cfg.http_port)?,
    })
}

fn sources(cfg: &Config) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut out: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for strategy in &cfg.source_strategies {
        match strategy {
            SourceStrategy::YtDlp => out.push(Arc::new(YtDlpListing::new(
                cfg.ytdlp_path.clone(),
                cfg.profile_url_template.clone(),
            ))),
            SourceStrategy::Rss => out.push(Arc::new(RssMirrorSource::new(
                cfg.rss_url_template.clone(),
                cfg.source_timeout,
            )?)),
        }
    }
    Ok(out)
}

fn admin_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid HOST {host:?}: {e}")))?;
    Ok(SocketAddr::new(ip, port))
}
