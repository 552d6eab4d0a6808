//! Fixed-interval scan scheduler.
//!
//! - Runs a scan pass, sleeps `poll_interval`, repeats until cancelled
//! - Every pass (scheduled or on-demand) goes through [`Scheduler::run_pass`],
//!   which holds the single pass lock, so two passes never overlap
//! - A pass that times out or panics is reported and the loop keeps going
//! - Cancelling the loop also aborts the pass in flight

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    domain::ScanResult,
    errors::Error,
    formatting::{pass_failure_notice, startup_notice},
    notify::port::Notifier,
    scan::ScanEngine,
    Result,
};

#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub handle: String,
    pub poll_interval: Duration,
    pub pass_timeout: Duration,
    pub notify_startup: bool,
    pub notify_errors: bool,
}

impl From<&Config> for SchedulerSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            handle: cfg.watch_handle.clone(),
            poll_interval: cfg.poll_interval,
            pass_timeout: cfg.pass_timeout,
            notify_startup: cfg.notify_startup,
            notify_errors: cfg.notify_errors,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    settings: SchedulerSettings,
    /// Owning the engine behind the lock makes the store single-writer.
    engine: Arc<Mutex<ScanEngine>>,
    reporter: Arc<dyn Notifier>,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings, engine: ScanEngine, reporter: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                settings,
                engine: Arc::new(Mutex::new(engine)),
                reporter,
            }),
        }
    }

    /// Loop until `cancel` fires. A pass still running at that point is
    /// aborted; its in-flight item may be delivered again after restart.
    pub async fn run(&self, cancel: CancellationToken) {
        let s = &self.inner.settings;
        tracing::info!(
            handle = %s.handle,
            interval_secs = s.poll_interval.as_secs(),
            "scheduler started"
        );

        if s.notify_startup {
            let text = startup_notice(&s.handle, s.poll_interval.as_secs());
            if let Err(e) = self.inner.reporter.send_text(&text).await {
                tracing::warn!("startup notification failed: {e}");
            }
        }

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Errors are already logged and reported inside the pass.
            let _ = self.pass(&cancel).await;

            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = sleep(s.poll_interval) => {}
            }
        }

        tracing::info!("scheduler stopped");
    }

    /// On-demand pass (admin trigger). Waits for an in-flight pass to finish.
    pub async fn trigger(&self) -> Result<ScanResult> {
        tracing::info!("on-demand scan requested");
        self.run_pass().await
    }

    /// Run exactly one pass under the pass lock and the pass timeout.
    ///
    /// The pass runs on its own task so a panic is contained; on timeout the
    /// task is aborted, which also releases the lock.
    pub async fn run_pass(&self) -> Result<ScanResult> {
        self.pass(&CancellationToken::new()).await
    }

    async fn pass(&self, cancel: &CancellationToken) -> Result<ScanResult> {
        let guard = tokio::select! {
            guard = self.inner.engine.clone().lock_owned() => guard,
            _ = cancel.cancelled() => {
                return Err(Error::External("scan pass cancelled".to_string()));
            }
        };
        let pass_timeout = self.inner.settings.pass_timeout;

        let mut task = tokio::spawn(async move {
            let mut engine = guard;
            engine.scan().await
        });

        let finished = tokio::select! {
            res = tokio::time::timeout(pass_timeout, &mut task) => res,
            _ = cancel.cancelled() => {
                task.abort();
                let _ = task.await;
                tracing::info!("scan pass cancelled by shutdown");
                return Err(Error::External("scan pass cancelled".to_string()));
            }
        };

        let res = match finished {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(Error::External(format!("scan pass panicked: {join_err}")))
            }
            Ok(Err(join_err)) => Err(Error::External(format!("scan pass aborted: {join_err}"))),
            Err(_) => {
                task.abort();
                // Wait for the abort so the lock is free before we return.
                let _ = task.await;
                Err(Error::timeout("scan pass", pass_timeout))
            }
        };

        if let Err(e) = &res {
            self.report_failure(e).await;
        }
        res
    }

    async fn report_failure(&self, e: &Error) {
        tracing::error!("scan pass failed: {e}");
        if !self.inner.settings.notify_errors {
            return;
        }
        let text = pass_failure_notice(&e.to_string());
        if let Err(send_e) = self.inner.reporter.send_text(&text).await {
            tracing::warn!("failed to send pass failure notification: {send_e}");
        }
    }
}

// === Tests ===
