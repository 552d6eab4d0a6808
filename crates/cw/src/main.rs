use cw_core::config::Config;
use tokio_util::sync::CancellationToken;

mod app;

#[tokio::main]
async fn main() -> Result<(), cw_core::Error> {
    cw_core::logging::init("cw")?;

    let cfg = Config::load()?;
    let app = app::build(&cfg)?;

    let cancel = CancellationToken::new();

    let scheduler = {
        let s = app.scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { s.run(cancel).await })
    };
    let mut admin = tokio::spawn(cw_admin::serve(app.admin_addr, app.admin, cancel.clone()));

    let admin_res = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown requested");
            None
        }
        res = &mut admin => Some(res),
    };
    cancel.cancel();

    // Cancelling aborts any pass in flight, so this returns promptly.
    if let Err(e) = scheduler.await {
        tracing::error!("scheduler task failed: {e}");
    }

    let admin_res = match admin_res {
        Some(res) => res,
        None => admin.await,
    };
    match admin_res {
        Ok(res) => res?,
        Err(e) => return Err(cw_core::Error::External(format!("admin task failed: {e}"))),
    }

    tracing::info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
