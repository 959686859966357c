//! Run command - per-account monitor loops with graceful shutdown

use anyhow::{Context, Result, bail};
use post_archiver_adapters::{
    HttpFeedSource,
    sink::{FileArchive, SqliteArchive},
    state_file,
};
use post_archiver_domain::{
    AccountIdentity, ArchiveSink, SystemClock,
    usecases::{CycleError, FeedMonitor},
};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};

use crate::args::RunArgs;
use crate::config::{AppConfig, SinkBackend};

/// How long shutdown waits for in-flight cycles before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Delay between username resolution attempts at startup.
const RESOLVE_RETRY_DELAY: Duration = Duration::from_secs(5);

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    // Missing account or credential configuration is fatal: no partial
    // operation at startup.
    if config.watch.accounts.is_empty() {
        bail!("No accounts configured under [watch].accounts");
    }
    let bearer_token = load_bearer_token(&config.feed.bearer_token_env)?;

    let feed = Arc::new(HttpFeedSource::with_base_url(
        bearer_token,
        config.feed.base_url.clone(),
    ));

    let sink: Arc<dyn ArchiveSink> = match config.storage.backend {
        SinkBackend::Sqlite => Arc::new(
            SqliteArchive::new(&config.storage.db_path)
                .await
                .context("Failed to open archive database")?,
        ),
        SinkBackend::Files => Arc::new(FileArchive::new(&config.storage.output_dir)),
    };

    let clock = Arc::new(SystemClock);
    let poll_interval = Duration::from_secs(config.watch.poll_interval_secs);
    let freshness_window = Duration::from_secs(config.watch.freshness_window_secs);

    tracing::info!(
        accounts = ?config.watch.accounts,
        backend = sink.backend(),
        poll_interval_secs = config.watch.poll_interval_secs,
        once = args.once,
        "Starting post-archiver"
    );

    if args.once {
        for username in &config.watch.accounts {
            let mut monitor = bootstrap_monitor(
                username,
                &feed,
                &sink,
                &clock,
                freshness_window,
            )
            .await;

            match monitor.cycle().await {
                Ok(report) => tracing::info!(
                    account = %username,
                    fetched = report.fetched,
                    persisted = report.persisted,
                    failed_writes = report.failed_writes,
                    status = %monitor.status(),
                    "Cycle complete"
                ),
                Err(CycleError::Fetch(error)) => tracing::error!(
                    account = %username,
                    error = %error,
                    "Cycle failed"
                ),
            }

            flush_state(&config.storage.state_dir, &monitor).await;
        }
        return Ok(());
    }

    // One independent task per account; the ticker coalesces missed ticks so
    // at most one cycle is ever in flight per account.
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut handles = Vec::with_capacity(config.watch.accounts.len());

    for username in &config.watch.accounts {
        let username = username.clone();
        let feed = Arc::clone(&feed);
        let sink = Arc::clone(&sink);
        let clock = Arc::clone(&clock);
        let state_dir = config.storage.state_dir.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        handles.push(tokio::spawn(async move {
            let mut monitor =
                bootstrap_monitor(&username, &feed, &sink, &clock, freshness_window).await;

            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match monitor.cycle().await {
                            Ok(report) => {
                                if report.admitted > 0 {
                                    tracing::info!(
                                        account = %username,
                                        persisted = report.persisted,
                                        failed_writes = report.failed_writes,
                                        "Cycle complete"
                                    );
                                }
                            }
                            Err(CycleError::Fetch(error)) => {
                                tracing::error!(
                                    account = %username,
                                    error = %error,
                                    "Cycle failed, retrying on next tick"
                                );
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            flush_state(&state_dir, &monitor).await;
            tracing::info!(account = %username, status = %monitor.status(), "Monitor stopped");
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    // Bounded, shared grace period: do not wait for stuck cycles forever.
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    for handle in handles {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if tokio::time::timeout(remaining, handle).await.is_err() {
            tracing::warn!("Shutdown grace period elapsed with monitors still running");
            break;
        }
    }

    tracing::info!("post-archiver run completed");
    Ok(())
}

/// Resolve the account's user ID and establish its baseline watermark.
/// Both steps retry until the network cooperates; startup is unbounded by
/// design so a monitor never begins with an undefined baseline.
async fn bootstrap_monitor(
    username: &str,
    feed: &Arc<HttpFeedSource>,
    sink: &Arc<dyn ArchiveSink>,
    clock: &Arc<SystemClock>,
    freshness_window: Duration,
) -> FeedMonitor<HttpFeedSource, dyn ArchiveSink, SystemClock> {
    let user_id = loop {
        match feed.lookup_user_id(username).await {
            Ok(id) => break id,
            Err(error) => {
                tracing::warn!(
                    account = %username,
                    error = %error,
                    "User ID lookup failed, retrying"
                );
                sleep(RESOLVE_RETRY_DELAY).await;
            }
        }
    };

    let identity = AccountIdentity {
        username: username.to_string(),
        user_id,
    };

    FeedMonitor::bootstrap(
        identity,
        Arc::clone(feed),
        Arc::clone(sink),
        Arc::clone(clock),
        freshness_window,
    )
    .await
}

async fn flush_state(
    state_dir: &Path,
    monitor: &FeedMonitor<HttpFeedSource, dyn ArchiveSink, SystemClock>,
) {
    let account = &monitor.account().username;
    match state_file::save_state(state_dir, account, &monitor.snapshot()).await {
        Ok(path) => tracing::info!(
            account = %account,
            path = %path.display(),
            "Saved monitor state"
        ),
        Err(error) => tracing::error!(
            account = %account,
            error = %error,
            "Failed to save monitor state"
        ),
    }
}

fn load_bearer_token(env_var: &str) -> Result<SecretString> {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::new(value.into())),
        _ => bail!("Bearer token environment variable {} is not set", env_var),
    }
}
