use anyhow::{Context, Result};
use follower_dm::browser::webdriver::WebDriverBrowser;
use follower_dm::browser::Browser;
use follower_dm::config::{Config, Timings};
use follower_dm::delivery::Courier;
use follower_dm::dispatch::{build_worklist, Dispatcher, RunSummary};
use follower_dm::store::{FailureLog, ProgressState, ProgressStore};
use follower_dm::{discovery, session};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::watch;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

fn init_logging(log_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let path = log_dir.join(format!(
        "x_dm_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let log_file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create log file: {}", path.display()))?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("follower_dm=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(log_file))
        .init();
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load(&config_path)?;

    // Real env vars take precedence over .env
    Config::load_env_file();
    config.validate()?;

    let log_path = init_logging(&config.paths.log_dir)?;
    tracing::info!("============ X DM RUN STARTED ============");
    tracing::info!(config = %config_path.display(), log = %log_path.display(), "configuration loaded");
    let started = Instant::now();

    let result = run(&config).await;
    match &result {
        Ok(summary) => {
            if summary.interrupted {
                tracing::warn!("run interrupted by user");
            }
            tracing::info!(
                "tally: sent={} unconfirmed={} failed={}",
                summary.sent,
                summary.unconfirmed,
                summary.failed
            );
        }
        Err(e) => tracing::error!(error = %format!("{:#}", e), "run aborted"),
    }
    tracing::info!(
        elapsed_secs = started.elapsed().as_secs(),
        "============ X DM RUN FINISHED ============"
    );
    result.map(|_| ())
}

/// Everything that needs the browser. The session is closed on every path out.
async fn run(config: &Config) -> Result<RunSummary> {
    let store = ProgressStore::new(&config.paths.progress_file, &config.paths.failure_file);
    let (mut progress, mut failures) = store.load()?;
    let password = config.password()?;

    let screenshot_dir = if config.options.take_screenshots {
        let dir = config.paths.screenshot_dir.clone();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create screenshot directory: {}", dir.display()))?;
        Some(dir)
    } else {
        None
    };

    let mut browser =
        WebDriverBrowser::launch(&config.browser, config.headless, &config.timings, screenshot_dir)
            .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping at the next checkpoint");
            let _ = shutdown_tx.send(true);
        }
    });

    let outcome = drive(
        &mut browser,
        config,
        &store,
        &password,
        &mut progress,
        &mut failures,
        shutdown_rx,
    )
    .await;
    signal.abort();

    match browser.close().await {
        Ok(()) => tracing::info!("browser closed"),
        Err(e) => tracing::warn!(error = %format!("{:#}", e), "failed to close browser session"),
    }
    outcome
}

async fn drive(
    browser: &mut WebDriverBrowser,
    config: &Config,
    store: &ProgressStore,
    password: &str,
    progress: &mut ProgressState,
    failures: &mut FailureLog,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary> {
    session::login(browser, config, password).await?;

    let discovered = discovery::discover(browser, config, Some(&shutdown)).await;
    tracing::info!(count = discovered.len(), "followers discovered");

    let worklist = build_worklist(
        &discovered,
        progress,
        config.options.skip_first_n,
        config.options.max_followers_to_process,
    );
    tracing::info!(
        pending = worklist.len(),
        already_messaged = progress.messaged_usernames.len(),
        "worklist ready"
    );
    if worklist.is_empty() {
        tracing::info!("no new followers to message");
        return Ok(RunSummary::default());
    }

    let mut courier = Courier::new(browser, config);
    let mut dispatcher = Dispatcher::new(
        &mut courier,
        store,
        &config.options,
        Timings::secs(config.timings.retry_backoff),
        shutdown,
    );
    let summary = dispatcher.run(&worklist, progress, failures).await?;
    Ok(summary)
}
