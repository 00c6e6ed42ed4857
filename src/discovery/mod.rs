//! Follower discovery: a static username list or a scraped followers page.

pub mod filter;
pub mod scroll;

use crate::browser::Browser;
use crate::config::{Config, DiscoveryLimits};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tokio::sync::watch;

pub use scroll::{scroll_followers, ScrollPlan};

/// Bookkeeping for one scroll-and-scrape pass. `collected` only grows and
/// keeps first-seen order.
#[derive(Debug, Default)]
pub struct DiscoveryState {
    collected: Vec<String>,
    seen: HashSet<String>,
    pub previous_count: usize,
    pub no_change_streak: u32,
    pub scroll_count: u32,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union a batch into the collection. Returns whether it grew, and moves
    /// the no-change streak accordingly.
    pub fn absorb<I>(&mut self, batch: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.collected.len();
        for username in batch {
            if self.seen.insert(username.clone()) {
                self.collected.push(username);
            }
        }
        let grew = self.collected.len() > before;
        if grew {
            self.no_change_streak = 0;
        } else {
            self.no_change_streak += 1;
        }
        grew
    }

    pub fn should_stop(&self, limits: &DiscoveryLimits) -> bool {
        self.no_change_streak >= limits.max_no_change || self.scroll_count >= limits.max_scrolls
    }

    pub fn collected(&self) -> &[String] {
        &self.collected
    }

    /// Final list with route-like and near-empty entries removed.
    pub fn into_followers(self) -> Vec<String> {
        self.collected
            .into_iter()
            .filter(|u| filter::is_plausible_username(u))
            .collect()
    }
}

/// Newline-delimited usernames; blank lines skipped, no syntax validation.
/// An unreadable file is logged and yields nothing.
pub fn load_static_list(path: &Path) -> Vec<String> {
    tracing::info!(path = %path.display(), "loading followers from file");
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let followers: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
            tracing::info!(count = followers.len(), "loaded followers from file");
            followers
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to load followers file");
            Vec::new()
        }
    }
}

/// Write the discovered list out for audit, one username per line.
pub fn export_followers(path: &Path, followers: &[String]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    for follower in followers {
        writeln!(file, "{}", follower)?;
    }
    file.flush()
}

/// Produce the candidate list in the mode the config selects. A raised `stop`
/// flag cuts scrolling short.
pub async fn discover<B: Browser + ?Sized>(
    browser: &mut B,
    config: &Config,
    stop: Option<&watch::Receiver<bool>>,
) -> Vec<String> {
    if config.use_followers_txt() {
        return load_static_list(&config.paths.followers_file);
    }

    let plan = ScrollPlan {
        site_url: config.browser.site_url(),
        account: config.account_name(),
        limits: &config.discovery,
        timings: &config.timings,
        screenshots: config.options.take_screenshots,
        stop,
    };
    let followers = scroll_followers(browser, &plan).await;

    match export_followers(&config.paths.export_file, &followers) {
        Ok(()) => tracing::info!(path = %config.paths.export_file.display(), "saved followers list"),
        Err(e) => tracing::error!(
            path = %config.paths.export_file.display(),
            error = %e,
            "failed to save followers list"
        ),
    }
    followers
}
