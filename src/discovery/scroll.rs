//! Scroll-convergence scraping of the followers listing.
//!
//! The listing renders lazily, so one scrape under-collects and an unbounded
//! loop can hang on pages that never end. The loop is bounded twice: by a
//! scroll cap and by a run of scrolls that add nothing new.

use super::filter::username_from_href;
use super::DiscoveryState;
use crate::browser::{capture, Browser, ElementRef, Selector};
use crate::config::{DiscoveryLimits, Timings};
use anyhow::Result;
use tokio::sync::watch;

const LISTING_REGION: &str = "[data-testid='primaryColumn']";
const USER_CELL: &str = "[data-testid='UserCell']";

/// Containers tried, in order, when no user cells are rendered.
const FALLBACK_CONTAINERS: &[&str] = &["[data-testid='primaryColumn'] > div", "section", "main"];

pub struct ScrollPlan<'a> {
    pub site_url: &'a str,
    pub account: &'a str,
    pub limits: &'a DiscoveryLimits,
    pub timings: &'a Timings,
    pub screenshots: bool,
    /// Raised by Ctrl-C; scrolling stops and keeps what was collected.
    pub stop: Option<&'a watch::Receiver<bool>>,
}

impl ScrollPlan<'_> {
    pub fn followers_url(&self) -> String {
        format!("{}/{}/followers", self.site_url.trim_end_matches('/'), self.account)
    }
}

/// Scrape the followers listing until it stops growing or the scroll cap is hit.
/// A page that never loads yields an empty list.
pub async fn scroll_followers<B: Browser + ?Sized>(browser: &mut B, plan: &ScrollPlan<'_>) -> Vec<String> {
    let url = plan.followers_url();
    tracing::info!(account = %plan.account, %url, "collecting followers");

    if let Err(e) = browser.navigate(&url).await {
        tracing::error!(error = %format!("{:#}", e), "failed to open followers page");
        return Vec::new();
    }
    match browser
        .wait_for_present(&Selector::css(LISTING_REGION), Timings::secs(plan.timings.page_load_wait))
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::error!("timed out waiting for followers page to load");
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "followers page failed to load");
            return Vec::new();
        }
    }
    tokio::time::sleep(Timings::secs(plan.timings.page_settle)).await;
    if plan.screenshots {
        capture(browser, "followers_page").await;
    }

    let mut state = DiscoveryState::new();
    while !state.should_stop(plan.limits) {
        if plan.stop.is_some_and(|stop| *stop.borrow()) {
            tracing::warn!(scroll = state.scroll_count, "interrupted, ending discovery early");
            break;
        }
        state.scroll_count += 1;

        let batch = match visible_usernames(browser, plan.site_url).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::debug!(error = %e, scroll = state.scroll_count, "scrape failed");
                Vec::new()
            }
        };

        if !state.absorb(batch) {
            tracing::info!(
                attempt = state.no_change_streak,
                max = plan.limits.max_no_change,
                "no new followers after scroll"
            );
        }
        let count = state.collected().len();
        if count != state.previous_count {
            tracing::info!(count, "followers found so far");
            state.previous_count = count;
        }

        if let Err(e) = browser.scroll_to_bottom().await {
            tracing::debug!(error = %e, "scroll failed");
        }
        tokio::time::sleep(Timings::secs(plan.timings.scroll_settle)).await;

        let every = plan.limits.screenshot_every;
        if plan.screenshots && every > 0 && state.scroll_count % every == 0 {
            capture(browser, &format!("scroll_{}", state.scroll_count)).await;
        }
    }

    let scrolls = state.scroll_count;
    let followers = state.into_followers();
    if followers.is_empty() {
        tracing::error!(
            scrolls,
            "no followers found; check the account has followers or run without headless"
        );
    } else {
        tracing::info!(count = followers.len(), scrolls, "followers collected");
    }
    followers
}

/// Usernames linked from the listing region right now.
async fn visible_usernames<B: Browser + ?Sized>(browser: &mut B, site_url: &str) -> Result<Vec<String>> {
    let region = browser
        .query_all(None, &Selector::css(LISTING_REGION))
        .await?
        .into_iter()
        .next();
    let cells = match &region {
        Some(region) => browser.query_all(Some(region), &Selector::css(USER_CELL)).await?,
        None => Vec::new(),
    };

    let mut usernames = Vec::new();
    if cells.is_empty() {
        tracing::debug!("no user cells rendered, scanning best-guess container");
        for css in FALLBACK_CONTAINERS {
            let container = browser.query_all(None, &Selector::css(*css)).await?;
            if let Some(container) = container.into_iter().next() {
                usernames.extend(linked_usernames(browser, &container, site_url).await?);
                break;
            }
        }
        return Ok(usernames);
    }

    for cell in &cells {
        match linked_usernames(browser, cell, site_url).await {
            Ok(found) => usernames.extend(found),
            // Cells detach while the list re-renders; skip and carry on
            Err(e) => tracing::debug!(error = %e, "failed to read user cell"),
        }
    }
    Ok(usernames)
}

async fn linked_usernames<B: Browser + ?Sized>(
    browser: &mut B,
    scope: &ElementRef,
    site_url: &str,
) -> Result<Vec<String>> {
    let links = browser.query_all(Some(scope), &Selector::css("a")).await?;
    let mut out = Vec::new();
    for link in &links {
        if let Some(href) = browser.get_attribute(link, "href").await? {
            if let Some(username) = username_from_href(&href, site_url) {
                out.push(username);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_followers_url() {
        let limits = DiscoveryLimits::default();
        let timings = Timings::immediate();
        let plan = ScrollPlan {
            site_url: "https://x.com/",
            account: "acme",
            limits: &limits,
            timings: &timings,
            screenshots: false,
            stop: None,
        };
        assert_eq!(plan.followers_url(), "https://x.com/acme/followers");
    }
}
