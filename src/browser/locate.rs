//! Ordered-fallback element location.
//!
//! The remote UI's structural identifiers change without notice, so every
//! control is described by several independent signals tried in priority order.

use super::{Browser, ElementRef, Selector};
use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// CSS selector on a test id or similar structural marker. Waited for.
    StructuralId(&'static str),
    /// CSS selector on accessibility attributes (aria-label, role). Waited for.
    AccessibleLabel(&'static str),
    /// First candidate whose text content contains `needle`, case-insensitive.
    ContentMatch {
        candidates: &'static str,
        needle: &'static str,
    },
    /// First candidate inside the first `scope` match (or the whole page).
    GenericScan {
        scope: Option<&'static str>,
        candidates: &'static str,
    },
}

impl Locator {
    pub fn kind(&self) -> &'static str {
        match self {
            Locator::StructuralId(_) => "structural-id",
            Locator::AccessibleLabel(_) => "accessible-label",
            Locator::ContentMatch { .. } => "content-match",
            Locator::GenericScan { .. } => "generic-scan",
        }
    }

    pub async fn locate<B: Browser + ?Sized>(
        &self,
        browser: &mut B,
        wait: Duration,
    ) -> Result<Option<ElementRef>> {
        match *self {
            Locator::StructuralId(css) | Locator::AccessibleLabel(css) => {
                browser.wait_for_present(&Selector::css(css), wait).await
            }
            Locator::ContentMatch { candidates, needle } => {
                let needle = needle.to_lowercase();
                let elements = browser.query_all(None, &Selector::css(candidates)).await?;
                for el in elements {
                    let text = browser.get_attribute(&el, "textContent").await?;
                    if text.is_some_and(|t| t.to_lowercase().contains(&needle)) {
                        return Ok(Some(el));
                    }
                }
                Ok(None)
            }
            Locator::GenericScan { scope, candidates } => {
                let scope_el = match scope {
                    Some(css) => {
                        let found = browser.query_all(None, &Selector::css(css)).await?;
                        match found.into_iter().next() {
                            Some(el) => Some(el),
                            None => return Ok(None),
                        }
                    }
                    None => None,
                };
                let found = browser
                    .query_all(scope_el.as_ref(), &Selector::css(candidates))
                    .await?;
                Ok(found.into_iter().next())
            }
        }
    }
}

/// Try each locator in order and return the first element found.
///
/// A strategy that errors is treated like one that found nothing.
pub async fn resolve<B: Browser + ?Sized>(
    browser: &mut B,
    locators: &[Locator],
    wait: Duration,
) -> Option<(ElementRef, Locator)> {
    for locator in locators {
        match locator.locate(browser, wait).await {
            Ok(Some(el)) => {
                tracing::debug!(strategy = locator.kind(), "element located");
                return Some((el, *locator));
            }
            Ok(None) => {
                tracing::debug!(strategy = locator.kind(), "strategy found nothing");
            }
            Err(e) => {
                tracing::debug!(strategy = locator.kind(), error = %e, "strategy errored");
            }
        }
    }
    None
}

/// Like `resolve`, but clicks the element too. A located element that refuses
/// the click falls through to the next strategy.
pub async fn resolve_and_click<B: Browser + ?Sized>(
    browser: &mut B,
    locators: &[Locator],
    wait: Duration,
) -> Option<Locator> {
    for locator in locators {
        let el = match locator.locate(browser, wait).await {
            Ok(Some(el)) => el,
            Ok(None) => {
                tracing::debug!(strategy = locator.kind(), "strategy found nothing");
                continue;
            }
            Err(e) => {
                tracing::debug!(strategy = locator.kind(), error = %e, "strategy errored");
                continue;
            }
        };
        match browser.click(&el).await {
            Ok(()) => return Some(*locator),
            Err(e) => tracing::debug!(strategy = locator.kind(), error = %e, "click failed"),
        }
    }
    None
}
