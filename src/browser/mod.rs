//! Capability interface over the browser-automation driver.
//!
//! Discovery, login and delivery only ever talk to a `Browser`. The real
//! implementation is `webdriver::WebDriverBrowser`; tests script a fake.

pub mod locate;
pub mod webdriver;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

pub use locate::{resolve, resolve_and_click, Locator};

/// How to find elements in the current document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Self::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Self::XPath(s.into())
    }
}

/// Opaque handle to an element the driver has already located.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Non-printable keys used by the composer and login flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Shift,
}

impl Key {
    /// WebDriver key code point.
    pub fn code(self) -> char {
        match self {
            Key::Enter => '\u{E007}',
            Key::Shift => '\u{E008}',
        }
    }
}

/// One step of a simulated keyboard sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keystroke {
    Text(String),
    Press(Key),
    /// Hold the first key while pressing the second.
    Chord(Key, Key),
}

/// A soft line break inside a rich-text composer.
pub fn soft_break() -> String {
    [Key::Shift.code(), Key::Enter.code()].iter().collect()
}

#[async_trait]
pub trait Browser: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Poll until an element matching `selector` exists. `Ok(None)` on timeout.
    async fn wait_for_present(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Option<ElementRef>>;

    /// All matches, in document order, under `scope` (or the whole page).
    async fn query_all(
        &mut self,
        scope: Option<&ElementRef>,
        selector: &Selector,
    ) -> Result<Vec<ElementRef>>;

    /// DOM property or attribute value (property wins, e.g. `href`, `textContent`).
    async fn get_attribute(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>>;

    async fn click(&mut self, element: &ElementRef) -> Result<()>;

    async fn clear(&mut self, element: &ElementRef) -> Result<()>;

    /// Type into an element. Key code points (see `Key::code`) are honoured,
    /// modifiers stay held until the end of `text`.
    async fn type_text(&mut self, element: &ElementRef, text: &str) -> Result<()>;

    /// Keyboard input to whatever currently has focus.
    async fn send_key(&mut self, sequence: &[Keystroke]) -> Result<()>;

    async fn scroll_to_bottom(&mut self) -> Result<()>;

    async fn current_location(&mut self) -> Result<String>;

    /// Save a screenshot for offline debugging. Returns where it went, if anywhere.
    async fn capture_debug_artifact(&mut self, tag: &str) -> Result<Option<PathBuf>>;

    async fn close(&mut self) -> Result<()>;
}

/// Best-effort debug screenshot; a failure is logged and otherwise ignored.
pub async fn capture<B: Browser + ?Sized>(browser: &mut B, tag: &str) {
    if let Err(e) = browser.capture_debug_artifact(tag).await {
        tracing::error!(tag, error = %format!("{:#}", e), "failed to save screenshot");
    }
}
