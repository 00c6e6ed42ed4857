// Scripted in-memory browser shared by the integration tests

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use follower_dm::browser::{soft_break, Browser, ElementRef, Key, Keystroke, Selector};
use follower_dm::config::Config;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

pub const PRIMARY_COLUMN: &str = "[data-testid='primaryColumn']";
pub const USER_CELL: &str = "[data-testid='UserCell']";
pub const COLUMN_CHILD: &str = "[data-testid='primaryColumn'] > div";

pub const DM_BUTTON: &str = "button[data-testid='sendDMFromProfile']";
pub const DM_BUTTON_LABEL: &str = "button[aria-label*='Message']";
pub const BUTTONS: &str = "button, div[role='button']";
pub const USER_ACTIONS: &str = "div[data-testid='userActions']";
pub const ROLE_BUTTON: &str = "div[role='button']";

pub const DM_INPUT: &str = "div[data-testid='dmComposerTextInput']";
pub const TEXTBOX: &str = "div[role='textbox'][contenteditable='true']";
pub const SEND_BUTTON: &str = "button[data-testid='dmComposerSendButton']";
pub const SEND_LABEL: &str = "button[aria-label='Send']";

pub const LOGIN_USERNAME: &str = "input[autocomplete='username']";
pub const LOGIN_VERIFY: &str = "input[data-testid='ocfEnterTextTextInput']";
pub const LOGIN_PASSWORD: &str = "input[autocomplete='current-password']";

/// A browser whose page is a handful of selector tables.
///
/// Elements found through `wait_for_present`, or through `query_all` when the
/// selector has no explicit entry, are identified by their selector string.
#[derive(Default)]
pub struct FakeBrowser {
    /// Selectors that resolve to an element.
    pub present: HashSet<String>,
    /// Explicit page-level query results.
    pub page: HashMap<String, Vec<String>>,
    /// Explicit scoped query results keyed by (scope id, selector).
    pub children: HashMap<(String, String), Vec<String>>,
    pub attributes: HashMap<(String, String), String>,
    /// Selectors whose lookup errors.
    pub broken: HashSet<String>,
    /// Element ids that refuse clicks.
    pub unclickable: HashSet<String>,
    /// Element ids that act as the send control when clicked.
    pub send_controls: HashSet<String>,

    /// Whether `type_text` reaches the composer.
    pub typing_works: bool,
    /// Whether keyboard actions reach the focused element.
    pub keystrokes_work: bool,
    /// Whether pressing Enter in the composer sends.
    pub enter_sends: bool,
    /// Whether the sent text shows up in the conversation.
    pub echo_after_send: bool,
    /// Whether the composer empties itself after a send.
    pub clears_after_send: bool,
    pub location: String,
    /// Where the page moves after a send, if anywhere.
    pub conversation_url: Option<String>,

    /// Followers listing: hrefs per scroll position.
    pub listing: Vec<Vec<String>>,
    /// Render the listing without user cells.
    pub listing_without_cells: bool,
    pub screen: usize,

    pub text: HashMap<String, String>,
    pub focused: Option<String>,
    pub navigations: Vec<String>,
    pub clicks: Vec<String>,
    pub sent: Vec<String>,
    pub enters: usize,
    pub scrolls: usize,
    pub artifacts: Vec<String>,
    pub closed: bool,
}

impl FakeBrowser {
    pub fn new() -> Self {
        let mut browser = Self {
            typing_works: true,
            keystrokes_work: true,
            location: "https://x.com/home".to_string(),
            ..Self::default()
        };
        browser.show(PRIMARY_COLUMN);
        browser
    }

    /// A profile page where every structural control is in place.
    pub fn happy_profile() -> Self {
        let mut browser = Self::new();
        browser.show(DM_BUTTON).show(DM_INPUT).show(SEND_BUTTON);
        browser.send_controls.insert(SEND_BUTTON.to_string());
        browser.echo_after_send = true;
        browser
    }

    pub fn with_listing(screens: &[&[&str]]) -> Self {
        let mut browser = Self::new();
        browser.listing = screens
            .iter()
            .map(|s| s.iter().map(|h| h.to_string()).collect())
            .collect();
        browser
    }

    pub fn show(&mut self, selector: &str) -> &mut Self {
        self.present.insert(selector.to_string());
        self
    }

    pub fn hide(&mut self, selector: &str) -> &mut Self {
        self.present.remove(selector);
        self
    }

    pub fn set_attr(&mut self, id: &str, name: &str, value: &str) -> &mut Self {
        self.attributes
            .insert((id.to_string(), name.to_string()), value.to_string());
        self
    }

    pub fn text_of(&self, id: &str) -> String {
        self.text.get(id).cloned().unwrap_or_default()
    }

    fn selector_key(selector: &Selector) -> String {
        match selector {
            Selector::Css(s) => s.clone(),
            Selector::XPath(s) => format!("xpath:{}", s),
        }
    }

    fn current_links(&self) -> Vec<String> {
        match self.listing.get(self.screen) {
            Some(hrefs) => (0..hrefs.len())
                .map(|i| format!("link:{}:{}", self.screen, i))
                .collect(),
            None => Vec::new(),
        }
    }

    fn append(&mut self, id: &str, raw: &str) {
        let with_breaks = raw.replace(&soft_break(), "\n");
        self.enters += with_breaks.matches(Key::Enter.code()).count();
        let cleaned: String = with_breaks
            .chars()
            .filter(|c| *c != Key::Enter.code() && *c != Key::Shift.code())
            .collect();
        self.text.entry(id.to_string()).or_default().push_str(&cleaned);
    }

    fn send_from(&mut self, id: &str) {
        let body = self.text_of(id);
        self.sent.push(body);
        if self.clears_after_send {
            self.text.insert(id.to_string(), String::new());
        }
        if let Some(url) = self.conversation_url.clone() {
            self.location = url;
        }
    }

    fn composer_id(&self) -> Option<String> {
        self.text.keys().next().cloned()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.push(url.to_string());
        self.location = url.to_string();
        self.screen = 0;
        Ok(())
    }

    async fn wait_for_present(
        &mut self,
        selector: &Selector,
        _timeout: Duration,
    ) -> Result<Option<ElementRef>> {
        let key = Self::selector_key(selector);
        if self.broken.contains(&key) {
            bail!("stale element lookup for {}", key);
        }
        Ok(self.present.contains(&key).then(|| ElementRef(key)))
    }

    async fn query_all(
        &mut self,
        scope: Option<&ElementRef>,
        selector: &Selector,
    ) -> Result<Vec<ElementRef>> {
        let key = Self::selector_key(selector);
        if self.broken.contains(&key) {
            bail!("lookup failed for {}", key);
        }
        if let Selector::XPath(_) = selector {
            let echoed = self.echo_after_send && !self.sent.is_empty();
            return Ok(if echoed {
                vec![ElementRef("echo".to_string())]
            } else {
                Vec::new()
            });
        }

        let ids = match scope {
            None => match self.page.get(&key) {
                Some(ids) => ids.clone(),
                None if self.present.contains(&key) => vec![key.clone()],
                None => Vec::new(),
            },
            Some(ElementRef(scope_id)) => {
                if let Some(ids) = self.children.get(&(scope_id.clone(), key.clone())) {
                    ids.clone()
                } else if !self.listing.is_empty() && key == USER_CELL {
                    if self.listing_without_cells {
                        Vec::new()
                    } else {
                        let n = self.listing.get(self.screen).map_or(0, Vec::len);
                        (0..n).map(|i| format!("cell:{}:{}", self.screen, i)).collect()
                    }
                } else if !self.listing.is_empty() && key == "a" {
                    match scope_id.strip_prefix("cell:") {
                        Some(rest) => vec![format!("link:{}", rest)],
                        None => self.current_links(),
                    }
                } else {
                    Vec::new()
                }
            }
        };
        Ok(ids.into_iter().map(ElementRef).collect())
    }

    async fn get_attribute(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let id = element.0.as_str();
        if let (Some(rest), "href") = (id.strip_prefix("link:"), name) {
            let mut parts = rest.split(':').filter_map(|p| p.parse::<usize>().ok());
            if let (Some(screen), Some(i)) = (parts.next(), parts.next()) {
                return Ok(self.listing.get(screen).and_then(|s| s.get(i)).cloned());
            }
        }
        if matches!(name, "textContent" | "innerHTML") {
            if let Some(text) = self.text.get(id) {
                return Ok(Some(text.clone()));
            }
        }
        Ok(self
            .attributes
            .get(&(id.to_string(), name.to_string()))
            .cloned())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        let id = element.0.clone();
        if self.unclickable.contains(&id) {
            bail!("element {} is not clickable", id);
        }
        self.clicks.push(id.clone());
        if self.send_controls.contains(&id) {
            if let Some(composer) = self.composer_id() {
                self.send_from(&composer);
            }
        } else {
            self.focused = Some(id);
        }
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> Result<()> {
        if self.typing_works {
            self.text.insert(element.0.clone(), String::new());
        }
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> Result<()> {
        if self.typing_works {
            let id = element.0.clone();
            self.append(&id, text);
        }
        Ok(())
    }

    async fn send_key(&mut self, sequence: &[Keystroke]) -> Result<()> {
        if !self.keystrokes_work {
            return Ok(());
        }
        let Some(target) = self.focused.clone() else {
            bail!("nothing has focus");
        };
        for stroke in sequence {
            match stroke {
                Keystroke::Text(t) => self.text.entry(target.clone()).or_default().push_str(t),
                Keystroke::Chord(_, Key::Enter) => {
                    self.text.entry(target.clone()).or_default().push('\n')
                }
                Keystroke::Press(Key::Enter) => {
                    self.enters += 1;
                    if self.enter_sends {
                        self.send_from(&target);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.scrolls += 1;
        if self.screen + 1 < self.listing.len() {
            self.screen += 1;
        }
        Ok(())
    }

    async fn current_location(&mut self) -> Result<String> {
        Ok(self.location.clone())
    }

    async fn capture_debug_artifact(&mut self, tag: &str) -> Result<Option<PathBuf>> {
        self.artifacts.push(tag.to_string());
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Example config with zero delays and screenshots off.
pub fn test_config(message: &str) -> Config {
    let mut config = Config::parse(&format!(
        r#"
message = """{}"""

[x_credentials]
account_name = "acme"
username = "operator"
password = "hunter2"

[options]
dm_interval = 0
take_screenshots = false
"#,
        message
    ))
    .expect("test config parses");
    config.timings = follower_dm::config::Timings::immediate();
    config
}
