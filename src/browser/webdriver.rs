//! W3C WebDriver client (chromedriver) behind the `Browser` trait.
//!
//! Protocol: https://www.w3.org/TR/webdriver2/

use super::{Browser, ElementRef, Keystroke, Selector};
use crate::config::{BrowserConfig, Timings};
use crate::errors::DispatchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Key under which WebDriver serializes element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

pub struct WebDriverBrowser {
    client: Client,
    base_url: String,
    session_id: String,
    poll_interval: Duration,
    /// `None` when screenshots are disabled.
    screenshot_dir: Option<PathBuf>,
}

impl WebDriverBrowser {
    /// Start a browser session. A headless start that fails is retried once
    /// with a plain windowed browser before giving up.
    pub async fn launch(
        config: &BrowserConfig,
        headless: bool,
        timings: &Timings,
        screenshot_dir: Option<PathBuf>,
    ) -> std::result::Result<Self, DispatchError> {
        tracing::info!(headless, url = %config.webdriver_url, "starting browser session");
        match Self::start(config, headless, timings, screenshot_dir.clone()).await {
            Ok(browser) => Ok(browser),
            Err(e) if headless => {
                tracing::error!(error = %format!("{:#}", e), "headless session failed, retrying without headless");
                Self::start(config, false, timings, screenshot_dir)
                    .await
                    .map_err(|e| DispatchError::Session(format!("{:#}", e)))
            }
            Err(e) => Err(DispatchError::Session(format!("{:#}", e))),
        }
    }

    async fn start(
        config: &BrowserConfig,
        headless: bool,
        timings: &Timings,
        screenshot_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();

        let resp = client
            .post(format!("{}/session", base_url))
            .json(&capabilities(config, headless))
            .send()
            .await
            .context("new session request failed")?;
        let value = unwrap_response(resp).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .context("new session response has no sessionId")?
            .to_string();

        tracing::info!(session = %session_id, headless, "browser session started");
        Ok(Self {
            client,
            base_url,
            session_id,
            poll_interval: Timings::secs(timings.poll_interval).max(Duration::from_millis(50)),
            screenshot_dir,
        })
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.session_url(path);
        let mut req = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, path))?;
        unwrap_response(resp)
            .await
            .with_context(|| format!("{} {}", method, path))
    }

    async fn find_all(&self, scope: Option<&ElementRef>, selector: &Selector) -> Result<Vec<ElementRef>> {
        let (using, value) = locator_strategy(selector);
        let path = match scope {
            Some(el) => format!("/element/{}/elements", el.0),
            None => "/elements".to_string(),
        };
        let found = self
            .command(Method::POST, &path, Some(json!({ "using": using, "value": value })))
            .await?;
        Ok(found
            .as_array()
            .map(|items| items.iter().filter_map(element_from).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn wait_for_present(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Option<ElementRef>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Element lookups fail transiently while the page is re-rendering
            match self.find_all(None, selector).await {
                Ok(found) => {
                    if let Some(el) = found.into_iter().next() {
                        return Ok(Some(el));
                    }
                }
                Err(e) => tracing::debug!(error = %e, "lookup failed while waiting"),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn query_all(
        &mut self,
        scope: Option<&ElementRef>,
        selector: &Selector,
    ) -> Result<Vec<ElementRef>> {
        self.find_all(scope, selector).await
    }

    async fn get_attribute(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let prop = self
            .command(Method::GET, &format!("/element/{}/property/{}", element.0, name), None)
            .await?;
        if let Some(s) = value_to_string(&prop) {
            return Ok(Some(s));
        }
        let attr = self
            .command(Method::GET, &format!("/element/{}/attribute/{}", element.0, name), None)
            .await?;
        Ok(value_to_string(&attr))
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        self.command(Method::POST, &format!("/element/{}/click", element.0), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> Result<()> {
        self.command(Method::POST, &format!("/element/{}/clear", element.0), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.0),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn send_key(&mut self, sequence: &[Keystroke]) -> Result<()> {
        self.command(Method::POST, "/actions", Some(key_actions(sequence)))
            .await?;
        // Release anything still held
        self.command(Method::DELETE, "/actions", None).await?;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": SCROLL_SCRIPT, "args": [] })),
        )
        .await?;
        Ok(())
    }

    async fn current_location(&mut self) -> Result<String> {
        let url = self.command(Method::GET, "/url", None).await?;
        Ok(url.as_str().unwrap_or_default().to_string())
    }

    async fn capture_debug_artifact(&mut self, tag: &str) -> Result<Option<PathBuf>> {
        let Some(dir) = self.screenshot_dir.clone() else {
            return Ok(None);
        };
        let encoded = self.command(Method::GET, "/screenshot", None).await?;
        let png = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_str().unwrap_or_default())
            .context("failed to decode screenshot base64")?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(artifact_file_name(tag, chrono::Local::now()));
        std::fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "screenshot saved");
        Ok(Some(path))
    }

    async fn close(&mut self) -> Result<()> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .context("delete session request failed")?;
        unwrap_response(resp).await?;
        Ok(())
    }
}

/// Turn a WebDriver HTTP response into its `value`, or an error carrying the
/// driver's error code and message.
async fn unwrap_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    if !status.is_success() {
        let (code, message) = driver_error(&parsed);
        anyhow::bail!("webdriver error ({}): {}: {}", status, code, message);
    }
    Ok(parsed.get("value").cloned().unwrap_or(Value::Null))
}

fn driver_error(body: &Value) -> (String, String) {
    let value = body.get("value");
    let field = |name: &str| {
        value
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    (field("error"), field("message"))
}

fn capabilities(config: &BrowserConfig, headless: bool) -> Value {
    let mut args: Vec<String> = Vec::new();
    let mut exclude: Vec<&str> = Vec::new();
    if headless {
        args.extend(
            [
                "--headless=new",
                "--disable-gpu",
                "--window-size=1920,1080",
                "--disable-dev-shm-usage",
                "--disable-blink-features=AutomationControlled",
            ]
            .map(String::from),
        );
        exclude.push("enable-automation");
    }
    args.extend(
        ["--no-sandbox", "--disable-notifications", "--start-maximized"].map(String::from),
    );
    if headless {
        args.push(format!("user-agent={}", config.user_agent));
    }

    let mut chrome = json!({ "args": args });
    if !exclude.is_empty() {
        chrome["excludeSwitches"] = json!(exclude);
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": chrome,
            }
        }
    })
}

fn locator_strategy(selector: &Selector) -> (&'static str, &str) {
    match selector {
        Selector::Css(s) => ("css selector", s.as_str()),
        Selector::XPath(s) => ("xpath", s.as_str()),
    }
}

fn element_from(value: &Value) -> Option<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Build a single keyboard input source for the actions endpoint.
fn key_actions(sequence: &[Keystroke]) -> Value {
    let mut actions = Vec::new();
    let press = |actions: &mut Vec<Value>, c: char| {
        actions.push(json!({ "type": "keyDown", "value": c.to_string() }));
        actions.push(json!({ "type": "keyUp", "value": c.to_string() }));
    };
    for stroke in sequence {
        match stroke {
            Keystroke::Text(text) => {
                for c in text.chars() {
                    press(&mut actions, c);
                }
            }
            Keystroke::Press(key) => press(&mut actions, key.code()),
            Keystroke::Chord(held, key) => {
                actions.push(json!({ "type": "keyDown", "value": held.code().to_string() }));
                press(&mut actions, key.code());
                actions.push(json!({ "type": "keyUp", "value": held.code().to_string() }));
            }
        }
    }
    json!({
        "actions": [{
            "type": "key",
            "id": "keyboard",
            "actions": actions,
        }]
    })
}

fn artifact_file_name(tag: &str, at: chrono::DateTime<chrono::Local>) -> String {
    let safe: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}.png", safe, at.format("%Y%m%d_%H%M%S"))
}
