use crate::errors::DispatchError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_FILE: &str = ".env";
const PASSWORD_ENV: &str = "X_PASSWORD";
/// Upper bound for any configured wait, delay or pause, in seconds.
const MAX_WAIT_SECS: f64 = 86_400.0;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Message body; newlines become soft line breaks in the composer.
    pub message: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default, rename = "useFollowerstxt")]
    pub use_followers_txt: bool,
    pub x_credentials: Credentials,
    #[serde(default)]
    pub options: DispatchOptions,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub discovery: DiscoveryLimits,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Credentials {
    /// Account whose followers are messaged.
    pub account_name: String,
    /// Login handle.
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchOptions {
    /// Seconds to wait between followers.
    pub dm_interval: u64,
    pub retry_failed: bool,
    pub max_followers_to_process: Option<usize>,
    pub skip_first_n: usize,
    pub take_screenshots: bool,
    #[serde(rename = "useFollowerstxt")]
    pub use_followers_txt: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            dm_interval: 15,
            retry_failed: false,
            max_followers_to_process: None,
            skip_first_n: 0,
            take_screenshots: true,
            use_followers_txt: false,
        }
    }
}

impl DispatchOptions {
    pub fn dm_interval(&self) -> Duration {
        Duration::from_secs(self.dm_interval)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub progress_file: PathBuf,
    pub failure_file: PathBuf,
    pub followers_file: PathBuf,
    pub export_file: PathBuf,
    pub screenshot_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            progress_file: PathBuf::from("messaged_followers.json"),
            failure_file: PathBuf::from("messaged_fail.json"),
            followers_file: PathBuf::from("followers.txt"),
            export_file: PathBuf::from("followers_list.txt"),
            screenshot_dir: PathBuf::from("screenshots"),
            log_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    /// chromedriver (or any W3C WebDriver server) endpoint.
    pub webdriver_url: String,
    pub site_url: String,
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            site_url: "https://x.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl BrowserConfig {
    pub fn site_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }
}

/// Bounded waits and settle delays, in seconds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timings {
    pub page_load_wait: f64,
    pub profile_wait: f64,
    pub element_wait: f64,
    pub input_wait: f64,
    pub login_prompt_wait: f64,
    pub page_settle: f64,
    pub profile_settle: f64,
    pub composer_settle: f64,
    pub scroll_settle: f64,
    pub keystroke_pause: f64,
    pub line_pause: f64,
    pub after_type_settle: f64,
    pub send_settle: f64,
    pub retry_backoff: f64,
    pub poll_interval: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            page_load_wait: 20.0,
            profile_wait: 15.0,
            element_wait: 5.0,
            input_wait: 10.0,
            login_prompt_wait: 5.0,
            page_settle: 5.0,
            profile_settle: 3.0,
            composer_settle: 3.0,
            scroll_settle: 3.0,
            keystroke_pause: 0.5,
            line_pause: 0.2,
            after_type_settle: 2.0,
            send_settle: 5.0,
            retry_backoff: 10.0,
            poll_interval: 0.25,
        }
    }
}

impl Timings {
    /// Every wait and delay set to zero. Used by tests driving fake browsers.
    pub fn immediate() -> Self {
        Self {
            page_load_wait: 0.0,
            profile_wait: 0.0,
            element_wait: 0.0,
            input_wait: 0.0,
            login_prompt_wait: 0.0,
            page_settle: 0.0,
            profile_settle: 0.0,
            composer_settle: 0.0,
            scroll_settle: 0.0,
            keystroke_pause: 0.0,
            line_pause: 0.0,
            after_type_settle: 0.0,
            send_settle: 0.0,
            retry_backoff: 0.0,
            poll_interval: 0.0,
        }
    }

    /// Seconds to a `Duration`, clamped to `0..=MAX_WAIT_SECS`. NaN is zero.
    pub fn secs(value: f64) -> Duration {
        if value.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(value.clamp(0.0, MAX_WAIT_SECS))
    }

    fn named(&self) -> [(&'static str, f64); 15] {
        [
            ("page_load_wait", self.page_load_wait),
            ("profile_wait", self.profile_wait),
            ("element_wait", self.element_wait),
            ("input_wait", self.input_wait),
            ("login_prompt_wait", self.login_prompt_wait),
            ("page_settle", self.page_settle),
            ("profile_settle", self.profile_settle),
            ("composer_settle", self.composer_settle),
            ("scroll_settle", self.scroll_settle),
            ("keystroke_pause", self.keystroke_pause),
            ("line_pause", self.line_pause),
            ("after_type_settle", self.after_type_settle),
            ("send_settle", self.send_settle),
            ("retry_backoff", self.retry_backoff),
            ("poll_interval", self.poll_interval),
        ]
    }

    /// Every timing must be a finite number of seconds in `0..=86400`.
    pub fn validate(&self) -> std::result::Result<(), DispatchError> {
        for (name, value) in self.named() {
            if !value.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&value) {
                return Err(DispatchError::Config(format!(
                    "timings.{} must be between 0 and {} seconds, got {}",
                    name, MAX_WAIT_SECS, value
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DiscoveryLimits {
    pub max_scrolls: u32,
    /// Consecutive scrolls without new usernames before giving up.
    pub max_no_change: u32,
    /// Capture a debug artifact every N scrolls (0 disables).
    pub screenshot_every: u32,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            max_scrolls: 100,
            max_no_change: 5,
            screenshot_every: 10,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config TOML")?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), DispatchError> {
        if self.message.trim().is_empty() {
            return Err(DispatchError::Config("message cannot be empty".to_string()));
        }
        if self.x_credentials.username.trim().is_empty() {
            return Err(DispatchError::Config(
                "x_credentials.username cannot be empty".to_string(),
            ));
        }
        if !self.use_followers_txt() && self.account_name().is_empty() {
            return Err(DispatchError::Config(
                "x_credentials.account_name is required unless useFollowerstxt is set".to_string(),
            ));
        }
        if self.options.dm_interval as f64 > MAX_WAIT_SECS {
            return Err(DispatchError::Config(format!(
                "options.dm_interval must be at most {} seconds",
                MAX_WAIT_SECS
            )));
        }
        self.timings.validate()
    }

    /// Static discovery may be switched on at the top level or under `[options]`.
    pub fn use_followers_txt(&self) -> bool {
        self.use_followers_txt || self.options.use_followers_txt
    }

    pub fn account_name(&self) -> &str {
        self.x_credentials.account_name.trim().trim_start_matches('@')
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    /// Password from the config file, then `X_PASSWORD`, then an interactive prompt.
    /// Prompted values are saved to .env for future runs.
    pub fn password(&self) -> Result<String> {
        if let Some(pw) = self.x_credentials.password.as_deref() {
            if !pw.is_empty() {
                return Ok(pw.to_string());
            }
        }
        match std::env::var(PASSWORD_ENV) {
            Ok(pw) if !pw.is_empty() => Ok(sanitize_secret(&pw)),
            _ => {
                let pw = prompt(&format!("Password for @{}", self.x_credentials.username))?;
                save_env_var(PASSWORD_ENV, &pw);
                Ok(pw)
            }
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("  {} > ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let value = input.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{} cannot be empty", label);
    }
    Ok(value)
}

/// Strip carriage returns, BOM, and other invisible chars from a secret value.
fn sanitize_secret(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}

/// Set KEY in the current process and remember it in .env for the next run.
fn save_env_var(key: &str, value: &str) {
    std::env::set_var(key, value);
    let path = Path::new(ENV_FILE);
    if let Err(e) = append_env_line(path, key, value) {
        tracing::warn!(
            key,
            path = %path.display(),
            error = %e,
            "could not save to .env, it will be asked for again next run"
        );
    }
}

fn append_env_line(path: &Path, key: &str, value: &str) -> io::Result<()> {
    let mut contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&format!("{}={}\n", key, value));
    std::fs::write(path, contents)
}
