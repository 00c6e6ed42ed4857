//! Per-follower DM workflow.
//!
//! `Init → ProfileLoaded → ComposerOpen → TextEntered → SendAttempted`, ending in
//! `Confirmed`, `Unconfirmed` or `Failed`. Every control is found through an
//! ordered list of locator strategies. Nothing escapes `deliver`: browser errors
//! at any stage become `Failed`.

pub mod controls;
pub mod verify;

use crate::browser::{
    capture, resolve, resolve_and_click, soft_break, Browser, ElementRef, Key, Keystroke, Selector,
};
use crate::config::{Config, Timings};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use verify::SendEvidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    Init,
    ProfileLoaded,
    ComposerOpen,
    TextEntered,
    SendAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ProfileTimeout,
    ComposerNotFound,
    InputNotFound,
    TextNotEntered,
    SendNotFound,
    Browser(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ProfileTimeout => write!(f, "profile did not load"),
            FailureReason::ComposerNotFound => write!(f, "message button not found"),
            FailureReason::InputNotFound => write!(f, "message input not found"),
            FailureReason::TextNotEntered => write!(f, "message text could not be entered"),
            FailureReason::SendNotFound => write!(f, "send control not found"),
            FailureReason::Browser(e) => write!(f, "browser error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent text seen, or another positive signal after sending.
    Confirmed,
    /// Send control activated but no signal came back. Counted as delivered.
    Unconfirmed,
    Failed {
        stage: DeliveryStage,
        reason: FailureReason,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, DeliveryOutcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Confirmed => "confirmed",
            DeliveryOutcome::Unconfirmed => "unconfirmed",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }
}

/// One delivery attempt to one follower.
#[async_trait]
pub trait Deliver: Send {
    async fn deliver(&mut self, username: &str) -> DeliveryOutcome;
}

/// Drives the real browser through the DM workflow.
pub struct Courier<'a, B: Browser + ?Sized> {
    browser: &'a mut B,
    site_url: &'a str,
    message: &'a str,
    timings: &'a Timings,
    screenshots: bool,
}

impl<'a, B: Browser + ?Sized> Courier<'a, B> {
    pub fn new(browser: &'a mut B, config: &'a Config) -> Self {
        Self {
            browser,
            site_url: config.browser.site_url(),
            message: &config.message,
            timings: &config.timings,
            screenshots: config.options.take_screenshots,
        }
    }

    async fn snapshot(&mut self, tag: &str) {
        if self.screenshots {
            capture(&mut *self.browser, tag).await;
        }
    }

    async fn attempt(&mut self, username: &str, stage: &mut DeliveryStage) -> Result<DeliveryOutcome> {
        let failed = |stage: DeliveryStage, reason: FailureReason| DeliveryOutcome::Failed { stage, reason };

        // Init → ProfileLoaded
        let url = format!("{}/{}", self.site_url, username);
        let profile_wait = Timings::secs(self.timings.profile_wait);
        self.browser.navigate(&url).await?;
        let ready = self
            .browser
            .wait_for_present(&Selector::css(controls::PAGE_READY), profile_wait)
            .await?;
        if ready.is_none() {
            return Ok(failed(*stage, FailureReason::ProfileTimeout));
        }
        pause(self.timings.profile_settle).await;
        self.snapshot(&format!("profile_{}", username)).await;
        *stage = DeliveryStage::ProfileLoaded;

        // ProfileLoaded → ComposerOpen
        let element_wait = Timings::secs(self.timings.element_wait);
        let Some(how) = resolve_and_click(&mut *self.browser, controls::COMPOSE_CONTROL, element_wait).await else {
            return Ok(failed(*stage, FailureReason::ComposerNotFound));
        };
        tracing::info!(username, strategy = how.kind(), "opened message composer");
        pause(self.timings.composer_settle).await;
        *stage = DeliveryStage::ComposerOpen;

        // ComposerOpen → TextEntered
        let input_wait = Timings::secs(self.timings.input_wait);
        let Some((input, how)) = resolve(&mut *self.browser, controls::MESSAGE_INPUT, input_wait).await else {
            return Ok(failed(*stage, FailureReason::InputNotFound));
        };
        tracing::info!(username, strategy = how.kind(), "found message input");
        if !self.enter_text(&input).await {
            return Ok(failed(*stage, FailureReason::TextNotEntered));
        }
        self.snapshot(&format!("after_type_{}", username)).await;
        pause(self.timings.after_type_settle).await;
        *stage = DeliveryStage::TextEntered;

        // TextEntered → SendAttempted
        let send_activated = match resolve_and_click(&mut *self.browser, controls::SEND_CONTROL, element_wait).await {
            Some(how) => {
                tracing::info!(username, strategy = how.kind(), "clicked send");
                true
            }
            None => self.submit_with_enter(&input).await,
        };
        if !send_activated {
            return Ok(failed(*stage, FailureReason::SendNotFound));
        }
        *stage = DeliveryStage::SendAttempted;
        self.snapshot(&format!("after_send_{}", username)).await;
        pause(self.timings.send_settle).await;

        let evidence = self.find_evidence(&input).await;
        if let Some(evidence) = evidence {
            tracing::info!(username, ?evidence, "send verified");
        }
        Ok(verify::classify(evidence, send_activated))
    }

    /// Type the message line by line; fall back to a raw keystroke sequence if
    /// the field is still empty afterwards.
    async fn enter_text(&mut self, input: &ElementRef) -> bool {
        if let Err(e) = self.type_lines(input).await {
            tracing::warn!(error = %format!("{:#}", e), "typing into message input failed");
        }
        if self.has_text(input).await {
            return true;
        }

        tracing::warn!("message input still empty, retrying with keystroke sequence");
        let sequence = verify::keystroke_sequence(self.message);
        let typed = async {
            self.browser.click(input).await?;
            self.browser.send_key(&sequence).await
        }
        .await;
        if let Err(e) = typed {
            tracing::warn!(error = %format!("{:#}", e), "keystroke sequence failed");
        }
        self.has_text(input).await
    }

    async fn type_lines(&mut self, input: &ElementRef) -> Result<()> {
        self.browser.click(input).await?;
        pause(self.timings.keystroke_pause).await;
        self.browser.clear(input).await?;
        pause(self.timings.keystroke_pause).await;
        self.browser.click(input).await?;

        let lines = verify::message_lines(self.message);
        let line_break = soft_break();
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                self.browser.type_text(input, &line_break).await?;
            }
            if !line.is_empty() {
                self.browser.type_text(input, line).await?;
            }
            pause(self.timings.line_pause).await;
        }
        Ok(())
    }

    async fn has_text(&mut self, input: &ElementRef) -> bool {
        match self.browser.get_attribute(input, "textContent").await {
            Ok(Some(text)) => !text.trim().is_empty(),
            Ok(None) => false,
            Err(e) => {
                tracing::debug!(error = %e, "could not read message input");
                false
            }
        }
    }

    /// Last resort when no send control can be found: Enter in the input.
    async fn submit_with_enter(&mut self, input: &ElementRef) -> bool {
        let sent = async {
            self.browser.click(input).await?;
            pause(self.timings.keystroke_pause).await;
            self.browser.send_key(&[Keystroke::Press(Key::Enter)]).await
        }
        .await;
        match sent {
            Ok(()) => {
                tracing::info!("no send control found, submitted with Enter");
                true
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "submitting with Enter failed");
                false
            }
        }
    }

    async fn find_evidence(&mut self, input: &ElementRef) -> Option<SendEvidence> {
        let snippet = verify::fingerprint(self.message);
        if !snippet.is_empty() {
            match self
                .browser
                .query_all(None, &Selector::xpath(verify::echo_xpath(&snippet)))
                .await
            {
                Ok(found) if !found.is_empty() => return Some(SendEvidence::EchoInConversation),
                Ok(_) => tracing::info!(%snippet, "message not found in conversation"),
                Err(e) => tracing::warn!(error = %e, "error checking conversation for message"),
            }
        }

        match self.browser.get_attribute(input, "innerHTML").await {
            Ok(html) if verify::input_looks_empty(html.as_deref()) => {
                return Some(SendEvidence::InputCleared);
            }
            Ok(_) => tracing::info!("message input still has content"),
            Err(e) => tracing::warn!(error = %e, "error checking input content"),
        }

        match self.browser.current_location().await {
            Ok(url) if verify::is_messages_location(&url) => Some(SendEvidence::MessagesLocation),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "error reading current location");
                None
            }
        }
    }
}

async fn pause(secs: f64) {
    tokio::time::sleep(Timings::secs(secs)).await;
}

#[async_trait]
impl<B: Browser + ?Sized> Deliver for Courier<'_, B> {
    async fn deliver(&mut self, username: &str) -> DeliveryOutcome {
        tracing::info!(username, "sending DM");
        let mut stage = DeliveryStage::Init;
        let outcome = match self.attempt(username, &mut stage).await {
            Ok(outcome) => outcome,
            Err(e) => DeliveryOutcome::Failed {
                stage,
                reason: FailureReason::Browser(format!("{:#}", e)),
            },
        };

        match &outcome {
            DeliveryOutcome::Confirmed => tracing::info!(username, "DM confirmed sent"),
            DeliveryOutcome::Unconfirmed => {
                tracing::warn!(username, "send clicked but delivery could not be verified")
            }
            DeliveryOutcome::Failed { stage, reason } => {
                tracing::error!(username, ?stage, %reason, "DM failed");
                self.snapshot(&format!("dm_error_{}", username)).await;
            }
        }
        outcome
    }
}
