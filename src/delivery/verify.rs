//! Post-send verification and outcome classification.

use super::{DeliveryOutcome, DeliveryStage, FailureReason};
use crate::browser::{Key, Keystroke};

/// Words of the message used to spot it in the conversation view.
const FINGERPRINT_WORDS: usize = 3;

/// The signal that confirmed a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendEvidence {
    /// Message text visible in the conversation.
    EchoInConversation,
    /// Composer emptied itself.
    InputCleared,
    /// Browser ended up on a messages route.
    MessagesLocation,
}

pub fn fingerprint(message: &str) -> String {
    message
        .split_whitespace()
        .take(FINGERPRINT_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote arbitrary text as an XPath string literal.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// XPath matching a div whose own text contains `snippet`.
pub fn echo_xpath(snippet: &str) -> String {
    format!("//div[contains(text(), {})]", xpath_literal(snippet))
}

/// An empty contenteditable often still holds a lone `<br>`.
pub fn input_looks_empty(inner_html: Option<&str>) -> bool {
    match inner_html.map(str::trim) {
        None => true,
        Some(html) => html.is_empty() || html.eq_ignore_ascii_case("<br>"),
    }
}

pub fn is_messages_location(url: &str) -> bool {
    url.contains("messages")
}

/// Lines of the message, in order. A trailing newline does not add a line.
pub fn message_lines(message: &str) -> Vec<&str> {
    message.lines().collect()
}

/// The keystroke form of the message: each line typed, soft breaks between.
pub fn keystroke_sequence(message: &str) -> Vec<Keystroke> {
    let mut seq = Vec::new();
    for (i, line) in message_lines(message).into_iter().enumerate() {
        if i > 0 {
            seq.push(Keystroke::Chord(Key::Shift, Key::Enter));
        }
        if !line.is_empty() {
            seq.push(Keystroke::Text(line.to_string()));
        }
    }
    seq
}

/// Final verdict once the send step has run.
///
/// Any evidence confirms. No evidence after the send control was activated is
/// optimistically `Unconfirmed`; nothing activated is a failure.
pub fn classify(evidence: Option<SendEvidence>, send_activated: bool) -> DeliveryOutcome {
    match (evidence, send_activated) {
        (Some(_), _) => DeliveryOutcome::Confirmed,
        (None, true) => DeliveryOutcome::Unconfirmed,
        (None, false) => DeliveryOutcome::Failed {
            stage: DeliveryStage::SendAttempted,
            reason: FailureReason::SendNotFound,
        },
    }
}
