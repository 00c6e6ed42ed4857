//! Where the profile page and DM composer keep their controls, most stable signal first.

use crate::browser::Locator;

/// Present once a profile (or any timeline page) has rendered.
pub const PAGE_READY: &str = "[data-testid='primaryColumn']";

pub const COMPOSE_CONTROL: &[Locator] = &[
    Locator::StructuralId("button[data-testid='sendDMFromProfile']"),
    Locator::AccessibleLabel("button[aria-label*='Message']"),
    Locator::ContentMatch {
        candidates: "button, div[role='button']",
        needle: "message",
    },
    Locator::GenericScan {
        scope: Some("div[data-testid='userActions']"),
        candidates: "div[role='button']",
    },
];

pub const MESSAGE_INPUT: &[Locator] = &[
    Locator::StructuralId("div[data-testid='dmComposerTextInput']"),
    Locator::AccessibleLabel("div[role='textbox'][contenteditable='true']"),
    Locator::GenericScan {
        scope: None,
        candidates: "div[contenteditable='true']",
    },
];

pub const SEND_CONTROL: &[Locator] = &[
    Locator::StructuralId("button[data-testid='dmComposerSendButton']"),
    Locator::AccessibleLabel("button[aria-label='Send']"),
    // Send is an icon-only button tinted with the brand blue
    Locator::GenericScan {
        scope: None,
        candidates: "button svg[style*='rgb(29, 155, 240)']",
    },
];
