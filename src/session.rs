//! Logging the browser session into the operating account.

use crate::browser::{capture, Browser, Key, Selector};
use crate::config::{Config, Timings};
use crate::delivery::controls::PAGE_READY;
use crate::errors::{DispatchError, Result};

const USERNAME_INPUT: &str = "input[autocomplete='username']";
/// Shown when the site wants the handle re-entered before the password.
const VERIFY_USERNAME_INPUT: &str = "input[data-testid='ocfEnterTextTextInput']";
const PASSWORD_INPUT: &str = "input[autocomplete='current-password']";

/// Log in with the configured credentials. A failure captures a debug artifact
/// (when enabled) and is fatal for the run.
pub async fn login<B: Browser + ?Sized>(browser: &mut B, config: &Config, password: &str) -> Result<()> {
    let username = config.x_credentials.username.as_str();
    tracing::info!(username, "logging in");
    match attempt_login(browser, config, username, password).await {
        Ok(()) => {
            tracing::info!(username, "login successful");
            Ok(())
        }
        Err(reason) => {
            tracing::error!(username, %reason, "login failed");
            if config.options.take_screenshots {
                capture(browser, "login_error").await;
            }
            Err(DispatchError::Login(reason))
        }
    }
}

async fn attempt_login<B: Browser + ?Sized>(
    browser: &mut B,
    config: &Config,
    username: &str,
    password: &str,
) -> std::result::Result<(), String> {
    let t = &config.timings;
    let enter = Key::Enter.code().to_string();
    let err = |e: anyhow::Error| format!("{:#}", e);

    browser
        .navigate(&format!("{}/login", config.browser.site_url()))
        .await
        .map_err(err)?;

    let user_input = browser
        .wait_for_present(&Selector::css(USERNAME_INPUT), Timings::secs(t.page_load_wait))
        .await
        .map_err(err)?
        .ok_or("username field did not appear")?;
    browser.type_text(&user_input, username).await.map_err(err)?;
    browser.type_text(&user_input, &enter).await.map_err(err)?;
    tracing::info!("username submitted");

    match browser
        .wait_for_present(&Selector::css(VERIFY_USERNAME_INPUT), Timings::secs(t.login_prompt_wait))
        .await
    {
        Ok(Some(verify)) => {
            browser.type_text(&verify, username).await.map_err(err)?;
            browser.type_text(&verify, &enter).await.map_err(err)?;
            tracing::info!("additional username verification completed");
        }
        Ok(None) => tracing::info!("no additional username verification required"),
        Err(e) => tracing::debug!(error = %e, "verification prompt check failed"),
    }

    let pw_input = browser
        .wait_for_present(&Selector::css(PASSWORD_INPUT), Timings::secs(t.input_wait))
        .await
        .map_err(err)?
        .ok_or("password field did not appear")?;
    browser.type_text(&pw_input, password).await.map_err(err)?;
    browser.type_text(&pw_input, &enter).await.map_err(err)?;

    browser
        .wait_for_present(&Selector::css(PAGE_READY), Timings::secs(t.page_load_wait))
        .await
        .map_err(err)?
        .ok_or("home timeline did not load after password")?;
    Ok(())
}
