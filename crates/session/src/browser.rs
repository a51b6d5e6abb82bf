//! Opening the authorization URL in a local browser

use std::process::{Command, Stdio};

/// Launches a browser at a URL.
///
/// Failure is not fatal: the manager falls back to printing the URL so the
/// operator can open it by hand.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), String>;
}

/// Uses the platform's URL opener (`open`, `xdg-open`, or `start`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        let mut command = opener_command(url)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| format!("launching browser: {e}"))
    }
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Result<Command, String> {
    let mut command = Command::new("open");
    command.arg(url);
    Ok(command)
}

#[cfg(target_os = "windows")]
fn opener_command(url: &str) -> Result<Command, String> {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]).arg(url);
    Ok(command)
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(url: &str) -> Result<Command, String> {
    if std::env::var_os("DISPLAY").is_none() && std::env::var_os("WAYLAND_DISPLAY").is_none() {
        return Err("no graphical session (DISPLAY and WAYLAND_DISPLAY unset)".into());
    }
    let mut command = Command::new("xdg-open");
    command.arg(url);
    Ok(command)
}

/// Never opens anything; for headless deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> Result<(), String> {
        Err("browser launching is disabled".into())
    }
}
