//! Process-wide system mode.
//!
//! Anything other than `Normal` short-circuits every turn with a fixed
//! advisory. The current mode lives in a `watch` channel so readers never
//! block writers and subscribers see every change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemMode {
    #[default]
    Normal,
    Lockdown,
    Extracted,
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemMode::Normal => "NORMAL",
            SystemMode::Lockdown => "LOCKDOWN",
            SystemMode::Extracted => "EXTRACTED",
        };
        f.write_str(s)
    }
}

impl FromStr for SystemMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(SystemMode::Normal),
            "lockdown" => Ok(SystemMode::Lockdown),
            "extracted" => Ok(SystemMode::Extracted),
            other => anyhow::bail!("unknown system mode: {}", other),
        }
    }
}

#[derive(Debug)]
pub struct ModeGate {
    tx: watch::Sender<SystemMode>,
}

impl ModeGate {
    pub fn new(initial: SystemMode) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> SystemMode {
        *self.tx.borrow()
    }

    pub fn set(&self, mode: SystemMode) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == mode {
                false
            } else {
                *current = mode;
                true
            }
        });
        if changed {
            tracing::info!("System mode changed to {}", mode);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SystemMode> {
        self.tx.subscribe()
    }

    /// Run `callback` on every subsequent mode change until the gate is dropped.
    pub fn on_change<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(SystemMode) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let mode = *rx.borrow_and_update();
                callback(mode);
            }
        })
    }
}

impl Default for ModeGate {
    fn default() -> Self {
        Self::new(SystemMode::Normal)
    }
}
