use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::SpotEngine;

use super::loop_worker::auto_check_loop;

/// Owns the background auto-check task, if one is running.
#[derive(Default)]
pub struct AutoCheckController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl AutoCheckController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, engine: SpotEngine, period: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("auto-check already running");
        }
        if period.is_zero() {
            bail!("auto-check period must be positive");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(auto_check_loop(engine, period, cancel_token.clone()));

        info!("Auto-check started, every {:?}", period);
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("auto-check task failed to join")?;
            info!("Auto-check stopped");
        }
        Ok(())
    }
}
