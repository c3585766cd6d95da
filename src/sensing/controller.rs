use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineHandle;

use super::{loop_worker::sampling_loop, observer::ForegroundAppObserver};

/// Owns the background sampling task.
pub struct SamplingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SamplingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        observer: Arc<dyn ForegroundAppObserver>,
        engine: EngineHandle,
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampling already active");
        }

        info!(
            "Starting foreground sampling every {}ms (timeout {}ms)",
            interval.as_millis(),
            timeout.as_millis()
        );

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop(
            observer,
            engine,
            interval,
            timeout,
            cancel_token.clone(),
        ));

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
                .context("sampling loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for SamplingController {
    fn default() -> Self {
        Self::new()
    }
}
