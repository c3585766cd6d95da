use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::EngineHandle;

use super::observer::ForegroundAppObserver;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Polls the observer and forwards every answer to the engine.
///
/// Samples are delivered even while no mission is running so the engine
/// always knows what is in front when a mission starts. A sample that times
/// out or whose worker panics counts as "unknown". At most one observer call
/// runs at a time: while a call is stuck, later ticks wait on it again
/// instead of starting another.
pub async fn sampling_loop(
    observer: Arc<dyn ForegroundAppObserver>,
    engine: EngineHandle,
    interval: Duration,
    timeout: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut in_flight: Option<JoinHandle<Option<String>>> = None;
    let mut unavailable_streak: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = take_sample(&observer, &mut in_flight, timeout).await;

                match &sample {
                    Some(_) if unavailable_streak > 0 => {
                        log_info!("foreground observer back after {unavailable_streak} empty samples");
                        unavailable_streak = 0;
                    }
                    Some(_) => {}
                    None => {
                        unavailable_streak = unavailable_streak.saturating_add(1);
                        if unavailable_streak == 1 {
                            log_debug!("foreground app unknown");
                        }
                    }
                }

                if engine.foreground_sample(sample).await.is_err() {
                    log_info!("engine stopped, sampling loop exiting");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break;
            }
        }
    }
}

async fn take_sample(
    observer: &Arc<dyn ForegroundAppObserver>,
    in_flight: &mut Option<JoinHandle<Option<String>>>,
    timeout: Duration,
) -> Option<String> {
    let mut worker = match in_flight.take() {
        Some(worker) => worker,
        None => {
            let observer = Arc::clone(observer);
            tokio::task::spawn_blocking(move || observer.sample())
        }
    };

    match tokio::time::timeout(timeout, &mut worker).await {
        Ok(Ok(sample)) => sample.filter(|package| !package.is_empty()),
        Ok(Err(err)) => {
            log_warn!("foreground sample worker failed: {err}");
            None
        }
        Err(_) => {
            log_warn!("foreground sample timed out (> {}ms)", timeout.as_millis());
            *in_flight = Some(worker);
            None
        }
    }
}
