use crate::services::VerificationService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The periodic verification jobs: retention sweep and result auto-poll.
pub struct BackgroundJobs {
    shutdown_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundJobs {
    pub fn start(
        service: Arc<VerificationService>,
        sweep_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        let shutdown_token = CancellationToken::new();

        tracing::info!(
            sweep_interval_secs = sweep_interval.as_secs(),
            poll_interval_secs = poll_interval.as_secs(),
            "Starting verification background jobs"
        );

        let sweeper = {
            let service = service.clone();
            spawn_periodic("session_sweep", sweep_interval, shutdown_token.clone(), move || {
                let service = service.clone();
                async move {
                    service.sweep(Utc::now());
                }
            })
        };

        let poller = spawn_periodic("result_poll", poll_interval, shutdown_token.clone(), move || {
            let service = service.clone();
            async move {
                service.poll_pending(Utc::now()).await;
            }
        });

        Self {
            shutdown_token,
            handles: vec![sweeper, poller],
        }
    }

    /// Cancel both jobs and wait for the current tick to finish.
    pub async fn shutdown(self) {
        tracing::info!("Stopping verification background jobs");
        self.shutdown_token.cancel();

        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background job ended abnormally");
            }
        }
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(job = name, "Background job shutting down");
                    break;
                }
                _ = interval.tick() => {
                    // A panicking tick must not end the job
                    let run = tokio::spawn(tick());
                    if let Err(e) = run.await {
                        tracing::error!(job = name, error = %e, "Background job tick panicked");
                    }
                }
            }
        }
    })
}
