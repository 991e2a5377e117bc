use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expired_otp_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::rate_limit_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Purge expired OTP codes (every `otp.cleanup_interval` seconds)
    async fn expired_otp_cleanup_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.otp.cleanup_interval.max(1);
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;

            match tasks::purge_expired_otps(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Purged {} expired OTP codes", count);
                    } else {
                        debug!("OTP cleanup: nothing expired");
                    }
                }
                Err(e) => error!("Failed to purge expired OTP codes: {}", e),
            }
        }
    }

    /// Drop recovered per-address OTP limiter state (once per OTP window)
    async fn rate_limit_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(scheduler.context.rate_limiter.otp_window());

        loop {
            interval.tick().await;

            let tracked = tasks::prune_rate_limits(&scheduler.context);
            debug!("Rate limiter cleanup: {} addresses still tracked", tracked);
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
