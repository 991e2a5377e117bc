/// Rate Limiting System
///
/// A global limiter in front of every route, and a per-client-address
/// limiter guarding OTP sends.
use crate::{
    api::middleware::client_address,
    config::RateLimitConfig,
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;
type KeyedLimiter = GovernorLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    global: Arc<DirectLimiter>,
    otp: Arc<KeyedLimiter>,
    otp_window: Duration,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let default_rps = NonZeroU32::MIN.saturating_add(49);
        let global_quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(default_rps),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(default_rps));

        let otp_window = Duration::from_secs(config.otp_window.max(1));
        // One send per window; with_period only fails for a zero duration
        let otp_quota = Quota::with_period(otp_window).unwrap_or(global_quota);

        Self {
            enabled: config.enabled,
            global: Arc::new(GovernorLimiter::direct(global_quota)),
            otp: Arc::new(GovernorLimiter::keyed(otp_quota)),
            otp_window,
            clock: DefaultClock::default(),
        }
    }

    /// Check the global limit
    pub fn check_global(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        self.global
            .check()
            .map_err(|not_until| AppError::RateLimitExceeded {
                retry_after: not_until.wait_time_from(self.clock.now()),
            })
    }

    /// Check the OTP send limit for one client address
    pub fn check_otp(&self, address: IpAddr) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        self.otp
            .check_key(&address)
            .map_err(|not_until| AppError::RateLimitExceeded {
                retry_after: not_until.wait_time_from(self.clock.now()),
            })
    }

    pub fn otp_window(&self) -> Duration {
        self.otp_window
    }

    /// Forget addresses whose OTP allowance has fully recovered.
    /// Returns how many addresses are still tracked.
    pub fn retain_recent(&self) -> usize {
        self.otp.retain_recent();
        self.otp.shrink_to_fit();
        self.otp.len()
    }

    pub fn tracked_addresses(&self) -> usize {
        self.otp.len()
    }
}

/// Global rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    ctx.rate_limiter.check_global()?;
    Ok(next.run(request).await)
}

/// Per-address limit on `/otp/send-otp`
pub async fn otp_rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    match client_address(
        request.headers(),
        peer,
        &ctx.config.rate_limit.trusted_proxies,
    ) {
        Some(address) => ctx.rate_limiter.check_otp(address).map_err(|e| {
            tracing::warn!("OTP send rate limited for {}", address);
            e
        })?,
        None => tracing::debug!("No client address, skipping OTP rate limit"),
    }

    Ok(next.run(request).await)
}
