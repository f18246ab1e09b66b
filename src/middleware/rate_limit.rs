use crate::utils::helpers::ApiResponse;
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::{StatusCode, header},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use lazy_static::lazy_static;
use std::{
    collections::{HashMap, VecDeque},
    net::IpAddr,
    rc::Rc,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRule {
    pub prefix: String,
    pub limit: usize,
    pub window: Duration,
}

impl RateRule {
    pub fn new(prefix: &str, limit: usize, window_secs: u64) -> Self {
        Self {
            prefix: prefix.to_string(),
            limit,
            window: Duration::from_secs(window_secs),
        }
    }
}

lazy_static! {
    /// Every rule whose prefix matches a path applies, so `/api/v1/` caps
    /// all traffic on top of the narrower rules.
    pub static ref DEFAULT_RULES: Vec<RateRule> = vec![
        RateRule::new("/api/v1/payments/", 100, 60),
        RateRule::new("/api/v1/auth/", 20, 60),
        RateRule::new("/api/v1/payment-links/public/", 60, 60),
        RateRule::new("/api/v1/admin/", 300, 60),
        RateRule::new("/api/v1/", 1000, 60),
    ];
}

#[derive(Debug, Default)]
struct Windows {
    hits: HashMap<(IpAddr, usize), VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

/// Sliding-window counters keyed by client address and rule.
#[derive(Debug)]
pub struct RateLimitState {
    rules: Vec<RateRule>,
    /// Longest rule window; drained entries are swept at most this often.
    sweep_every: Duration,
    windows: Mutex<Windows>,
}

impl RateLimitState {
    pub fn new(rules: Vec<RateRule>) -> Self {
        let sweep_every = rules.iter().map(|rule| rule.window).max().unwrap_or_default();
        Self {
            rules,
            sweep_every,
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn with_default_rules() -> Self {
        Self::new(DEFAULT_RULES.clone())
    }

    /// Records a hit against every rule matching `path`. `Err` carries the
    /// seconds until the most constrained window has room again.
    pub fn check(&self, ip: IpAddr, path: &str, now: Instant) -> Result<(), u64> {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.sweep(&mut windows, now);

        let mut retry_after: Option<u64> = None;
        for (idx, rule) in self.rules.iter().enumerate() {
            if !path.starts_with(&rule.prefix) {
                continue;
            }

            let window = windows.hits.entry((ip, idx)).or_default();
            drain_expired(window, rule.window, now);

            let over = window.len() >= rule.limit;
            window.push_back(now);
            if over {
                let wait = window
                    .front()
                    .map(|first| ceil_secs(rule.window.saturating_sub(now.duration_since(*first))))
                    .unwrap_or(1);
                retry_after = Some(retry_after.map_or(wait, |current| current.max(wait)));
            }
        }

        match retry_after {
            Some(wait) => Err(wait),
            None => Ok(()),
        }
    }

    /// Number of client/rule windows currently held.
    pub fn tracked_windows(&self) -> usize {
        match self.windows.lock() {
            Ok(guard) => guard.hits.len(),
            Err(poisoned) => poisoned.into_inner().hits.len(),
        }
    }

    fn sweep(&self, windows: &mut Windows, now: Instant) {
        let due = windows
            .last_sweep
            .is_none_or(|last| now.duration_since(last) >= self.sweep_every);
        if !due {
            return;
        }

        let rules = &self.rules;
        windows.hits.retain(|(_, idx), hits| {
            if let Some(rule) = rules.get(*idx) {
                drain_expired(hits, rule.window, now);
            }
            !hits.is_empty()
        });
        windows.last_sweep = Some(now);
    }
}

fn drain_expired(hits: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while hits
        .front()
        .is_some_and(|first| now.duration_since(*first) >= window)
    {
        hits.pop_front();
    }
}

fn ceil_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

/// Middleware factory; clones share one [`RateLimitState`].
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<RateLimitState>,
}

impl RateLimiter {
    pub fn new(state: Arc<RateLimitState>) -> Self {
        Self { state }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimiterMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimiterMiddleware {
            service: Rc::new(service),
            state: self.state.clone(),
        }))
    }
}

pub struct RateLimiterMiddleware<S> {
    service: Rc<S>,
    state: Arc<RateLimitState>,
}

impl<S, B> Service<ServiceRequest> for RateLimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verdict = match req.peer_addr() {
            Some(addr) => self.state.check(addr.ip(), req.path(), Instant::now()),
            None => Ok(()),
        };

        if let Err(retry_after) = verdict {
            warn!("Rate limit exceeded for {:?} on {}", req.peer_addr(), req.path());
            let response = HttpResponse::build(StatusCode::TOO_MANY_REQUESTS)
                .insert_header((header::RETRY_AFTER, retry_after.to_string()))
                .json(ApiResponse::<()>::error("Rate limit exceeded".to_string()));
            return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
        }

        let service = self.service.clone();
        Box::pin(async move {
            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "192.0.2.10".parse().unwrap()
    }

    #[test]
    fn narrow_rule_limits_its_prefix() {
        let state = RateLimitState::new(vec![RateRule::new("/api/v1/auth/", 2, 60), RateRule::new("/api/v1/", 5, 60)]);
        let now = Instant::now();
        assert!(state.check(ip(), "/api/v1/auth/login/access-token", now).is_ok());
        assert!(state.check(ip(), "/api/v1/auth/login/access-token", now).is_ok());
        assert_eq!(state.check(ip(), "/api/v1/auth/login/access-token", now), Err(60));
        assert!(state.check(ip(), "/", now).is_ok());
    }

    #[test]
    fn overall_rule_counts_every_prefix() {
        let state = RateLimitState::new(vec![
            RateRule::new("/api/v1/payments/", 100, 60),
            RateRule::new("/api/v1/", 3, 60),
        ]);
        let now = Instant::now();
        let admitted = (0..10)
            .filter(|_| state.check(ip(), "/api/v1/payments/request", now).is_ok())
            .count();
        assert_eq!(admitted, 3);
        // The overall budget is spent, other prefixes are refused too.
        assert_eq!(state.check(ip(), "/api/v1/reports/payments", now), Err(60));
    }

    #[test]
    fn drained_windows_are_dropped() {
        let state = RateLimitState::new(vec![RateRule::new("/api/v1/", 5, 10)]);
        let start = Instant::now();
        for last_octet in 1..=50u8 {
            let client = IpAddr::from([198, 51, 100, last_octet]);
            assert!(state.check(client, "/api/v1/x", start).is_ok());
        }
        assert_eq!(state.tracked_windows(), 50);

        assert!(state.check(ip(), "/api/v1/x", start + Duration::from_secs(11)).is_ok());
        assert_eq!(state.tracked_windows(), 1);
    }

    #[test]
    fn window_slides() {
        let state = RateLimitState::new(vec![RateRule::new("/api/v1/", 1, 10)]);
        let start = Instant::now();
        assert!(state.check(ip(), "/api/v1/x", start).is_ok());
        assert_eq!(state.check(ip(), "/api/v1/x", start + Duration::from_secs(4)), Err(6));
        // The rejected hit also counts, so the window reopens ten seconds after it.
        assert!(state.check(ip(), "/api/v1/x", start + Duration::from_secs(11)).is_err());
        assert!(state.check(ip(), "/api/v1/x", start + Duration::from_secs(30)).is_ok());
    }

    #[test]
    fn clients_are_counted_separately() {
        let state = RateLimitState::new(vec![RateRule::new("/api/v1/", 1, 60)]);
        let now = Instant::now();
        assert!(state.check(ip(), "/api/v1/x", now).is_ok());
        assert!(state.check("192.0.2.11".parse().unwrap(), "/api/v1/x", now).is_ok());
        assert!(state.check(ip(), "/api/v1/x", now).is_err());
    }
}
