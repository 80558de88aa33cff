use crate::config::{path_is_exempt, LimiterConfig, DEFAULT_EXEMPT_PATHS};
use crate::error::LimitError;
use crate::rate_limit::RateLimiter;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// `detail` message of the 429 JSON body.
pub const DENIED_DETAIL: &str = "Rate limit exceeded. Please try again later.";

/// Authenticated caller, inserted as a request extension by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity: String,
    /// Administrator identities get the privileged multiplier.
    pub privileged: bool,
}

impl Caller {
    pub fn new(identity: impl Into<String>, privileged: bool) -> Self {
        Self { identity: identity.into(), privileged }
    }
}

/// A layer that enforces rate limits using a [`RateLimiter`].
#[derive(Debug)]
pub struct RateLimitLayer<L> {
    limiter: Arc<L>,
    enabled: bool,
    exempt_paths: Arc<[String]>,
}

impl<L> Clone for RateLimitLayer<L> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            enabled: self.enabled,
            exempt_paths: self.exempt_paths.clone(),
        }
    }
}

impl<L> RateLimitLayer<L> {
    /// Create a new rate limit layer with the default exempt paths.
    pub fn new(limiter: L) -> Self {
        Self {
            limiter: Arc::new(limiter),
            enabled: true,
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(|p| (*p).to_owned()).collect(),
        }
    }

    /// Enable switch and exempt paths taken from `config`.
    pub fn from_config(limiter: L, config: &LimiterConfig) -> Self {
        Self::new(limiter).enabled(config.enabled()).exempt_paths(config.exempt_paths().to_vec())
    }

    /// When disabled the layer passes every request straight through.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Exact request paths that bypass limiting without consuming quota.
    pub fn exempt_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.exempt_paths = paths.into_iter().map(Into::into).collect();
        self
    }
}

impl<S, L> Layer<S> for RateLimitLayer<L>
where
    L: RateLimiter + 'static,
{
    type Service = RateLimitService<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            enabled: self.enabled,
            exempt_paths: self.exempt_paths.clone(),
        }
    }
}

/// Middleware service that enforces rate limits.
///
/// Allowed requests reach the inner service and get the `X-RateLimit-*`
/// headers added to its response. Denied requests are answered here with a
/// 429, all four headers and a JSON body; the inner service never sees them.
#[derive(Debug)]
pub struct RateLimitService<S, L> {
    inner: S,
    limiter: Arc<L>,
    enabled: bool,
    exempt_paths: Arc<[String]>,
}

impl<S: Clone, L> Clone for RateLimitService<S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            enabled: self.enabled,
            exempt_paths: self.exempt_paths.clone(),
        }
    }
}

impl<S, L> RateLimitService<S, L> {
    fn bypasses<B>(&self, req: &Request<B>) -> bool {
        !self.enabled || path_is_exempt(&self.exempt_paths, req.uri().path())
    }
}

impl<S, L, B, R> Service<Request<B>> for RateLimitService<S, L>
where
    S: Service<Request<B>, Response = Response<R>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    L: RateLimiter + 'static,
    B: Send + 'static,
    R: From<String> + Send + 'static,
{
    type Response = Response<R>;
    type Error = LimitError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(LimitError::Inner)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // The readied service handles this request; the clone waits for the next.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.bypasses(&req) {
            return Box::pin(async move { inner.call(req).await.map_err(LimitError::Inner) });
        }

        Box::pin(enforce(self.limiter.clone(), inner, req))
    }
}

async fn enforce<S, L, B, R>(
    limiter: Arc<L>,
    mut inner: S,
    req: Request<B>,
) -> Result<Response<R>, LimitError<S::Error>>
where
    S: Service<Request<B>, Response = Response<R>>,
    L: RateLimiter,
    R: From<String>,
{
    let caller = req.extensions().get::<Caller>().cloned().ok_or(LimitError::IdentityMissing)?;
    let (decision, headers) = limiter.check_and_consume(&caller.identity, caller.privileged).await?;

    if decision.is_allowed() {
        let mut response = inner.call(req).await.map_err(LimitError::Inner)?;
        headers.apply_to(response.headers_mut());
        return Ok(response);
    }

    let body = serde_json::json!({ "detail": DENIED_DETAIL }).to_string();
    let mut response = Response::new(R::from(body));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.apply_to(response.headers_mut());
    Ok(response)
}
