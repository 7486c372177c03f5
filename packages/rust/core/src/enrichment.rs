//! LLM enrichment of discovered endpoints.
//!
//! Each endpoint is sent to the inference backend once per run (cached by
//! fingerprint), paced by a run-wide rate limiter, retried on transient
//! failures, and re-prompted once on malformed answers. Enrichment never
//! fails an endpoint hard: exhausted attempts yield the default result and a
//! warning.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use noirmap_discovery::{DEFAULT_SNIPPET_CHARS, read_snippet};
use noirmap_shared::{
    AuthScheme, Confidence, DegradationReason, Endpoint, EnrichmentConfig, EnrichmentResult,
    ParamLocation, RunWarning, SourceLocation,
};

use crate::cache::EnrichmentCache;
use crate::cancel::CancelToken;
use crate::inference::{CompletionRequest, InferenceBackend, InferenceError};
use crate::pipeline::ProgressReporter;
use crate::prompt::{self, SYSTEM_PROMPT};
use crate::rate_limit::RateLimiter;

/// Lines of source shown either side of the declaration site.
const SNIPPET_CONTEXT_LINES: usize = 25;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Enrichment result for one endpoint plus the warning explaining a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentOutcome {
    pub result: EnrichmentResult,
    pub warning: Option<RunWarning>,
}

impl EnrichmentOutcome {
    fn enriched(result: EnrichmentResult) -> Self {
        Self {
            result,
            warning: None,
        }
    }

    /// Default result with a degradation warning.
    pub fn degraded(endpoint: &Endpoint, reason: DegradationReason, detail: String) -> Self {
        Self {
            result: EnrichmentResult::fallback(),
            warning: Some(RunWarning::EnrichmentDegraded {
                endpoint: endpoint.label(),
                reason,
                detail,
            }),
        }
    }

    /// Default result without a warning, used when enrichment is switched off.
    pub fn skipped() -> Self {
        Self::enriched(EnrichmentResult::fallback())
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Enriches endpoints through an [`InferenceBackend`].
pub struct Enricher {
    backend: Arc<dyn InferenceBackend>,
    config: EnrichmentConfig,
    limiter: RateLimiter,
    cache: EnrichmentCache<EnrichmentOutcome>,
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher").finish_non_exhaustive()
    }
}

impl Enricher {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: EnrichmentConfig) -> Self {
        let limiter = RateLimiter::per_minute(config.requests_per_minute);
        Self {
            backend,
            config,
            limiter,
            cache: EnrichmentCache::new(),
        }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// `(hits, misses)` of the fingerprint cache.
    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.stats()
    }

    /// Enrich one endpoint. At most one inference sequence runs per
    /// fingerprint; later callers get the cached outcome.
    pub async fn enrich(&self, endpoint: &Endpoint, snippet: Option<&str>) -> EnrichmentOutcome {
        let key = fingerprint(endpoint);
        self.cache
            .get_or_compute(&key, || self.enrich_uncached(endpoint, snippet))
            .await
    }

    #[instrument(skip_all, fields(endpoint = %endpoint.label()))]
    async fn enrich_uncached(&self, endpoint: &Endpoint, snippet: Option<&str>) -> EnrichmentOutcome {
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: prompt::build_prompt(endpoint, snippet),
            schema: Some(prompt::response_schema()),
        };

        let first_err = match self.ask(&request).await {
            Ok(mut result) => {
                result.confidence = Confidence::Full;
                return EnrichmentOutcome::enriched(result);
            }
            Err(InferenceError::InvalidOutput(detail)) => detail,
            Err(e) => return self.degrade(endpoint, &e),
        };

        debug!(error = %first_err, "malformed answer, retrying with strict prompt");
        let strict = CompletionRequest {
            user: prompt::strict_prompt(endpoint),
            ..request
        };
        match self.ask(&strict).await {
            Ok(mut result) => {
                result.confidence = Confidence::Partial;
                EnrichmentOutcome::enriched(result)
            }
            Err(e) => self.degrade(endpoint, &e),
        }
    }

    /// One completion (with transient retries) parsed into a result.
    async fn ask(&self, request: &CompletionRequest) -> Result<EnrichmentResult, InferenceError> {
        let text = self.complete_with_retry(request).await?;
        prompt::parse_answer(&text).map_err(InferenceError::InvalidOutput)
    }

    /// Send a request, retrying transient failures with exponential backoff.
    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, InferenceError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.limiter.acquire().await;
            match self.backend.complete(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = backoff_delay(self.config.base_backoff, attempt, e.retry_after());
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "inference request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn degrade(&self, endpoint: &Endpoint, err: &InferenceError) -> EnrichmentOutcome {
        warn!(endpoint = %endpoint.label(), error = %err, "using default enrichment");
        EnrichmentOutcome::degraded(endpoint, err.degradation_reason(), err.to_string())
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// or the server's `Retry-After` when that is longer.
pub fn backoff_delay(base: Duration, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let exp = base
        .checked_mul(1u32 << attempt.saturating_sub(1).min(16))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF);
    match retry_after {
        Some(server) if server > exp => server,
        _ => exp,
    }
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// SHA-256 over method, path, and the scanner record with sorted keys.
pub fn fingerprint(endpoint: &Endpoint) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(endpoint.path.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_json(&endpoint.raw).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                Value::Object(
                    ordered
                        .into_iter()
                        .map(|(k, v)| (k.clone(), v))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

// ---------------------------------------------------------------------------
// Applying results
// ---------------------------------------------------------------------------

/// Merge an enrichment result into an endpoint without overwriting known
/// values: unknown parameter types and missing descriptions are filled,
/// parameters the scanner missed are added, and auth is set only when unknown.
pub fn apply_enrichment(endpoint: &mut Endpoint, result: &EnrichmentResult) {
    for inferred in &result.params {
        match endpoint.params.iter_mut().find(|p| p.same_slot(inferred)) {
            Some(existing) => {
                if existing.param_type.is_unknown() {
                    existing.param_type = inferred.param_type;
                    if existing.location != ParamLocation::Path {
                        existing.required = inferred.required;
                    }
                }
                if existing.description.is_none() {
                    existing.description = inferred.description.clone();
                }
            }
            None => {
                let mut param = inferred.clone();
                if param.location == ParamLocation::Path {
                    param.required = true;
                }
                endpoint.params.push(param);
            }
        }
    }

    if endpoint.auth == AuthScheme::Unknown {
        endpoint.auth = result.auth;
    }
}

// ---------------------------------------------------------------------------
// Batch enrichment
// ---------------------------------------------------------------------------

/// Enrich every endpoint with bounded concurrency, returning outcomes in
/// input order.
///
/// When `cancel` fires, in-flight and unscheduled endpoints get the default
/// result with a `cancelled` warning.
#[instrument(skip_all, fields(endpoints = endpoints.len()))]
pub async fn enrich_all(
    enricher: Arc<Enricher>,
    endpoints: &[Endpoint],
    snippet_root: Option<PathBuf>,
    cancel: &CancelToken,
    progress: &dyn ProgressReporter,
) -> Vec<EnrichmentOutcome> {
    let total = endpoints.len();
    let semaphore = Arc::new(Semaphore::new(enricher.config.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, endpoint) in endpoints.iter().cloned().enumerate() {
        let enricher = Arc::clone(&enricher);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let root = snippet_root.clone();

        tasks.spawn(async move {
            let work = async {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let snippet = match (root, endpoint.sources.first().cloned()) {
                    (Some(root), Some(loc)) => load_snippet(root, loc).await,
                    _ => None,
                };
                Some(enricher.enrich(&endpoint, snippet.as_deref()).await)
            };
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = work => outcome,
            };
            (idx, outcome)
        });
    }

    let mut slots: Vec<Option<EnrichmentOutcome>> = vec![None; total];
    let mut completed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, Some(outcome))) => {
                completed += 1;
                progress.endpoint_enriched(&endpoints[idx].label(), completed, total);
                slots[idx] = Some(outcome);
            }
            Ok((_, None)) => {}
            Err(e) => warn!(error = %e, "enrichment task aborted"),
        }
    }

    let cancelled = cancel.is_cancelled();
    let outcomes: Vec<EnrichmentOutcome> = slots
        .into_iter()
        .zip(endpoints)
        .map(|(slot, endpoint)| {
            slot.unwrap_or_else(|| {
                if cancelled {
                    EnrichmentOutcome::degraded(
                        endpoint,
                        DegradationReason::Cancelled,
                        "run cancelled before enrichment finished".into(),
                    )
                } else {
                    EnrichmentOutcome::degraded(
                        endpoint,
                        DegradationReason::Transport,
                        "enrichment task aborted".into(),
                    )
                }
            })
        })
        .collect();

    let degraded = outcomes.iter().filter(|o| o.warning.is_some()).count();
    let (hits, misses) = enricher.cache_stats();
    info!(
        enriched = total - degraded,
        degraded,
        cache_hits = hits,
        cache_misses = misses,
        "enrichment complete"
    );
    outcomes
}

/// Read a source excerpt off the async runtime.
async fn load_snippet(root: PathBuf, location: SourceLocation) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        read_snippet(&root, &location, SNIPPET_CONTEXT_LINES, DEFAULT_SNIPPET_CHARS)
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use noirmap_shared::{AppConfig, HttpMethod, Param, ParamType};
    use serde_json::json;

    use crate::cancel::CancelHandle;
    use crate::pipeline::SilentProgress;

    const GOOD: &str = r#"{"parameters":[{"name":"id","in":"path","type":"integer","required":true,"description":"User id"}],"requestBody":null,"auth":"bearer","summary":"Get user","description":"Fetch one user"}"#;

    /// Backend replaying a fixed script of answers.
    struct Scripted {
        answers: Mutex<VecDeque<Result<String, InferenceError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(answers: Vec<Result<&str, InferenceError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(
                    answers
                        .into_iter()
                        .map(|a| a.map(String::from))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceBackend for Scripted {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(GOOD.to_string()))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn config() -> EnrichmentConfig {
        let mut config = EnrichmentConfig::from(&AppConfig::default());
        config.base_backoff = Duration::from_millis(1);
        config.requests_per_minute = 0;
        config
    }

    fn endpoint(path: &str) -> Endpoint {
        let mut ep = Endpoint::new(HttpMethod::Get, path);
        ep.raw = json!({"method": "GET", "url": path});
        ep
    }

    #[tokio::test]
    async fn first_answer_is_full_confidence() {
        let backend = Scripted::new(vec![Ok(GOOD)]);
        let enricher = Enricher::new(backend.clone(), config());
        let outcome = enricher.enrich(&endpoint("/users/{id}"), None).await;
        assert!(outcome.warning.is_none());
        assert_eq!(outcome.result.confidence, Confidence::Full);
        assert_eq!(outcome.result.auth, AuthScheme::Bearer);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let backend = Scripted::new(vec![
            Err(InferenceError::RateLimited { retry_after: None }),
            Err(InferenceError::Server { status: 502 }),
            Ok(GOOD),
        ]);
        let enricher = Enricher::new(backend.clone(), config());
        let outcome = enricher.enrich(&endpoint("/a"), None).await;
        assert_eq!(outcome.result.confidence, Confidence::Full);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_degrade() {
        let backend = Scripted::new(vec![
            Err(InferenceError::Timeout),
            Err(InferenceError::Timeout),
            Err(InferenceError::Timeout),
            Ok(GOOD),
        ]);
        let enricher = Enricher::new(backend.clone(), config());
        let outcome = enricher.enrich(&endpoint("/a"), None).await;
        assert!(outcome.result.is_fallback());
        assert!(matches!(
            outcome.warning,
            Some(RunWarning::EnrichmentDegraded {
                reason: DegradationReason::Timeout,
                ..
            })
        ));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn client_error_degrades_immediately() {
        let backend = Scripted::new(vec![Err(InferenceError::Client {
            status: 400,
            message: "bad".into(),
        })]);
        let enricher = Enricher::new(backend.clone(), config());
        let outcome = enricher.enrich(&endpoint("/a"), None).await;
        assert!(outcome.result.is_fallback());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_then_valid_is_partial() {
        let backend = Scripted::new(vec![Ok("I think it takes an id."), Ok(GOOD)]);
        let enricher = Enricher::new(backend.clone(), config());
        let outcome = enricher.enrich(&endpoint("/a"), None).await;
        assert!(outcome.warning.is_none());
        assert_eq!(outcome.result.confidence, Confidence::Partial);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn malformed_twice_degrades_with_invalid_output() {
        let backend = Scripted::new(vec![Ok("nope"), Ok(r#"{"auth":"oauth"}"#)]);
        let enricher = Enricher::new(backend.clone(), config());
        let outcome = enricher.enrich(&endpoint("/a"), None).await;
        assert!(outcome.result.is_fallback());
        assert!(matches!(
            outcome.warning,
            Some(RunWarning::EnrichmentDegraded {
                reason: DegradationReason::InvalidOutput,
                ..
            })
        ));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn identical_endpoints_hit_cache() {
        let backend = Scripted::new(vec![]);
        let enricher = Enricher::new(backend.clone(), config());
        let ep = endpoint("/same");
        let a = enricher.enrich(&ep, None).await;
        let b = enricher.enrich(&ep, None).await;
        assert_eq!(a, b);
        assert_eq!(backend.calls(), 1);
        assert_eq!(enricher.cache_stats(), (1, 1));
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let mut a = endpoint("/x");
        a.raw = json!({"url": "/x", "method": "GET", "details": {"b": 1, "a": 2}});
        let mut b = endpoint("/x");
        b.raw = json!({"details": {"a": 2, "b": 1}, "method": "GET", "url": "/x"});
        assert_eq!(fingerprint(&a), fingerprint(&b));

        let c = Endpoint::new(HttpMethod::Post, "/x");
        assert_ne!(fingerprint(&a), fingerprint(&c));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn backoff_doubles_and_honours_retry_after() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1, None), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2, None), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3, None), Duration::from_millis(2000));
        assert_eq!(
            backoff_delay(base, 1, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            backoff_delay(base, 3, Some(Duration::from_millis(100))),
            Duration::from_millis(2000)
        );
        assert_eq!(backoff_delay(base, 40, None), MAX_BACKOFF);
    }

    #[test]
    fn apply_fills_unknowns_only() {
        let mut ep = endpoint("/users/{id}");
        let mut known = Param::new("q", ParamLocation::Query);
        known.param_type = ParamType::String;
        ep.params = vec![Param::new("id", ParamLocation::Path), known];
        ep.auth = AuthScheme::None;

        let mut id = Param::new("id", ParamLocation::Path);
        id.param_type = ParamType::Integer;
        id.description = Some("User id".into());
        let mut q = Param::new("q", ParamLocation::Query);
        q.param_type = ParamType::Integer;
        let extra = Param::new("X-Req", ParamLocation::Header);
        let result = EnrichmentResult {
            params: vec![id, q, extra],
            auth: AuthScheme::Bearer,
            confidence: Confidence::Full,
            ..EnrichmentResult::default()
        };

        apply_enrichment(&mut ep, &result);
        assert_eq!(ep.params.len(), 3);
        assert_eq!(ep.params[0].param_type, ParamType::Integer);
        assert_eq!(ep.params[0].description.as_deref(), Some("User id"));
        assert_eq!(ep.params[1].param_type, ParamType::String);
        assert_eq!(ep.params[2].name, "X-Req");
        assert_eq!(ep.auth, AuthScheme::None);
    }

    #[test]
    fn apply_sets_unknown_auth() {
        let mut ep = endpoint("/a");
        let result = EnrichmentResult {
            auth: AuthScheme::ApiKey,
            ..EnrichmentResult::default()
        };
        apply_enrichment(&mut ep, &result);
        assert_eq!(ep.auth, AuthScheme::ApiKey);
    }

    #[tokio::test]
    async fn enrich_all_preserves_order() {
        let backend = Scripted::new(vec![]);
        let enricher = Arc::new(Enricher::new(backend.clone(), config()));
        let endpoints: Vec<Endpoint> = (0..6).map(|i| endpoint(&format!("/r{i}"))).collect();

        let outcomes = enrich_all(
            enricher,
            &endpoints,
            None,
            &CancelToken::never(),
            &SilentProgress,
        )
        .await;
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.result.confidence == Confidence::Full));
        assert_eq!(backend.calls(), 6);
    }

    /// Backend failing for prompts that mention `fail_on`, recording every prompt.
    struct FailsFor {
        fail_on: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InferenceBackend for FailsFor {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
            self.prompts.lock().unwrap().push(request.user.clone());
            if request.user.contains(self.fail_on) {
                return Err(InferenceError::Client {
                    status: 400,
                    message: "bad request".into(),
                });
            }
            Ok(GOOD.to_string())
        }

        fn model(&self) -> &str {
            "fails-for"
        }
    }

    #[tokio::test]
    async fn one_failure_leaves_other_endpoints_enriched() {
        let backend = Arc::new(FailsFor {
            fail_on: "/broken",
            prompts: Mutex::new(Vec::new()),
        });
        let enricher = Arc::new(Enricher::new(backend, config()));
        let endpoints = vec![endpoint("/a"), endpoint("/broken"), endpoint("/c")];

        let outcomes = enrich_all(
            enricher,
            &endpoints,
            None,
            &CancelToken::never(),
            &SilentProgress,
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1].result.confidence, Confidence::None);
        assert!(matches!(
            &outcomes[1].warning,
            Some(RunWarning::EnrichmentDegraded {
                endpoint,
                reason: DegradationReason::ClientError,
                ..
            }) if endpoint == "GET /broken"
        ));
        for idx in [0, 2] {
            assert_eq!(outcomes[idx].result.confidence, Confidence::Full);
            assert_eq!(outcomes[idx].result.summary.as_deref(), Some("Get user"));
            assert!(outcomes[idx].warning.is_none());
        }
    }

    #[tokio::test]
    async fn snippets_are_read_from_the_source_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("routes.js"),
            "const router = express.Router();\nrouter.get('/a', listThings);\n",
        )
        .unwrap();
        let backend = Arc::new(FailsFor {
            fail_on: "never-matches",
            prompts: Mutex::new(Vec::new()),
        });
        let enricher = Arc::new(Enricher::new(backend.clone(), config()));
        let mut ep = endpoint("/a");
        ep.sources.push(SourceLocation {
            file: "routes.js".into(),
            line: Some(2),
        });

        let outcomes = enrich_all(
            enricher,
            &[ep],
            Some(dir.path().to_path_buf()),
            &CancelToken::never(),
            &SilentProgress,
        )
        .await;

        assert_eq!(outcomes[0].result.confidence, Confidence::Full);
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("router.get('/a', listThings)"));
    }

    /// Backend that never answers.
    struct Hanging;

    #[async_trait]
    impl InferenceBackend for Hanging {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
            std::future::pending().await
        }

        fn model(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn cancellation_degrades_pending_endpoints() {
        let enricher = Arc::new(Enricher::new(Arc::new(Hanging), config()));
        let endpoints = vec![endpoint("/a"), endpoint("/b")];
        let handle = CancelHandle::new();
        let token = handle.token();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });
        let outcomes = enrich_all(enricher, &endpoints, None, &token, &SilentProgress).await;
        canceller.await.unwrap();

        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            assert!(outcome.result.is_fallback());
            assert!(matches!(
                outcome.warning,
                Some(RunWarning::EnrichmentDegraded {
                    reason: DegradationReason::Cancelled,
                    ..
                })
            ));
        }
    }
}
