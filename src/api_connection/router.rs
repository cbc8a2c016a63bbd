//! Primary/secondary provider routing.
//!
//! Prompts grow with the uploaded document, so the primary provider can
//! reject them for exceeding its context window. Only that failure is
//! retried, once, against the secondary provider; everything else
//! propagates untouched.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::connection::{ApiConnectionError, LlmProvider, LlmRequest};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

pub struct FallbackRouter {
    primary: Arc<dyn LlmProvider>,
    secondary: Option<Arc<dyn LlmProvider>>,
    call_timeout: Duration,
    fallback_count: AtomicU32,
}

impl FallbackRouter {
    pub fn new(primary: Arc<dyn LlmProvider>, secondary: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            primary,
            secondary,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            fallback_count: AtomicU32::new(0),
        }
    }

    /// Upper bound for each individual provider call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Number of times the secondary provider has been used.
    pub fn fallback_count(&self) -> u32 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    pub async fn call_llm(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, ApiConnectionError> {
        let request = LlmRequest::new(prompt, system_instruction);
        info!(provider = self.primary.name(), prompt_chars = prompt.len(), "calling LLM");

        match self.call_bounded(self.primary.as_ref(), &request).await {
            Ok(content) => Ok(content),
            Err(err) if err.is_context_length_exceeded() => match &self.secondary {
                Some(secondary) => {
                    self.fallback_count.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        primary = self.primary.name(),
                        secondary = secondary.name(),
                        error = %err,
                        "prompt exceeded primary context window, retrying on secondary provider"
                    );
                    self.call_bounded(secondary.as_ref(), &request).await
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn call_bounded(
        &self,
        provider: &dyn LlmProvider,
        request: &LlmRequest,
    ) -> Result<String, ApiConnectionError> {
        tokio::time::timeout(self.call_timeout, provider.complete(request))
            .await
            .map_err(|_| ApiConnectionError::Timeout(provider.name().to_string()))?
    }
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.as_ref().map(|s| s.name().to_string()))
            .field("call_timeout", &self.call_timeout)
            .field("fallback_count", &self.fallback_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    enum Behaviour {
        Reply(&'static str),
        Fail(&'static str),
        Hang,
    }

    struct ScriptedProvider {
        label: &'static str,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(label: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self { label, behaviour, calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.label
        }

        async fn complete(&self, _request: &LlmRequest) -> Result<String, ApiConnectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Reply(text) => Ok(text.to_string()),
                Behaviour::Fail(body) => Err(ApiConnectionError::ApiError {
                    status: reqwest::StatusCode::BAD_REQUEST,
                    error_body: body.to_string(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(String::new())
                }
            }
        }
    }

    #[tokio::test]
    async fn primary_success_skips_secondary() {
        let primary = ScriptedProvider::new("primary", Behaviour::Reply("{}"));
        let secondary = ScriptedProvider::new("secondary", Behaviour::Reply("{\"x\":1}"));
        let router = FallbackRouter::new(primary.clone(), Some(secondary.clone()));

        let out = router.call_llm("prompt", "system").await.unwrap();
        assert_eq!(out, "{}");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn context_overflow_falls_back_exactly_once() {
        let primary = ScriptedProvider::new(
            "primary",
            Behaviour::Fail("This model's maximum context length is 8192 tokens"),
        );
        let secondary = ScriptedProvider::new("secondary", Behaviour::Reply("{\"ok\":true}"));
        let router = FallbackRouter::new(primary.clone(), Some(secondary.clone()));

        let out = router.call_llm("very long prompt", "system").await.unwrap();
        assert_eq!(out, "{\"ok\":true}");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
        assert_eq!(router.fallback_count(), 1);
    }

    #[tokio::test]
    async fn other_errors_do_not_fall_back() {
        let primary = ScriptedProvider::new("primary", Behaviour::Fail("rate limited"));
        let secondary = ScriptedProvider::new("secondary", Behaviour::Reply("{}"));
        let router = FallbackRouter::new(primary.clone(), Some(secondary.clone()));

        let err = router.call_llm("prompt", "system").await.unwrap_err();
        assert!(matches!(err, ApiConnectionError::ApiError { .. }));
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn overflow_without_secondary_propagates() {
        let primary = ScriptedProvider::new("primary", Behaviour::Fail("maximum context length exceeded"));
        let router = FallbackRouter::new(primary.clone(), None);

        let err = router.call_llm("prompt", "system").await.unwrap_err();
        assert!(err.is_context_length_exceeded());
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn secondary_failure_is_returned() {
        let primary = ScriptedProvider::new("primary", Behaviour::Fail("maximum context length"));
        let secondary = ScriptedProvider::new("secondary", Behaviour::Fail("overloaded"));
        let router = FallbackRouter::new(primary, Some(secondary.clone()));

        let err = router.call_llm("prompt", "system").await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_primary_times_out_without_fallback() {
        let primary = ScriptedProvider::new("primary", Behaviour::Hang);
        let secondary = ScriptedProvider::new("secondary", Behaviour::Reply("{}"));
        let router = FallbackRouter::new(primary, Some(secondary.clone()))
            .with_call_timeout(Duration::from_secs(1));

        let err = router.call_llm("prompt", "system").await.unwrap_err();
        assert!(matches!(err, ApiConnectionError::Timeout(ref p) if p == "primary"));
        assert_eq!(secondary.calls(), 0);
    }
}
