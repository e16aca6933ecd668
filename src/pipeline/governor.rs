//! Rate-limited fallback to external classification models.
//!
//! At most `max_concurrent` calls run at once across the whole process.
//! A call holds its permit for its full duration, failover included, and
//! the permit is returned on every exit path because it is a guard value.
//! Permits are handed out in the order callers started waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::ModerationDecision;

/// Token whose presence in a reply means "this is Russian".
pub const AFFIRMATIVE_TOKEN: &str = "yes";

/// Replies are one word; leave a little room for punctuation.
const CLASSIFY_MAX_TOKENS: u32 = 8;

const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Map a free-form model reply onto a decision.
///
/// Violating iff the reply contains [`AFFIRMATIVE_TOKEN`], case-insensitively.
/// Every other reply, including an empty one, counts as Acceptable.
pub fn normalize_reply(reply: &str) -> ModerationDecision {
    if reply.to_lowercase().contains(AFFIRMATIVE_TOKEN) {
        ModerationDecision::Violating
    } else {
        ModerationDecision::Acceptable
    }
}

/// What a single provider produced.
#[derive(Debug)]
pub enum ProviderAttempt {
    Answered {
        provider: String,
        decision: ModerationDecision,
    },
    Failed {
        provider: String,
        error: LlmError,
    },
}

/// Point-in-time counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    /// `classify` calls that obtained a permit.
    pub calls: usize,
    /// Individual provider attempts that failed.
    pub provider_failures: usize,
    /// Calls where every provider failed.
    pub indeterminate: usize,
    /// Calls holding a permit right now.
    pub in_flight: usize,
    /// Highest `in_flight` ever observed.
    pub peak_in_flight: usize,
}

#[derive(Default)]
struct Counters {
    calls: AtomicUsize,
    provider_failures: AtomicUsize,
    indeterminate: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements `in_flight` when the call ends, however it ends.
struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bounded, ordered failover over classification providers.
pub struct ClassifierGovernor {
    providers: Vec<Arc<dyn LlmProvider>>,
    permits: Semaphore,
    max_concurrent: usize,
    system_prompt: String,
    counters: Counters,
}

impl ClassifierGovernor {
    /// `providers` are tried in the given order.
    pub fn new(
        providers: Vec<Arc<dyn LlmProvider>>,
        max_concurrent: usize,
        system_prompt: impl Into<String>,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            providers,
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            system_prompt: system_prompt.into(),
            counters: Counters::default(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits not currently held.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Provider names in failover order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Classify `text`, waiting for a permit first.
    ///
    /// Returns the first provider's answer that arrives without error.
    /// `Indeterminate` means every provider failed.
    pub async fn classify(&self, text: &str) -> ModerationDecision {
        let Ok(_permit) = self.permits.acquire().await else {
            warn!("Classifier permit pool closed");
            return ModerationDecision::Indeterminate;
        };
        let _in_flight = InFlight::enter(&self.counters);
        self.counters.calls.fetch_add(1, Ordering::Relaxed);

        for provider in &self.providers {
            match self.attempt(provider.as_ref(), text).await {
                ProviderAttempt::Answered { provider, decision } => {
                    debug!(provider = %provider, decision = ?decision, "Classifier answered");
                    return decision;
                }
                ProviderAttempt::Failed { provider, error } => {
                    self.counters
                        .provider_failures
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(provider = %provider, error = %error, "Classifier provider failed, trying next");
                }
            }
        }

        self.counters.indeterminate.fetch_add(1, Ordering::Relaxed);
        warn!(
            providers = self.providers.len(),
            "All classifier providers failed, leaving message alone"
        );
        ModerationDecision::Indeterminate
    }

    /// One provider call, with its failure captured as a value.
    pub async fn attempt(&self, provider: &dyn LlmProvider, text: &str) -> ProviderAttempt {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(text),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        match provider.complete(request).await {
            Ok(response) => ProviderAttempt::Answered {
                provider: provider.name().to_string(),
                decision: normalize_reply(response.content.trim()),
            },
            Err(error) => ProviderAttempt::Failed {
                provider: provider.name().to_string(),
                error,
            },
        }
    }

    pub fn stats(&self) -> ClassifierStats {
        ClassifierStats {
            calls: self.counters.calls.load(Ordering::Relaxed),
            provider_failures: self.counters.provider_failures.load(Ordering::Relaxed),
            indeterminate: self.counters.indeterminate.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::{CompletionResponse, FinishReason, Role};

    /// Scripted provider that records the requests it sees.
    struct ScriptedLlm {
        name: &'static str,
        reply: Result<&'static str, ()>,
        delay: Duration,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn answering(name: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(reply),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Err(()),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn slow(name: &'static str, reply: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(reply),
                delay,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            self.name
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.to_string(),
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::Stop,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: self.name.to_string(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }

    fn providers(list: &[&Arc<ScriptedLlm>]) -> Vec<Arc<dyn LlmProvider>> {
        list.iter()
            .map(|p| Arc::clone(*p) as Arc<dyn LlmProvider>)
            .collect()
    }

    #[test]
    fn normalize_reply_contract() {
        assert_eq!(normalize_reply("yes"), ModerationDecision::Violating);
        assert_eq!(normalize_reply("Yes."), ModerationDecision::Violating);
        assert_eq!(normalize_reply("YES"), ModerationDecision::Violating);
        assert_eq!(normalize_reply("no"), ModerationDecision::Acceptable);
        assert_eq!(normalize_reply("No."), ModerationDecision::Acceptable);
        assert_eq!(normalize_reply(""), ModerationDecision::Acceptable);
        assert_eq!(normalize_reply("maybe"), ModerationDecision::Acceptable);
    }

    #[tokio::test]
    async fn primary_answer_wins() {
        let primary = ScriptedLlm::answering("groq", "yes");
        let secondary = ScriptedLlm::answering("gemini", "no");
        let governor = ClassifierGovernor::new(
            providers(&[&primary, &secondary]),
            2,
            "classify",
        );

        assert_eq!(governor.classify("хорошо").await, ModerationDecision::Violating);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn fails_over_to_secondary() {
        let primary = ScriptedLlm::failing("groq");
        let secondary = ScriptedLlm::answering("gemini", "No");
        let governor = ClassifierGovernor::new(
            providers(&[&primary, &secondary]),
            2,
            "classify",
        );

        assert_eq!(governor.classify("хата").await, ModerationDecision::Acceptable);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
        let stats = governor.stats();
        assert_eq!(stats.provider_failures, 1);
        assert_eq!(stats.indeterminate, 0);
    }

    #[tokio::test]
    async fn all_failing_is_indeterminate_and_releases_permit() {
        let governor = ClassifierGovernor::new(
            providers(&[&ScriptedLlm::failing("groq"), &ScriptedLlm::failing("gemini")]),
            1,
            "classify",
        );

        assert_eq!(governor.classify("хата").await, ModerationDecision::Indeterminate);
        assert_eq!(governor.available_permits(), 1);
        // A second call must not block on a leaked permit.
        assert_eq!(governor.classify("хата").await, ModerationDecision::Indeterminate);

        let stats = governor.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.provider_failures, 4);
        assert_eq!(stats.indeterminate, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn no_providers_is_indeterminate() {
        let governor = ClassifierGovernor::new(vec![], 2, "classify");
        assert_eq!(governor.classify("хата").await, ModerationDecision::Indeterminate);
    }

    #[tokio::test]
    async fn request_carries_system_instruction() {
        let primary = ScriptedLlm::answering("groq", "no");
        let governor = ClassifierGovernor::new(providers(&[&primary]), 2, "Answer yes or no.");
        governor.classify("добрий вечір").await;

        let seen = primary.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, "Answer yes or no.");
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[1].content, "добрий вечір");
        assert_eq!(request.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_permits() {
        let slow = ScriptedLlm::slow("groq", "no", Duration::from_millis(20));
        let governor = Arc::new(ClassifierGovernor::new(providers(&[&slow]), 2, "classify"));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let governor = Arc::clone(&governor);
            handles.push(tokio::spawn(async move { governor.classify("хата").await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), ModerationDecision::Acceptable);
        }

        let stats = governor.stats();
        assert_eq!(stats.calls, 10);
        assert_eq!(stats.peak_in_flight, 2);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(slow.calls(), 10);
        assert_eq!(governor.available_permits(), 2);
    }

    #[tokio::test]
    async fn waiters_get_permits_in_arrival_order() {
        let slow = ScriptedLlm::slow("groq", "no", Duration::from_millis(50));
        let governor = Arc::new(ClassifierGovernor::new(providers(&[&slow]), 1, "classify"));

        let spawn_classify = |text: &'static str| {
            let governor = Arc::clone(&governor);
            tokio::spawn(async move { governor.classify(text).await })
        };

        let holder = spawn_classify("перший");
        while governor.available_permits() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let first = spawn_classify("альфа");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = spawn_classify("бета");

        for handle in [holder, first, second] {
            assert_eq!(handle.await.unwrap(), ModerationDecision::Acceptable);
        }

        let order: Vec<String> = slow
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.messages[1].content.clone())
            .collect();
        assert_eq!(order, ["перший", "альфа", "бета"]);
        assert_eq!(governor.stats().peak_in_flight, 1);
    }

    #[test]
    fn zero_permits_clamped_to_one() {
        let governor = ClassifierGovernor::new(vec![], 0, "classify");
        assert_eq!(governor.max_concurrent(), 1);
        assert_eq!(governor.available_permits(), 1);
    }
}
