//! Provider fallback router
//!
//! Iterates the configured preference order deterministically. Hard
//! failures (unavailable, rate-limited) advance to the next provider
//! immediately; a live call cannot afford retry-with-backoff. Malformed
//! output earns exactly one corrective re-prompt against the same provider
//! before falling through.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use dispatch_agent_core::{
    AttemptOutcome, CompletionRequest, ConversationTurn, LlmProvider, ProviderAttempt,
    ProviderError, RoutedCompletion, RouterError, TurnRole,
};

/// Corrective instruction appended when a provider emits malformed output
const CORRECTIVE_INSTRUCTION: &str = "Your previous reply did not follow the required format. \
     Reply again with either plain text, or a call to one of the provided \
     functions with arguments as a valid JSON object. Do not include \
     anything else.";

/// Fallback router over an ordered provider preference list
///
/// The preference order is fixed at construction and never randomized;
/// reproducibility of fallback order matters when debugging live incidents.
pub struct FallbackRouter {
    providers: Vec<Arc<dyn LlmProvider>>,
    /// When set, a provider that failed hard stays demoted for this router
    /// handle's lifetime (one session when handles are per-session)
    sticky_fallback: bool,
    demoted: Mutex<HashSet<String>>,
}

impl FallbackRouter {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>, sticky_fallback: bool) -> Self {
        Self {
            providers,
            sticky_fallback,
            demoted: Mutex::new(HashSet::new()),
        }
    }

    /// Fresh handle over the same providers with no demotion state
    ///
    /// The bridge takes one handle per session so sticky demotion never
    /// leaks across calls.
    pub fn session_scope(&self) -> Self {
        Self {
            providers: self.providers.clone(),
            sticky_fallback: self.sticky_fallback,
            demoted: Mutex::new(HashSet::new()),
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run one completion with fallback
    pub async fn dispatch(
        &self,
        request: &CompletionRequest,
    ) -> Result<RoutedCompletion, RouterError> {
        let mut attempts: Vec<ProviderAttempt> = Vec::new();
        let mut last_error: Option<ProviderError> = None;

        for (index, provider) in self.providers.iter().enumerate() {
            if self.sticky_fallback && self.demoted.lock().contains(provider.name()) {
                tracing::debug!(provider = provider.name(), "Skipping demoted provider");
                continue;
            }

            match self.attempt(provider, request, false, &mut attempts).await {
                Ok(outcome) => {
                    return Ok(self.routed(outcome, provider.name(), index, attempts));
                }
                Err(ProviderError::MalformedOutput(reason)) => {
                    tracing::warn!(
                        provider = provider.name(),
                        reason = %reason,
                        "Malformed output, issuing corrective re-prompt"
                    );

                    let corrected = corrective_request(request);
                    match self
                        .attempt(provider, &corrected, true, &mut attempts)
                        .await
                    {
                        Ok(outcome) => {
                            return Ok(self.routed(outcome, provider.name(), index, attempts));
                        }
                        Err(err) => {
                            // One re-prompt only; fall through to the next
                            // provider whatever the second failure class.
                            tracing::warn!(
                                provider = provider.name(),
                                error = %err,
                                "Corrective re-prompt failed, falling through"
                            );
                            self.maybe_demote(provider.name(), &err);
                            last_error = Some(err);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %err,
                        "Provider failed, advancing"
                    );
                    self.maybe_demote(provider.name(), &err);
                    last_error = Some(err);
                }
            }
        }

        metrics::counter!("llm_router_exhausted_total").increment(1);
        Err(RouterError::AllProvidersExhausted {
            attempts: attempts.len(),
            last_error,
        })
    }

    async fn attempt(
        &self,
        provider: &Arc<dyn LlmProvider>,
        request: &CompletionRequest,
        corrective: bool,
        attempts: &mut Vec<ProviderAttempt>,
    ) -> Result<dispatch_agent_core::CompletionOutcome, ProviderError> {
        let start = Instant::now();
        let result = provider.complete(request).await;
        let latency = start.elapsed();

        let outcome = match &result {
            Ok(_) => AttemptOutcome::Success,
            Err(ProviderError::RateLimited) => AttemptOutcome::RateLimited,
            Err(ProviderError::MalformedOutput(_)) => AttemptOutcome::Malformed,
            Err(ProviderError::Unavailable(reason)) => {
                if reason.contains("deadline") || reason.contains("timed out") {
                    AttemptOutcome::Timeout
                } else {
                    AttemptOutcome::Error
                }
            }
        };

        metrics::counter!(
            "llm_provider_attempts_total",
            "provider" => provider.name().to_string(),
            "outcome" => outcome_label(outcome),
        )
        .increment(1);
        metrics::histogram!(
            "llm_provider_latency_seconds",
            "provider" => provider.name().to_string(),
        )
        .record(latency.as_secs_f64());

        attempts.push(ProviderAttempt {
            provider: provider.name().to_string(),
            outcome,
            latency,
            corrective,
        });

        result
    }

    fn routed(
        &self,
        outcome: dispatch_agent_core::CompletionOutcome,
        provider: &str,
        index: usize,
        attempts: Vec<ProviderAttempt>,
    ) -> RoutedCompletion {
        let fallback_used = index > 0;
        if fallback_used {
            metrics::counter!(
                "llm_router_fallbacks_total",
                "provider" => provider.to_string(),
            )
            .increment(1);
        }

        tracing::debug!(
            provider,
            fallback_used,
            attempts = attempts.len(),
            "Dispatch complete"
        );

        RoutedCompletion {
            outcome,
            provider_used: provider.to_string(),
            fallback_used,
            attempts,
        }
    }

    fn maybe_demote(&self, provider: &str, err: &ProviderError) {
        // Malformed output is a per-request condition, not a provider outage.
        if self.sticky_fallback && !matches!(err, ProviderError::MalformedOutput(_)) {
            self.demoted.lock().insert(provider.to_string());
        }
    }
}

/// History with the corrective instruction appended as a trailing system turn
fn corrective_request(request: &CompletionRequest) -> CompletionRequest {
    let next_ordinal = request
        .history
        .last()
        .map(|t| t.ordinal + 1)
        .unwrap_or(0);

    let mut history = request.history.clone();
    history.push(ConversationTurn::text(
        TurnRole::System,
        CORRECTIVE_INSTRUCTION,
        next_ordinal,
    ));

    CompletionRequest::new(history, request.function_schemas.clone())
}

fn outcome_label(outcome: AttemptOutcome) -> &'static str {
    match outcome {
        AttemptOutcome::Success => "success",
        AttemptOutcome::Timeout => "timeout",
        AttemptOutcome::RateLimited => "rate_limited",
        AttemptOutcome::Error => "error",
        AttemptOutcome::Malformed => "malformed",
    }
}
