//! Answer resolution
//!
//! `AnswerResolver` owns the cache-or-fetch policy:
//! 1. fingerprint the question text
//! 2. on a cache hit, return the cached letter without touching the network
//! 3. on a miss, ask the inference backend under a timeout, validate the
//!    reply against the question's option letters, write it through to
//!    the cache and return it
//!
//! Failures are never retried here; the caller decides what happens next.

pub mod gemini;

use crate::cache::{AnswerCache, Fingerprint};
use crate::config::Config;
use crate::error::{McqError, ResolutionError};
use crate::question::{OptionLetter, Question};
use std::sync::Arc;
use std::time::Duration;

/// Trait for remote inference backends
#[async_trait::async_trait]
pub trait InferenceClient: Send + Sync {
    /// Send a prompt and return the raw reply text
    async fn complete(&self, prompt: &str) -> Result<String, ResolutionError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Factory function to create the configured inference backend
pub fn create_client(config: &Config) -> Result<Box<dyn InferenceClient>, McqError> {
    let client = gemini::GeminiClient::new(&config.inference, config.resolve_api_key())?;
    Ok(Box::new(client))
}

/// Where a clicked letter came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Cache,
    Remote,
    /// Chosen by the user (direct click); never produced by the resolver
    Manual,
}

impl std::fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerSource::Cache => write!(f, "cache"),
            AnswerSource::Remote => write!(f, "remote"),
            AnswerSource::Manual => write!(f, "manual"),
        }
    }
}

/// A validated answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub letter: OptionLetter,
    pub source: AnswerSource,
}

/// Build the prompt sent to the inference backend
pub fn build_prompt(question: &Question) -> String {
    let letters = question.letter_list();
    let mut prompt = format!(
        "Answer this multiple choice question by selecting the correct option letter ({}).\n\n",
        letters
    );
    prompt.push_str(&format!("Question: {}\n\n", question.text));
    prompt.push_str("Options:\n");
    for (letter, body) in &question.options {
        prompt.push_str(&format!("{}. {}\n", letter, body));
    }
    prompt.push_str(&format!(
        "\nRespond with only the letter of the correct answer ({}).",
        letters
    ));
    prompt
}

/// Validate a raw reply: one character, case-insensitive, and one of the
/// question's option letters
pub fn validate_reply(reply: &str, question: &Question) -> Result<OptionLetter, ResolutionError> {
    let invalid = || ResolutionError::InvalidResponse {
        response: reply.to_string(),
        expected: question.letter_list(),
    };

    let letter = reply.parse::<OptionLetter>().map_err(|_| invalid())?;
    if question.has_option(letter) {
        Ok(letter)
    } else {
        Err(invalid())
    }
}

/// Combines the answer cache with a remote inference fallback
pub struct AnswerResolver {
    cache: Arc<AnswerCache>,
    client: Box<dyn InferenceClient>,
    timeout: Duration,
}

impl AnswerResolver {
    pub fn new(cache: Arc<AnswerCache>, client: Box<dyn InferenceClient>, timeout: Duration) -> Self {
        Self {
            cache,
            client,
            timeout,
        }
    }

    pub fn cache(&self) -> &AnswerCache {
        &self.cache
    }

    /// Resolve a question to a letter
    pub async fn resolve(&self, question: &Question) -> Result<OptionLetter, ResolutionError> {
        self.resolve_detailed(question).await.map(|r| r.letter)
    }

    /// Resolve a question, reporting whether the answer was cached
    pub async fn resolve_detailed(&self, question: &Question) -> Result<Resolution, ResolutionError> {
        let fingerprint = Fingerprint::of(&question.text);

        // A hit never reaches the network, even if the options on screen
        // differ from the run that populated the entry.
        if let Some(hit) = self.cache.get(&fingerprint)? {
            tracing::info!("Cache hit {} -> {}", fingerprint, hit.letter);
            return Ok(Resolution {
                letter: hit.letter,
                source: AnswerSource::Cache,
            });
        }
        tracing::debug!("Cache miss for {}", fingerprint);

        let prompt = build_prompt(question);
        tracing::debug!(
            "Asking {} ({} chars, timeout {}s)",
            self.client.name(),
            prompt.len(),
            self.timeout.as_secs()
        );

        let start = std::time::Instant::now();
        let reply = tokio::time::timeout(self.timeout, self.client.complete(&prompt))
            .await
            .map_err(|_| ResolutionError::Timeout(self.timeout.as_secs()))??;

        let letter = validate_reply(&reply, question)?;
        tracing::info!(
            "{} answered {} in {:.2}s",
            self.client.name(),
            letter,
            start.elapsed().as_secs_f32()
        );

        self.cache.put(&fingerprint, letter)?;

        Ok(Resolution {
            letter,
            source: AnswerSource::Remote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::QuestionParser;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub backend that returns a fixed reply and counts calls
    struct FixedReply {
        reply: Result<String, String>,
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl InferenceClient for FixedReply {
        async fn complete(&self, _prompt: &str) -> Result<String, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply
                .clone()
                .map_err(ResolutionError::TransportFailure)
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn resolver(reply: Result<&str, &str>, delay: Duration) -> (AnswerResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = FixedReply {
            reply: reply.map(str::to_string).map_err(str::to_string),
            calls: Arc::clone(&calls),
            delay,
        };
        let cache = Arc::new(AnswerCache::in_memory().unwrap());
        (
            AnswerResolver::new(cache, Box::new(client), Duration::from_millis(200)),
            calls,
        )
    }

    fn france() -> Question {
        QuestionParser::new()
            .parse("What is the capital of France?\nA) London\nB) Berlin\nC) Paris\nD) Madrid")
            .unwrap()
    }

    #[test]
    fn test_prompt_lists_options() {
        let prompt = build_prompt(&france());
        assert!(prompt.contains("Question: What is the capital of France?"));
        assert!(prompt.contains("A. London\n"));
        assert!(prompt.contains("D. Madrid\n"));
        assert!(prompt.contains("(A, B, C, or D)"));
    }

    #[test]
    fn test_prompt_only_lists_available_letters() {
        let q = QuestionParser::new().parse("Yes or no?\nA) Yes\nB) No").unwrap();
        let prompt = build_prompt(&q);
        assert!(prompt.contains("(A or B)"));
        assert!(!prompt.contains("C."));
    }

    #[test]
    fn test_validate_reply() {
        let q = france();
        assert_eq!(validate_reply(" c\n", &q).unwrap(), OptionLetter::C);
        assert!(matches!(
            validate_reply("E", &q),
            Err(ResolutionError::InvalidResponse { .. })
        ));
        assert!(matches!(
            validate_reply("C. Paris", &q),
            Err(ResolutionError::InvalidResponse { .. })
        ));
        assert!(matches!(
            validate_reply("", &q),
            Err(ResolutionError::InvalidResponse { .. })
        ));

        let two = QuestionParser::new().parse("Q\nA) x\nB) y").unwrap();
        assert!(validate_reply("D", &two).is_err());
    }

    #[tokio::test]
    async fn test_second_resolve_comes_from_cache() {
        let (resolver, calls) = resolver(Ok("C"), Duration::ZERO);
        let q = france();

        let first = resolver.resolve_detailed(&q).await.unwrap();
        assert_eq!(first.letter, OptionLetter::C);
        assert_eq!(first.source, AnswerSource::Remote);

        let second = resolver.resolve_detailed(&q).await.unwrap();
        assert_eq!(second.letter, OptionLetter::C);
        assert_eq!(second.source, AnswerSource::Cache);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_writes_through() {
        let (resolver, _calls) = resolver(Ok("c"), Duration::ZERO);
        let q = france();
        resolver.resolve(&q).await.unwrap();

        let cached = resolver.cache().get(&Fingerprint::of(&q.text)).unwrap().unwrap();
        assert_eq!(cached.letter, OptionLetter::C);
    }

    #[tokio::test]
    async fn test_invalid_reply_is_not_cached() {
        let (resolver, _calls) = resolver(Ok("E"), Duration::ZERO);
        let q = france();

        let err = resolver.resolve(&q).await.unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidResponse { .. }));
        assert!(resolver.cache().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_blank_reply_is_not_cached() {
        let (resolver, _calls) = resolver(Ok("   "), Duration::ZERO);
        assert!(resolver.resolve(&france()).await.is_err());
        assert!(resolver.cache().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let (resolver, calls) = resolver(Err("HTTP 503"), Duration::ZERO);
        let err = resolver.resolve(&france()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::TransportFailure(_)));
        assert!(err.to_string().contains("503"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (resolver, _calls) = resolver(Ok("C"), Duration::from_secs(5));
        let err = resolver.resolve(&france()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Timeout(_)));
        assert!(resolver.cache().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_case_and_whitespace_variants_share_cache() {
        let (resolver, calls) = resolver(Ok("C"), Duration::ZERO);
        resolver.resolve(&france()).await.unwrap();

        let shouty = QuestionParser::new()
            .parse("  WHAT IS THE CAPITAL OF FRANCE?  \nA) London\nB) Berlin\nC) Paris")
            .unwrap();
        assert_eq!(resolver.resolve(&shouty).await.unwrap(), OptionLetter::C);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
