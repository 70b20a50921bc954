//! Text generation backend and the timeout/retry guard around it.
//!
//! The decision pipeline never talks to a provider directly: it goes
//! through [`GenerationGuard`], which bounds the call in time and turns
//! every provider problem into a typed error the caller can fall back on.

pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AssistError, AssistResult};
use crate::rag::strategy::GenerationProfile;

pub use gemini::GeminiGenerator;

/// A generative text backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, profile: &GenerationProfile) -> Result<String>;

    /// Short name used in logs and status reports.
    fn name(&self) -> &str;
}

/// Bounds a [`TextGenerator`] with an overall timeout and retries failed
/// attempts. A timeout is never retried.
pub struct GenerationGuard {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    max_retries: usize,
}

impl GenerationGuard {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration, max_retries: usize) -> Self {
        Self {
            generator,
            timeout,
            max_retries,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.generator.name()
    }

    pub async fn generate(&self, prompt: &str, profile: &GenerationProfile) -> AssistResult<String> {
        match tokio::time::timeout(self.timeout, self.attempts(prompt, profile)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    backend = self.generator.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Generation timed out"
                );
                Err(AssistError::GenerationTimeout(self.timeout))
            }
        }
    }

    async fn attempts(&self, prompt: &str, profile: &GenerationProfile) -> AssistResult<String> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            match self.generator.generate(prompt, profile).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(attempt, chars = text.len(), "Generation succeeded");
                    return Ok(text);
                }
                Ok(_) => {
                    last_error = "empty response".to_string();
                    warn!(attempt, backend = self.generator.name(), "Generation returned empty text");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt, backend = self.generator.name(), error = %e, "Generation attempt failed");
                }
            }
        }
        Err(AssistError::GenerationFailure(last_error))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns fixed text and remembers the last prompt.
    pub struct CannedGenerator {
        pub text: String,
        pub last_prompt: Mutex<Option<String>>,
    }

    impl CannedGenerator {
        pub fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, prompt: &str, _profile: &GenerationProfile) -> Result<String> {
            *self.last_prompt.lock() = Some(prompt.to_string());
            Ok(self.text.clone())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    /// Fails the first `failures` calls, then answers.
    pub struct FlakyGenerator {
        pub failures: usize,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for FlakyGenerator {
        async fn generate(&self, _prompt: &str, _profile: &GenerationProfile) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                anyhow::bail!("provider unavailable")
            }
            Ok("Dạ thầy/cô, đã có kết quả.".to_string())
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    /// Sleeps far past any test timeout.
    pub struct SleepyGenerator;

    #[async_trait]
    impl TextGenerator for SleepyGenerator {
        async fn generate(&self, _prompt: &str, _profile: &GenerationProfile) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }

        fn name(&self) -> &str {
            "sleepy"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn profile() -> GenerationProfile {
        GenerationProfile::new(0.5, 150)
    }

    #[tokio::test]
    async fn returns_generated_text() {
        let guard = GenerationGuard::new(Arc::new(CannedGenerator::new("xin chào")), Duration::from_secs(1), 0);
        assert_eq!(guard.generate("p", &profile()).await.unwrap(), "xin chào");
    }

    #[tokio::test]
    async fn retries_failed_attempts() {
        let flaky = Arc::new(FlakyGenerator { failures: 1, calls: AtomicUsize::new(0) });
        let guard = GenerationGuard::new(flaky.clone(), Duration::from_secs(1), 1);
        assert!(guard.generate("p", &profile()).await.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let flaky = Arc::new(FlakyGenerator { failures: 5, calls: AtomicUsize::new(0) });
        let guard = GenerationGuard::new(flaky.clone(), Duration::from_secs(1), 2);
        let err = guard.generate("p", &profile()).await.unwrap_err();
        assert!(matches!(err, AssistError::GenerationFailure(ref m) if m.contains("provider unavailable")));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_text_counts_as_failure() {
        let guard = GenerationGuard::new(Arc::new(CannedGenerator::new("  ")), Duration::from_secs(1), 0);
        assert!(matches!(
            guard.generate("p", &profile()).await,
            Err(AssistError::GenerationFailure(_))
        ));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let timeout = Duration::from_millis(50);
        let guard = GenerationGuard::new(Arc::new(SleepyGenerator), timeout, 3);
        let started = std::time::Instant::now();
        let err = guard.generate("p", &profile()).await.unwrap_err();
        assert!(matches!(err, AssistError::GenerationTimeout(t) if t == timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
