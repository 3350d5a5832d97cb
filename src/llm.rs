//! Language-model seam used by condensation and answer synthesis.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;

/// Incremental answer: fragments that concatenate to the full text.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// A text-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` and return the whole response.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Complete `prompt`, resolving once the first fragment can be pulled.
    async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream>;

    /// Model identifier for logs.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use futures::{stream, StreamExt};

    use super::*;
    use crate::Error;

    /// Scripted model recording every prompt it receives.
    pub(crate) struct MockModel {
        answer: String,
        condensed: String,
        fail_complete: bool,
        stream_error_after: Option<usize>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockModel {
        pub(crate) fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                condensed: "standalone question".to_string(),
                fail_complete: false,
                stream_error_after: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Reply used for condensation prompts.
        pub(crate) fn with_condensed(mut self, text: &str) -> Self {
            self.condensed = text.to_string();
            self
        }

        pub(crate) fn failing(mut self) -> Self {
            self.fail_complete = true;
            self
        }

        /// Stream `n` fragments, then an error.
        pub(crate) fn with_stream_error_after(mut self, n: usize) -> Self {
            self.stream_error_after = Some(n);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        fn record(&self, prompt: &str) {
            self.prompts.lock().unwrap().push(prompt.to_string());
        }
    }

    #[async_trait]
    impl LanguageModel for MockModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.record(prompt);
            if self.fail_complete {
                return Err(Error::BackendUnavailable("mock failure".to_string()));
            }
            if prompt.trim_end().ends_with("Standalone question:") {
                return Ok(format!("  {}\n", self.condensed));
            }
            Ok(self.answer.clone())
        }

        async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream> {
            self.record(prompt);
            let fragments: Vec<Result<String>> = self
                .answer
                .split_inclusive(' ')
                .map(|f| Ok(f.to_string()))
                .collect();

            match self.stream_error_after {
                Some(n) => {
                    let mut items: Vec<Result<String>> = fragments.into_iter().take(n).collect();
                    items.push(Err(Error::BackendUnavailable("stream dropped".to_string())));
                    Ok(stream::iter(items).boxed())
                }
                None => Ok(stream::iter(fragments).boxed()),
            }
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }
}
