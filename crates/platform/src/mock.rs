//! Mock platform for unit testing

use crate::error::PlatformError;
use crate::platform_trait::PlatformConfigurator;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone)]
enum Answer {
    Config(Vec<u8>),
    NoConfigSource,
    Error(String),
}

/// Mock platform named `mock`
///
/// Answers with fixed bytes, [`PlatformError::NoConfigSource`], or a failure
/// carrying a fixed message, and counts the calls it received.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    answer: Answer,
    calls: Arc<Mutex<usize>>,
}

impl MockPlatform {
    /// Platform name.
    pub const NAME: &'static str = "mock";

    /// Answer with `data`
    pub fn with_config(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Answer::Config(data.into()))
    }

    /// Answer with [`PlatformError::NoConfigSource`]
    pub fn without_config() -> Self {
        Self::new(Answer::NoConfigSource)
    }

    /// Fail with `message`
    pub fn with_error(message: impl Into<String>) -> Self {
        Self::new(Answer::Error(message.into()))
    }

    fn new(answer: Answer) -> Self {
        Self {
            answer,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of configuration requests so far
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl PlatformConfigurator for MockPlatform {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn configuration(&self) -> Result<Vec<u8>, PlatformError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        match &self.answer {
            Answer::Config(data) => Ok(data.clone()),
            Answer::NoConfigSource => Err(PlatformError::NoConfigSource),
            Answer::Error(message) => Err(PlatformError::Failed(message.clone())),
        }
    }
}
