//! Fetch unit: pull up to `cap` comments for one identifier, politely

use std::time::Duration;

use commentline_core::{retry_with_backoff, Backoff};

use crate::config::{HarvestConfig, PacingConfig};
use crate::error::FetchFailure;
use crate::identifier::Identifier;
use crate::source::CommentSource;

/// Trim and collapse internal whitespace runs to single spaces
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Fetches one identifier at a time; shared by all workers of a batch
pub struct FetchUnit<'a> {
    source: &'a dyn CommentSource,
    cap: usize,
    pacing: PacingConfig,
    backoff: Backoff,
}

impl<'a> FetchUnit<'a> {
    pub fn new(
        source: &'a dyn CommentSource,
        cap: usize,
        pacing: PacingConfig,
        backoff: Backoff,
    ) -> Self {
        Self {
            source,
            cap,
            pacing,
            backoff,
        }
    }

    pub fn from_config(source: &'a dyn CommentSource, config: &HarvestConfig) -> Self {
        Self::new(
            source,
            config.max_records_per_id,
            config.pacing.clone(),
            config.retry.backoff(),
        )
    }

    /// Up to `cap` normalized texts. A mid-stream failure returns the texts
    /// received so far inside the [`FetchFailure`].
    pub fn fetch(&self, identifier: &Identifier) -> Result<Vec<String>, FetchFailure> {
        let mut attempts = 0;
        let stream = retry_with_backoff(identifier.as_str(), &self.backoff, |_| {
            attempts += 1;
            self.source.stream(identifier)
        })
        .map_err(|error| FetchFailure {
            identifier: identifier.clone(),
            error,
            partial: Vec::new(),
            attempts,
        })?;

        let mut rng = rand::rng();
        let mut texts = Vec::new();
        let mut until_pause = self.pacing.every.sample(&mut rng);
        for item in stream.take(self.cap) {
            match item {
                Ok(raw) => texts.push(normalize_whitespace(&raw.text)),
                Err(error) => {
                    return Err(FetchFailure {
                        identifier: identifier.clone(),
                        error,
                        partial: texts,
                        attempts,
                    });
                }
            }
            until_pause = until_pause.saturating_sub(1);
            if until_pause == 0 && texts.len() < self.cap {
                let pause = Duration::from_millis(self.pacing.delay_ms.sample(&mut rng));
                if !pause.is_zero() {
                    std::thread::sleep(pause);
                }
                until_pause = self.pacing.every.sample(&mut rng);
            }
        }
        Ok(texts)
    }
}
