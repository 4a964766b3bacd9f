//! Prefix expansion policy
//!
//! The site never returns more than `result_ceiling` records for one search.
//! A prefix whose drain collected at least `result_ceiling - ceiling_margin`
//! records is presumed truncated and is split into one child per alphabet
//! letter. Expansion always lengthens the prefix, so the traversal terminates
//! as long as the data thins out with depth; `max_prefix_length` caps it when
//! it does not.

use crate::config::Config;
use crate::crawler::frontier::Frontier;
use crate::crawler::PrefixResult;
use crate::prefix::{Alphabet, Prefix};
use crate::state::PrefixState;
use crate::SweepError;

/// Decides when a drained prefix must be split
#[derive(Debug, Clone)]
pub struct ExpansionPolicy {
    alphabet: Alphabet,
    result_ceiling: u64,
    ceiling_margin: u64,
    enabled: bool,
    /// 0 = unlimited
    max_prefix_length: usize,
}

/// What the policy decided for one prefix result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub prefix: Prefix,
    /// Terminal state recorded in the frontier
    pub state: PrefixState,
    /// Children actually added to the frontier
    pub children: Vec<Prefix>,
}

impl Evaluation {
    /// True when the prefix was judged truncated and split
    pub fn is_expansion(&self) -> bool {
        self.state == PrefixState::Expanded
    }
}

impl ExpansionPolicy {
    pub fn new(alphabet: Alphabet, result_ceiling: u64, ceiling_margin: u64) -> Self {
        Self {
            alphabet,
            result_ceiling,
            ceiling_margin,
            enabled: true,
            max_prefix_length: 0,
        }
    }

    /// Builds the policy from the crawler section of the config
    pub fn from_config(config: &Config) -> Result<Self, SweepError> {
        let crawler = &config.crawler;
        Ok(Self::new(
            config.alphabet()?,
            u64::from(crawler.result_ceiling),
            u64::from(crawler.ceiling_margin),
        )
        .with_enabled(crawler.smart_expansion)
        .with_max_prefix_length(crawler.max_prefix_length as usize))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_prefix_length(mut self, max_prefix_length: usize) -> Self {
        self.max_prefix_length = max_prefix_length;
        self
    }

    /// Record count at which a prefix counts as truncated
    pub fn threshold(&self) -> u64 {
        self.result_ceiling.saturating_sub(self.ceiling_margin)
    }

    /// True when `records_found` reaches the truncation threshold
    pub fn should_expand(&self, records_found: u64) -> bool {
        self.enabled && records_found >= self.threshold()
    }

    fn at_length_cap(&self, prefix: &Prefix) -> bool {
        self.max_prefix_length > 0 && prefix.len() >= self.max_prefix_length
    }

    /// Folds a prefix result into the frontier
    ///
    /// Marks the prefix terminal and, when it was truncated, queues every
    /// child not already seen. Failed prefixes are neither retried nor expanded.
    ///
    /// # Arguments
    ///
    /// * `result` - The drain outcome of an in-flight prefix
    /// * `frontier` - The frontier that dispatched it
    ///
    /// # Returns
    ///
    /// * `Ok(Evaluation)` - The recorded verdict and the children added
    /// * `Err(SweepError)` - The frontier's bookkeeping was violated
    pub fn evaluate(
        &self,
        result: &PrefixResult,
        frontier: &mut Frontier,
    ) -> Result<Evaluation, SweepError> {
        let prefix = result.prefix.clone();

        if result.is_failed() {
            frontier.complete(&prefix, PrefixState::Failed)?;
            return Ok(Evaluation {
                prefix,
                state: PrefixState::Failed,
                children: Vec::new(),
            });
        }

        if !self.should_expand(result.records_found) {
            frontier.complete(&prefix, PrefixState::Completed)?;
            return Ok(Evaluation {
                prefix,
                state: PrefixState::Completed,
                children: Vec::new(),
            });
        }

        if self.at_length_cap(&prefix) {
            tracing::warn!(
                "Prefix '{}' looks truncated ({} records) but is at the length cap of {}",
                prefix,
                result.records_found,
                self.max_prefix_length
            );
            frontier.complete(&prefix, PrefixState::Completed)?;
            return Ok(Evaluation {
                prefix,
                state: PrefixState::Completed,
                children: Vec::new(),
            });
        }

        frontier.complete(&prefix, PrefixState::Expanded)?;
        let children = frontier.extend(prefix.children(&self.alphabet));

        tracing::info!(
            "Expanding '{}' ({} records >= {}): {} children queued",
            prefix,
            result.records_found,
            self.threshold(),
            children.len()
        );

        Ok(Evaluation {
            prefix,
            state: PrefixState::Expanded,
            children,
        })
    }
}
