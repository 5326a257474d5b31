//! Run configuration surface.
//!
//! `RunOptions` is a consuming-`with_*` builder, in the style of the
//! teacher's `ClientConfig`/`CompletionRequest`/`RoutingContext`. Strategy is
//! the top-level enumeration (per the "configuration composition" design
//! note); strategy-agnostic options live directly on `RunOptions`,
//! strategy-specific ones are grouped under `StrategyOptions`.

use crate::cancellation::CancellationToken;
use std::time::Duration;

/// Which pipeline variant a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ClaimBased,
    Hybrid,
    Accurate,
}

/// Strategy-specific knobs. Each variant only carries the fields that
/// strategy actually consumes.
#[derive(Debug, Clone)]
pub enum StrategyOptions {
    ClaimBased {
        claim_batch: usize,
        judge_batch: usize,
    },
    Hybrid {
        adjudicator_pair_batch: usize,
        adjudicator_concurrency: usize,
    },
    Accurate {
        adjudicator_pair_batch: usize,
        adjudicator_concurrency: usize,
        consistency_votes: usize,
        verification_enabled: bool,
        verification_confidence: f64,
    },
}

impl StrategyOptions {
    pub fn claim_based_default() -> Self {
        Self::ClaimBased {
            claim_batch: 10,
            judge_batch: 10,
        }
    }

    pub fn hybrid_default() -> Self {
        Self::Hybrid {
            adjudicator_pair_batch: 50,
            adjudicator_concurrency: 1,
        }
    }

    pub fn accurate_default() -> Self {
        Self::Accurate {
            adjudicator_pair_batch: 50,
            adjudicator_concurrency: 1,
            consistency_votes: 3,
            verification_enabled: true,
            verification_confidence: 0.90,
        }
    }
}

/// Options controlling a single `run_conflict_detection` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub strategy: Strategy,
    pub strategy_options: StrategyOptions,
    pub model: String,
    pub confidence_threshold: f64,
    pub keep_alive: String,
    pub request_timeout: Duration,
    pub run_timeout: Option<Duration>,
    pub cancellation_token: CancellationToken,
}

impl RunOptions {
    pub fn new(strategy: Strategy, model: impl Into<String>) -> Self {
        let strategy_options = match strategy {
            Strategy::ClaimBased => StrategyOptions::claim_based_default(),
            Strategy::Hybrid => StrategyOptions::hybrid_default(),
            Strategy::Accurate => StrategyOptions::accurate_default(),
        };
        Self {
            strategy,
            strategy_options,
            model: model.into(),
            confidence_threshold: 0.85,
            keep_alive: "30m".to_string(),
            request_timeout: Duration::from_secs(300),
            run_timeout: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_strategy_options(mut self, opts: StrategyOptions) -> Self {
        self.strategy_options = opts;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new(Strategy::ClaimBased, "default-model")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configuration_surface() {
        let opts = RunOptions::default();
        assert_eq!(opts.confidence_threshold, 0.85);
        assert_eq!(opts.keep_alive, "30m");
        assert_eq!(opts.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn accurate_strategy_defaults() {
        let opts = RunOptions::new(Strategy::Accurate, "m");
        match opts.strategy_options {
            StrategyOptions::Accurate {
                consistency_votes,
                verification_enabled,
                verification_confidence,
                ..
            } => {
                assert_eq!(consistency_votes, 3);
                assert!(verification_enabled);
                assert_eq!(verification_confidence, 0.90);
            }
            _ => panic!("expected Accurate strategy options"),
        }
    }
}
