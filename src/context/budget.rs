// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context budget tracking
//!
//! Token usage is estimated from character counts, so the numbers are
//! approximate but deterministic: the same history always yields the same
//! estimate. Classification uses integer arithmetic only.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Settings;
use crate::llm::message::Message;

/// How full the context window is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageBand {
    Normal,
    Warning,
    Danger,
    Over,
}

impl UsageBand {
    pub fn label(&self) -> &'static str {
        match self {
            UsageBand::Normal => "normal",
            UsageBand::Warning => "warning",
            UsageBand::Danger => "danger",
            UsageBand::Over => "over budget",
        }
    }
}

impl fmt::Display for UsageBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time usage of the context window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextUsage {
    pub used: usize,
    pub ceiling: usize,
    pub band: UsageBand,
}

impl ContextUsage {
    /// Whole-number percentage of the ceiling in use
    pub fn percent(&self) -> usize {
        if self.ceiling == 0 {
            return if self.used == 0 { 0 } else { 100 };
        }
        self.used.saturating_mul(100) / self.ceiling
    }
}

impl fmt::Display for ContextUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} tokens ({}%, {})",
            self.used,
            self.ceiling,
            self.percent(),
            self.band
        )
    }
}

/// Estimator and classifier for one configured ceiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBudget {
    pub ceiling: usize,
    pub warning_pct: u8,
    pub danger_pct: u8,
    pub chars_per_token: usize,
    pub message_overhead: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ContextBudget {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let context = &settings.context;
        Self {
            ceiling: context.max_context_tokens,
            warning_pct: context.warning_pct,
            danger_pct: context.danger_pct,
            chars_per_token: context.chars_per_token,
            message_overhead: context.message_overhead_tokens,
        }
    }

    /// Estimated tokens for a single message
    pub fn estimate_message(&self, message: &Message) -> usize {
        message.char_len() / self.chars_per_token.max(1) + self.message_overhead
    }

    /// Estimated tokens for a whole history
    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_message(m))
            .fold(0usize, usize::saturating_add)
    }

    /// Band for `used` tokens against `ceiling`
    pub fn classify(&self, used: usize, ceiling: usize) -> UsageBand {
        if used > ceiling {
            return UsageBand::Over;
        }
        let scaled = used.saturating_mul(100);
        let at = |pct: u8| scaled >= ceiling.saturating_mul(pct as usize);

        if at(self.danger_pct) {
            UsageBand::Danger
        } else if at(self.warning_pct) {
            UsageBand::Warning
        } else {
            UsageBand::Normal
        }
    }

    /// Estimate and classify `messages` against the configured ceiling
    pub fn snapshot(&self, messages: &[Message]) -> ContextUsage {
        let used = self.estimate_tokens(messages);
        ContextUsage {
            used,
            ceiling: self.ceiling,
            band: self.classify(used, self.ceiling),
        }
    }
}

/// Whether history should be compacted before the next model call
pub fn should_summarize(band: UsageBand) -> bool {
    matches!(band, UsageBand::Danger | UsageBand::Over)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn budget() -> ContextBudget {
        ContextBudget::new(9000)
    }

    #[test]
    fn test_estimate_is_chars_over_ratio_plus_overhead() {
        let b = budget();
        // 40 chars -> 10 tokens + 4 overhead
        let msg = Message::user("a".repeat(40));
        assert_eq!(b.estimate_message(&msg), 14);
        assert_eq!(b.estimate_tokens(&[msg.clone(), msg]), 28);
        assert_eq!(b.estimate_tokens(&[]), 0);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        let b = budget();
        let msg = Message::user("é".repeat(8));
        assert_eq!(b.estimate_message(&msg), 2 + 4);
    }

    #[test]
    fn test_band_boundaries() {
        let b = budget();
        assert_eq!(b.classify(0, 9000), UsageBand::Normal);
        assert_eq!(b.classify(4499, 9000), UsageBand::Normal);
        assert_eq!(b.classify(4500, 9000), UsageBand::Warning);
        assert_eq!(b.classify(7199, 9000), UsageBand::Warning);
        assert_eq!(b.classify(7200, 9000), UsageBand::Danger);
        assert_eq!(b.classify(9000, 9000), UsageBand::Danger);
        assert_eq!(b.classify(9001, 9000), UsageBand::Over);
    }

    #[test]
    fn test_zero_ceiling_does_not_panic() {
        let b = budget();
        assert_eq!(b.classify(0, 0), UsageBand::Danger);
        assert_eq!(b.classify(1, 0), UsageBand::Over);
        let usage = ContextUsage {
            used: 3,
            ceiling: 0,
            band: UsageBand::Over,
        };
        assert_eq!(usage.percent(), 100);
    }

    #[test]
    fn test_should_summarize() {
        assert!(!should_summarize(UsageBand::Normal));
        assert!(!should_summarize(UsageBand::Warning));
        assert!(should_summarize(UsageBand::Danger));
        assert!(should_summarize(UsageBand::Over));
    }

    #[test]
    fn test_snapshot_display() {
        let b = ContextBudget::new(100);
        let usage = b.snapshot(&[Message::user("x".repeat(200))]);
        assert_eq!(usage.used, 54);
        assert_eq!(usage.band, UsageBand::Warning);
        assert_eq!(usage.to_string(), "54/100 tokens (54%, warning)");
    }

    proptest! {
        #[test]
        fn prop_classify_matches_band_definition(used in 0usize..20_000, ceiling in 0usize..20_000) {
            let band = budget().classify(used, ceiling);
            let expected = if used > ceiling {
                UsageBand::Over
            } else if used * 100 >= ceiling * 80 {
                UsageBand::Danger
            } else if used * 100 >= ceiling * 50 {
                UsageBand::Warning
            } else {
                UsageBand::Normal
            };
            prop_assert_eq!(band, expected);
        }

        #[test]
        fn prop_band_is_monotonic_in_usage(used in 0usize..10_000, extra in 0usize..10_000, ceiling in 1usize..10_000) {
            let b = budget();
            prop_assert!(b.classify(used, ceiling) <= b.classify(used + extra, ceiling));
        }

        #[test]
        fn prop_estimate_is_additive(a in ".{0,200}", c in ".{0,200}") {
            let b = budget();
            let ma = Message::user(a);
            let mc = Message::assistant(c);
            prop_assert_eq!(
                b.estimate_tokens(&[ma.clone(), mc.clone()]),
                b.estimate_message(&ma) + b.estimate_message(&mc)
            );
        }
    }
}
