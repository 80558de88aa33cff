//! Caller tiers and the limit multiplier applied to each.

use std::fmt;

/// Multiplier applied to every window's base limit for privileged callers.
pub const DEFAULT_PRIVILEGED_MULTIPLIER: u32 = 5;

/// Caller classification supplied by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tier {
    #[default]
    Normal,
    /// Administrator identities.
    Privileged,
}

impl Tier {
    pub fn from_privileged(is_privileged: bool) -> Self {
        if is_privileged {
            Tier::Privileged
        } else {
            Tier::Normal
        }
    }

    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Normal => "normal",
            Tier::Privileged => "privileged",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a tier to the multiplier applied to base limits.
///
/// The privileged flag is trusted as-is; no authentication happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    privileged_multiplier: u32,
}

impl TierPolicy {
    /// Caller must ensure `privileged_multiplier > 0`; `LimiterConfig` validates this.
    pub(crate) fn new(privileged_multiplier: u32) -> Self {
        Self { privileged_multiplier }
    }

    pub fn multiplier(&self, is_privileged: bool) -> u32 {
        self.multiplier_for(Tier::from_privileged(is_privileged))
    }

    pub fn multiplier_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Normal => 1,
            Tier::Privileged => self.privileged_multiplier,
        }
    }

    /// `base_limit * multiplier`, saturating.
    pub fn effective_limit(&self, base_limit: u64, tier: Tier) -> u64 {
        base_limit.saturating_mul(u64::from(self.multiplier_for(tier)))
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PRIVILEGED_MULTIPLIER)
    }
}
