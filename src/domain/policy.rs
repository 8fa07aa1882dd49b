//! Freshness policies as data.
//!
//! Every access path is governed by one [`FreshnessPolicy`] record. The six
//! variants differ only in the values of the record; a single evaluator in
//! `application::freshness` interprets them.

use std::{fmt, str::FromStr};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

/// The six access paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyId {
    /// A: regenerated at most once per interval.
    Periodic,
    /// B: regenerated on every request.
    AlwaysFresh,
    /// C: periodic, but a request-identity signal forces a bypass.
    SignalBypassed,
    /// D: periodic with redirect and forced-reject rules.
    ControlFlow,
    /// E: a few ids precomputed, the rest added on first access.
    PartialPrecompute,
    /// F: periodic, served through the client transport.
    AlternateSource,
}

impl PolicyId {
    pub const ALL: [PolicyId; 6] = [
        PolicyId::Periodic,
        PolicyId::AlwaysFresh,
        PolicyId::SignalBypassed,
        PolicyId::ControlFlow,
        PolicyId::PartialPrecompute,
        PolicyId::AlternateSource,
    ];

    /// Route label used by the delivery surface (`v1`..`v6`).
    pub fn label(&self) -> &'static str {
        match self {
            PolicyId::Periodic => "v1",
            PolicyId::AlwaysFresh => "v2",
            PolicyId::SignalBypassed => "v3",
            PolicyId::ControlFlow => "v4",
            PolicyId::PartialPrecompute => "v5",
            PolicyId::AlternateSource => "v6",
        }
    }

    pub fn letter(&self) -> &'static str {
        match self {
            PolicyId::Periodic => "A",
            PolicyId::AlwaysFresh => "B",
            PolicyId::SignalBypassed => "C",
            PolicyId::ControlFlow => "D",
            PolicyId::PartialPrecompute => "E",
            PolicyId::AlternateSource => "F",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyId::Periodic => "periodic",
            PolicyId::AlwaysFresh => "always_fresh",
            PolicyId::SignalBypassed => "signal_bypassed",
            PolicyId::ControlFlow => "control_flow",
            PolicyId::PartialPrecompute => "partial_precompute",
            PolicyId::AlternateSource => "alternate_source",
        }
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolicy(pub String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown freshness policy `{}`", self.0)
    }
}

impl std::error::Error for UnknownPolicy {}

impl FromStr for PolicyId {
    type Err = UnknownPolicy;

    /// Accepts the route label (`v4`), the letter (`D`) or the name
    /// (`control_flow`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        PolicyId::ALL
            .into_iter()
            .find(|id| {
                id.label().eq_ignore_ascii_case(needle)
                    || id.letter().eq_ignore_ascii_case(needle)
                    || id.name().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| UnknownPolicy(value.to_string()))
    }
}

/// How long a generated view may be served before regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Never stored; every request regenerates.
    None,
    /// Stored and served until the interval has elapsed.
    Interval(Duration),
    /// Stored and served for the life of the process.
    Indefinite,
}

/// Control-flow rules evaluated around aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchRule {
    /// Evaluated before any I/O.
    Redirect { from: u32, to: u32 },
    /// Evaluated after a successful aggregation; the content exists but is hidden.
    ForceReject { id: u32 },
}

/// Which ids are generated ahead of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Nothing precomputed.
    OnDemand,
    /// Every addressable id precomputed.
    Full,
    /// The first `precomputed` ids precomputed; others added on first access.
    Partial { precomputed: u32 },
}

/// Which transport serves a policy's lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Fetch,
    Client,
}

/// Tunables shared by the policy table.
#[derive(Debug, Clone)]
pub struct PolicyParams {
    pub interval: Duration,
    pub partial_precompute: u32,
    pub bypass_signal: String,
    /// Id hidden by the control-flow policy even when it exists.
    pub forced_reject_id: u32,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            interval: Duration::seconds(60),
            partial_precompute: 10,
            bypass_signal: "session".to_string(),
            forced_reject_id: FORCED_REJECT_ID,
        }
    }
}

pub const REDIRECT_FROM_ID: u32 = 999;
pub const REDIRECT_TO_ID: u32 = 1;
pub const FORCED_REJECT_ID: u32 = 9999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub id: PolicyId,
    pub lifetime: Lifetime,
    pub bypass_signal: Option<String>,
    pub branch_rules: Vec<BranchRule>,
    pub coverage: Coverage,
    pub source: SourceKind,
}

impl FreshnessPolicy {
    pub fn build(id: PolicyId, params: &PolicyParams) -> Self {
        let periodic = Self {
            id,
            lifetime: Lifetime::Interval(params.interval),
            bypass_signal: None,
            branch_rules: Vec::new(),
            coverage: Coverage::Full,
            source: SourceKind::Fetch,
        };

        match id {
            PolicyId::Periodic => periodic,
            PolicyId::AlwaysFresh => Self {
                lifetime: Lifetime::None,
                coverage: Coverage::OnDemand,
                ..periodic
            },
            PolicyId::SignalBypassed => Self {
                bypass_signal: Some(params.bypass_signal.clone()),
                ..periodic
            },
            PolicyId::ControlFlow => Self {
                branch_rules: vec![
                    BranchRule::Redirect {
                        from: REDIRECT_FROM_ID,
                        to: REDIRECT_TO_ID,
                    },
                    BranchRule::ForceReject {
                        id: params.forced_reject_id,
                    },
                ],
                ..periodic
            },
            PolicyId::PartialPrecompute => Self {
                lifetime: Lifetime::Indefinite,
                coverage: Coverage::Partial {
                    precomputed: params.partial_precompute,
                },
                ..periodic
            },
            PolicyId::AlternateSource => Self {
                source: SourceKind::Client,
                ..periodic
            },
        }
    }

    pub fn redirect_target(&self, post_id: u32) -> Option<u32> {
        self.branch_rules.iter().find_map(|rule| match *rule {
            BranchRule::Redirect { from, to } if from == post_id => Some(to),
            _ => None,
        })
    }

    pub fn is_withheld(&self, post_id: u32) -> bool {
        self.branch_rules
            .iter()
            .any(|rule| matches!(*rule, BranchRule::ForceReject { id } if id == post_id))
    }

    pub fn stores_views(&self) -> bool {
        !matches!(self.lifetime, Lifetime::None)
    }

    /// Whether a view generated at `generated_at` may still be served at `now`.
    pub fn is_fresh(&self, generated_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        match self.lifetime {
            Lifetime::None => false,
            Lifetime::Interval(interval) => now - generated_at < interval,
            Lifetime::Indefinite => true,
        }
    }

    /// Select the ids to precompute from the full addressable listing.
    pub fn precompute_ids(&self, addressable: &[u32]) -> Vec<u32> {
        match self.coverage {
            Coverage::OnDemand => Vec::new(),
            Coverage::Full => addressable.to_vec(),
            Coverage::Partial { precomputed } => addressable
                .iter()
                .copied()
                .take(precomputed as usize)
                .collect(),
        }
    }
}

/// All six policies built from one set of parameters.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: Vec<FreshnessPolicy>,
}

impl PolicyTable {
    pub fn new(params: &PolicyParams) -> Self {
        Self {
            policies: PolicyId::ALL
                .into_iter()
                .map(|id| FreshnessPolicy::build(id, params))
                .collect(),
        }
    }

    pub fn get(&self, id: PolicyId) -> &FreshnessPolicy {
        // `policies` is built from `PolicyId::ALL` in declaration order.
        &self.policies[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FreshnessPolicy> {
        self.policies.iter()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new(&PolicyParams::default())
    }
}
