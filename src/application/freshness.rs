//! Per-request freshness evaluation.
//!
//! One evaluator interprets every [`FreshnessPolicy`] record:
//!
//! 1. redirect rules, before any I/O
//! 2. bypass signal
//! 3. stored view still fresh: serve it
//! 4. otherwise aggregate under the key's regeneration lock and store
//! 5. forced-reject rules, after a successful aggregation
//!
//! Content that does not exist becomes `Rejected(NotFound)`. An upstream
//! status failure is returned as [`ServeError`] and never cached.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::{TryStreamExt, stream};
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        aggregate::Aggregator,
        clock::Clock,
        content::{ContentError, ContentService},
        source::SourceError,
    },
    cache::{StoredView, ViewKey, ViewOrigin, ViewStore},
    domain::{
        entities::{AggregateView, Post},
        policy::{Coverage, FreshnessPolicy, PolicyId, PolicyTable, SourceKind},
    },
};

/// One incoming request: the post and the identity signals it carries.
#[derive(Debug, Clone, Default)]
pub struct ServeRequest {
    pub post_id: u32,
    signals: HashSet<String>,
}

impl ServeRequest {
    pub fn new(post_id: u32) -> Self {
        Self {
            post_id,
            signals: HashSet::new(),
        }
    }

    /// Mark a signal as present. Only presence matters, never the value.
    pub fn with_signal(mut self, name: impl Into<String>) -> Self {
        self.signals.insert(name.into());
        self
    }

    pub fn has_signal(&self, name: &str) -> bool {
        self.signals.contains(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeState {
    /// Served from the store without regeneration.
    Cached,
    /// Generated for this request (and stored, if the policy stores views).
    Regenerated,
    /// Generated for this request because the bypass signal was present.
    Bypassed,
    /// Generated on first access for an id outside the precomputed set.
    DynamicallyAdded,
}

impl ServeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServeState::Cached => "cached",
            ServeState::Regenerated => "regenerated",
            ServeState::Bypassed => "bypassed",
            ServeState::DynamicallyAdded => "dynamically_added",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The post does not exist.
    NotFound,
    /// The post exists but a policy rule hides it.
    Withheld,
    /// The source answered with a payload or connection fault.
    Fault,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotFound => "not_found",
            RejectReason::Withheld => "withheld",
            RejectReason::Fault => "fault",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServedView {
    pub view: Arc<AggregateView>,
    pub generated_at: OffsetDateTime,
    pub policy: PolicyId,
    pub state: ServeState,
    /// How the served view was first produced.
    pub origin: ViewOrigin,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Served(ServedView),
    Redirected {
        policy: PolicyId,
        target_id: u32,
    },
    Rejected {
        policy: PolicyId,
        post_id: u32,
        reason: RejectReason,
    },
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("content source unavailable while serving policy {policy}")]
    Source {
        policy: PolicyId,
        #[source]
        source: SourceError,
    },
    /// A transport or payload fault outside a single post lookup, such as
    /// while listing. Reported like an absent resource.
    #[error("content source fault while serving policy {policy}")]
    Fault {
        policy: PolicyId,
        #[source]
        source: SourceError,
    },
}

/// Result of precomputing one policy's coverage set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrecomputeReport {
    pub policy: PolicyId,
    pub generated: usize,
    pub skipped: usize,
}

/// The content services backing each source kind.
#[derive(Clone)]
pub struct Sources {
    pub fetch: Arc<ContentService>,
    pub client: Arc<ContentService>,
}

enum Generated {
    View(AggregateView),
    Rejected(RejectReason),
}

pub struct FreshnessEngine {
    policies: PolicyTable,
    store: Arc<ViewStore>,
    fetch: Aggregator,
    client: Aggregator,
    clock: Arc<dyn Clock>,
}

impl FreshnessEngine {
    pub fn new(
        policies: PolicyTable,
        store: Arc<ViewStore>,
        sources: Sources,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policies,
            store,
            fetch: Aggregator::new(sources.fetch),
            client: Aggregator::new(sources.client),
            clock,
        }
    }

    pub fn policy(&self, id: PolicyId) -> &FreshnessPolicy {
        self.policies.get(id)
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn store(&self) -> &Arc<ViewStore> {
        &self.store
    }

    fn aggregator(&self, kind: SourceKind) -> &Aggregator {
        match kind {
            SourceKind::Fetch => &self.fetch,
            SourceKind::Client => &self.client,
        }
    }

    /// Posts the policy exposes in its listing: the precomputed prefix for a
    /// partial policy, every addressable post otherwise.
    pub async fn list(&self, id: PolicyId) -> Result<Vec<Post>, ServeError> {
        let posts = self.addressable(id).await?;
        Ok(match self.policies.get(id).coverage {
            Coverage::Partial { precomputed } => {
                posts.into_iter().take(precomputed as usize).collect()
            }
            Coverage::OnDemand | Coverage::Full => posts,
        })
    }

    /// All addressable posts, resolved through the policy's source.
    async fn addressable(&self, id: PolicyId) -> Result<Vec<Post>, ServeError> {
        let policy = self.policies.get(id);
        self.aggregator(policy.source)
            .content()
            .resolve_posts()
            .await
            .map_err(|err| source_failure(id, None, err))
    }

    pub async fn serve(&self, id: PolicyId, request: &ServeRequest) -> Result<Outcome, ServeError> {
        let policy = self.policies.get(id);
        let post_id = request.post_id;

        if let Some(target_id) = policy.redirect_target(post_id) {
            counter!("freshline_view_redirect_total", "policy" => id.label()).increment(1);
            info!(
                target = "freshline::engine",
                policy = %id,
                post_id,
                target_id,
                "redirecting request"
            );
            return Ok(Outcome::Redirected {
                policy: id,
                target_id,
            });
        }

        let bypassed = policy
            .bypass_signal
            .as_deref()
            .is_some_and(|signal| request.has_signal(signal));

        if bypassed || !policy.stores_views() {
            let state = if bypassed {
                ServeState::Bypassed
            } else {
                ServeState::Regenerated
            };
            return match self.generate(policy, post_id).await? {
                Generated::View(view) => Ok(self.served(
                    id,
                    Arc::new(view),
                    self.clock.now(),
                    state,
                    ViewOrigin::OnDemand,
                )),
                Generated::Rejected(reason) => Ok(self.rejected(id, post_id, reason)),
            };
        }

        let key = ViewKey::new(id, post_id);
        if let Some(outcome) = self.fresh_from_store(policy, &key) {
            return Ok(outcome);
        }

        let lock = self.store.regeneration_lock(key);
        let _guard = lock.lock().await;
        // Another request may have regenerated while this one waited.
        match self.fresh_from_store(policy, &key) {
            Some(outcome) => Ok(outcome),
            None => self.regenerate(policy, key).await,
        }
    }

    fn fresh_from_store(&self, policy: &FreshnessPolicy, key: &ViewKey) -> Option<Outcome> {
        let stored = self.store.get(key)?;
        if !policy.is_fresh(stored.generated_at, self.clock.now()) {
            return None;
        }
        Some(self.served(
            policy.id,
            stored.view,
            stored.generated_at,
            ServeState::Cached,
            stored.origin,
        ))
    }

    async fn regenerate(&self, policy: &FreshnessPolicy, key: ViewKey) -> Result<Outcome, ServeError> {
        let first_access = !self.store.contains(&key);
        match self.generate(policy, key.post_id).await? {
            Generated::View(view) => {
                let view = Arc::new(view);
                let generated_at = self.clock.now();
                self.store.put(
                    key,
                    StoredView {
                        view: Arc::clone(&view),
                        generated_at,
                        origin: ViewOrigin::OnDemand,
                    },
                );
                let state = if first_access && !precomputes(policy, key.post_id) {
                    ServeState::DynamicallyAdded
                } else {
                    ServeState::Regenerated
                };
                Ok(self.served(policy.id, view, generated_at, state, ViewOrigin::OnDemand))
            }
            Generated::Rejected(reason) => {
                if reason == RejectReason::NotFound {
                    self.store.remove(&key);
                }
                Ok(self.rejected(policy.id, key.post_id, reason))
            }
        }
    }

    /// Aggregate one view and apply the post-aggregation rules.
    async fn generate(&self, policy: &FreshnessPolicy, post_id: u32) -> Result<Generated, ServeError> {
        match self.aggregator(policy.source).build_view(post_id).await {
            Ok(_) if policy.is_withheld(post_id) => Ok(Generated::Rejected(RejectReason::Withheld)),
            Ok(view) => Ok(Generated::View(view)),
            Err(ContentError::NotFound { .. }) => Ok(Generated::Rejected(RejectReason::NotFound)),
            Err(ContentError::Source(err)) => match source_failure(policy.id, Some(post_id), err) {
                ServeError::Fault { .. } => Ok(Generated::Rejected(RejectReason::Fault)),
                unavailable => Err(unavailable),
            },
        }
    }

    fn served(
        &self,
        policy: PolicyId,
        view: Arc<AggregateView>,
        generated_at: OffsetDateTime,
        state: ServeState,
        origin: ViewOrigin,
    ) -> Outcome {
        counter!(
            "freshline_view_served_total",
            "policy" => policy.label(),
            "state" => state.as_str()
        )
        .increment(1);
        debug!(
            target = "freshline::engine",
            policy = %policy,
            post_id = view.post.id,
            state = state.as_str(),
            "view served"
        );
        Outcome::Served(ServedView {
            view,
            generated_at,
            policy,
            state,
            origin,
        })
    }

    fn rejected(&self, policy: PolicyId, post_id: u32, reason: RejectReason) -> Outcome {
        counter!(
            "freshline_view_rejected_total",
            "policy" => policy.label(),
            "reason" => reason.as_str()
        )
        .increment(1);
        debug!(
            target = "freshline::engine",
            policy = %policy,
            post_id,
            reason = reason.as_str(),
            "request rejected"
        );
        Outcome::Rejected {
            policy,
            post_id,
            reason,
        }
    }

    /// Generate and store every view in the policy's coverage set.
    ///
    /// Ids that turn out not to exist (or are withheld) are skipped; an
    /// unavailable source aborts the run.
    pub async fn precompute(
        &self,
        id: PolicyId,
        concurrency: usize,
    ) -> Result<PrecomputeReport, ServeError> {
        let policy = self.policies.get(id);
        if !policy.stores_views() {
            return Ok(PrecomputeReport {
                policy: id,
                generated: 0,
                skipped: 0,
            });
        }

        let listing: Vec<u32> = self
            .addressable(id)
            .await?
            .iter()
            .map(|post| post.id)
            .collect();
        let ids = policy.precompute_ids(&listing);
        info!(
            target = "freshline::engine",
            policy = %id,
            count = ids.len(),
            concurrency,
            "precomputing views"
        );

        let generated = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        stream::iter(ids.into_iter().map(Ok::<u32, ServeError>))
            .try_for_each_concurrent(Some(concurrency.max(1)), |post_id| {
                let generated = &generated;
                let skipped = &skipped;
                async move {
                    if self.precompute_one(policy, post_id).await? {
                        generated.fetch_add(1, Ordering::Relaxed);
                    } else {
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(())
                }
            })
            .await?;

        let report = PrecomputeReport {
            policy: id,
            generated: generated.into_inner(),
            skipped: skipped.into_inner(),
        };
        info!(
            target = "freshline::engine",
            policy = %id,
            generated = report.generated,
            skipped = report.skipped,
            "precompute finished"
        );
        Ok(report)
    }

    async fn precompute_one(&self, policy: &FreshnessPolicy, post_id: u32) -> Result<bool, ServeError> {
        let key = ViewKey::new(policy.id, post_id);
        let lock = self.store.regeneration_lock(key);
        let _guard = lock.lock().await;
        match self.generate(policy, post_id).await? {
            Generated::View(view) => {
                self.store.put(
                    key,
                    StoredView {
                        view: Arc::new(view),
                        generated_at: self.clock.now(),
                        origin: ViewOrigin::Precomputed,
                    },
                );
                Ok(true)
            }
            Generated::Rejected(reason) => {
                warn!(
                    target = "freshline::engine",
                    policy = %policy.id,
                    post_id,
                    reason = reason.as_str(),
                    "skipping precompute"
                );
                Ok(false)
            }
        }
    }

    /// Precompute every policy in turn.
    pub async fn precompute_all(&self, concurrency: usize) -> Result<Vec<PrecomputeReport>, ServeError> {
        let mut reports = Vec::with_capacity(PolicyId::ALL.len());
        for id in PolicyId::ALL {
            reports.push(self.precompute(id, concurrency).await?);
        }
        Ok(reports)
    }
}

/// Unavailable sources fail the request. Any other source failure is a
/// fault, logged at error level and reported like an absent resource.
fn source_failure(policy: PolicyId, post_id: Option<u32>, err: SourceError) -> ServeError {
    match err {
        SourceError::Unavailable { .. } => {
            warn!(
                target = "freshline::engine",
                policy = %policy,
                post_id = ?post_id,
                error = %err,
                "content source unavailable"
            );
            ServeError::Source {
                policy,
                source: err,
            }
        }
        SourceError::Transport { .. } | SourceError::Decode { .. } => {
            error!(
                target = "freshline::engine",
                policy = %policy,
                post_id = ?post_id,
                error = %err,
                "content source fault"
            );
            ServeError::Fault {
                policy,
                source: err,
            }
        }
    }
}

/// Whether `post_id` belongs to the ids generated ahead of requests.
fn precomputes(policy: &FreshnessPolicy, post_id: u32) -> bool {
    match policy.coverage {
        Coverage::OnDemand => false,
        Coverage::Full => true,
        Coverage::Partial { precomputed } => (1..=precomputed).contains(&post_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::PolicyParams;

    #[test]
    fn signals_match_by_name_only() {
        let request = ServeRequest::new(3).with_signal("session");
        assert!(request.has_signal("session"));
        assert!(!request.has_signal("Session"));
        assert!(!ServeRequest::new(3).has_signal("session"));
    }

    #[test]
    fn partial_coverage_marks_only_leading_ids_precomputed() {
        let table = PolicyTable::new(&PolicyParams::default());
        let partial = table.get(PolicyId::PartialPrecompute);
        assert!(precomputes(partial, 1));
        assert!(precomputes(partial, 10));
        assert!(!precomputes(partial, 11));
        assert!(precomputes(table.get(PolicyId::Periodic), 400));
        assert!(!precomputes(table.get(PolicyId::AlwaysFresh), 1));
    }
}
