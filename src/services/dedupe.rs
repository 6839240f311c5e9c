use crate::models::{
    DedupeError, DedupeReport, EligibilityFilter, GroupDecision, KeyTally, Record, RecordId,
    StoreError,
};
use crate::services::storage::AlertStore;
use crate::utils::group_by_key;
use chrono::Utc;
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Decisions for one pass over a set of records, before anything is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupePlan {
    /// Distinct eligible records considered.
    pub eligible: usize,
    /// One entry per group holding more than one eligible record, ordered by key.
    pub decisions: Vec<GroupDecision>,
}

impl DedupePlan {
    /// Every id slated for removal, across all groups.
    #[must_use]
    pub fn to_delete(&self) -> Vec<RecordId> {
        self.decisions
            .iter()
            .flat_map(|d| d.deleted_ids.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn planned_deletions(&self) -> usize {
        self.decisions.iter().map(|d| d.deleted_ids.len()).sum()
    }
}

/// Newest first. Equal timestamps fall back to the greater id, so the
/// latest-inserted record wins for ObjectIds and sequential ids.
fn newest_first(a: &Record, b: &Record) -> Ordering {
    b.detected_at
        .cmp(&a.detected_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Group the eligible `records` by key and pick one keeper per group.
///
/// Records that fail `eligible` are ignored entirely. A record id seen more
/// than once is considered once.
pub fn plan<P>(records: &[Record], eligible: P) -> DedupePlan
where
    P: Fn(&Record) -> bool,
{
    let mut seen: HashSet<&RecordId> = HashSet::new();
    let candidates: Vec<&Record> = records
        .iter()
        .filter(|r| eligible(*r))
        .filter(|r| seen.insert(&r.id))
        .collect();

    let decisions = group_by_key(candidates.iter().copied(), |r| r.key.clone())
        .into_iter()
        .filter_map(|(key, mut members)| {
            if members.len() < 2 {
                return None;
            }
            members.sort_by(|a, b| newest_first(a, b));
            let (keeper, rest) = members.split_first()?;
            Some(GroupDecision {
                key,
                kept_id: keeper.id.clone(),
                kept_at: keeper.detected_at,
                deleted_ids: rest.iter().map(|r| r.id.clone()).collect(),
            })
        })
        .collect();

    DedupePlan {
        eligible: candidates.len(),
        decisions,
    }
}

/// Count records per leading key value, largest first.
#[must_use]
pub fn tally_leading<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<KeyTally> {
    let groups = group_by_key(records, |r| r.key.leading().map(str::to_string));
    let mut tallies: Vec<KeyTally> = groups
        .into_iter()
        .map(|(name, members)| KeyTally {
            name,
            count: members.len(),
        })
        .collect();
    tallies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    tallies
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DedupeOptions {
    /// Compute decisions without deleting anything.
    pub dry_run: bool,
    /// Reads give up at this instant; once it has passed, the delete step
    /// is never started.
    pub deadline: Option<Instant>,
}

impl DedupeOptions {
    /// Options whose deadline lies `budget` from now. A budget too large to
    /// represent means no deadline.
    #[must_use]
    pub fn with_budget(dry_run: bool, budget: Option<Duration>) -> Self {
        Self {
            dry_run,
            deadline: budget.and_then(|budget| Instant::now().checked_add(budget)),
        }
    }
}

/// Runs one deduplication pass against a store.
///
/// Callers must not run two passes against the same collection at once.
pub struct Deduplicator<'a, S> {
    store: &'a S,
    filter: &'a EligibilityFilter,
}

impl<'a, S: AlertStore> Deduplicator<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, filter: &'a EligibilityFilter) -> Self {
        Self { store, filter }
    }

    /// Count, read, plan, bulk delete, recount.
    ///
    /// # Errors
    /// - `DedupeError::StoreUnavailable` if a read or the delete call fails.
    /// - `DedupeError::DeadlineExceeded` if the deadline passes before the
    ///   delete step; nothing is deleted in that case.
    /// - `DedupeError::PartialDeleteFailure` if the store removed fewer
    ///   records than requested. The attached report carries the actual count.
    pub async fn run(&self, options: &DedupeOptions) -> Result<DedupeReport, DedupeError> {
        let started_at = Utc::now();

        let count_before = within(options.deadline, "count", self.store.count()).await?;
        if count_before == 0 {
            info!("store is empty, nothing to deduplicate");
            return Ok(DedupeReport::empty(started_at, options.dry_run));
        }

        let records = within(options.deadline, "query", self.store.query(self.filter)).await?;
        let plan = plan(&records, |r| self.filter.matches(r));
        let to_delete = plan.to_delete();

        info!(
            "{} records in store, {} eligible, {} duplicate groups, {} to delete",
            count_before,
            plan.eligible,
            plan.decisions.len(),
            to_delete.len()
        );
        for decision in &plan.decisions {
            debug!(
                "group {}: keep {} ({:?}), delete {}",
                decision.key,
                decision.kept_id,
                decision.kept_at,
                decision.deleted_ids.len()
            );
        }

        let mut report = DedupeReport {
            started_at,
            finished_at: started_at,
            dry_run: options.dry_run,
            count_before,
            eligible_before: plan.eligible,
            duplicate_groups: plan.decisions.len(),
            planned_deletions: to_delete.len(),
            count_deleted: 0,
            count_after: count_before,
            decisions: plan.decisions,
            remaining: Vec::new(),
        };

        if options.dry_run || to_delete.is_empty() {
            let doomed: HashSet<&RecordId> = to_delete.iter().collect();
            report.remaining = tally_leading(
                records
                    .iter()
                    .filter(|r| self.filter.matches(r) && !doomed.contains(&r.id)),
            );
            report.finished_at = Utc::now();
            return Ok(report);
        }

        if options.deadline.is_some_and(|at| Instant::now() >= at) {
            warn!(
                "deadline reached before deleting {} records, aborting",
                to_delete.len()
            );
            return Err(DedupeError::DeadlineExceeded { stage: "delete" });
        }

        let outcome = self.store.delete_many(&to_delete).await?;
        report.count_deleted = outcome.deleted;
        if outcome.deleted > to_delete.len() {
            warn!(
                "store reports {} deletions for {} requested ids",
                outcome.deleted,
                to_delete.len()
            );
        }

        report.count_after = self.recount(count_before, outcome.deleted).await;
        report.remaining = self.remaining().await;
        report.finished_at = Utc::now();

        if outcome.deleted < to_delete.len() {
            return Err(DedupeError::PartialDeleteFailure {
                requested: to_delete.len(),
                deleted: outcome.deleted,
                missing: outcome.missing,
                report: Box::new(report),
            });
        }

        info!("deduplication finished: {}", report.summary());
        Ok(report)
    }

    /// Post-delete count. Records are already gone at this point, so a
    /// failing store degrades to the arithmetic count instead of an error.
    async fn recount(&self, count_before: usize, deleted: usize) -> usize {
        let expected = count_before.saturating_sub(deleted);
        match self.store.count().await {
            Ok(actual) => {
                if actual != expected {
                    warn!(
                        "store holds {actual} records after cleanup, expected {expected}; \
                         was it modified during the run?"
                    );
                }
                actual
            }
            Err(e) => {
                warn!("failed to recount store after cleanup: {e}");
                expected
            }
        }
    }

    async fn remaining(&self) -> Vec<KeyTally> {
        match self.store.query(self.filter).await {
            Ok(records) => tally_leading(records.iter().filter(|r| self.filter.matches(r))),
            Err(e) => {
                warn!("failed to summarize remaining records: {e}");
                Vec::new()
            }
        }
    }
}

/// Run a single deduplication pass. Shorthand for
/// [`Deduplicator::new`] + [`Deduplicator::run`].
///
/// # Errors
/// See [`Deduplicator::run`].
pub async fn deduplicate<S: AlertStore>(
    store: &S,
    filter: &EligibilityFilter,
    options: &DedupeOptions,
) -> Result<DedupeReport, DedupeError> {
    Deduplicator::new(store, filter).run(options).await
}

async fn within<T, F>(
    deadline: Option<Instant>,
    stage: &'static str,
    fut: F,
) -> Result<T, DedupeError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let result = match deadline {
        Some(at) => timeout_at(at, fut)
            .await
            .map_err(|_| DedupeError::DeadlineExceeded { stage })?,
        None => fut.await,
    };
    result.map_err(DedupeError::from)
}
