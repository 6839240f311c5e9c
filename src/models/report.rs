use crate::models::{GroupKey, RecordId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

/// Outcome for one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDecision {
    pub key: GroupKey,
    pub kept_id: RecordId,
    pub kept_at: Option<DateTime<Utc>>,
    /// Newest first, mirroring the ranking used to pick the keeper.
    pub deleted_ids: Vec<RecordId>,
}

impl GroupDecision {
    #[must_use]
    pub fn group_size(&self) -> usize {
        self.deleted_ids.len() + 1
    }
}

/// Remaining eligible records for one value of the leading key field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyTally {
    pub name: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Every record in the store, eligible or not.
    pub count_before: usize,
    pub eligible_before: usize,
    /// Groups holding more than one eligible record.
    pub duplicate_groups: usize,
    pub planned_deletions: usize,
    pub count_deleted: usize,
    pub count_after: usize,
    pub decisions: Vec<GroupDecision>,
    pub remaining: Vec<KeyTally>,
}

impl DedupeReport {
    /// Report for a run that found nothing to look at.
    #[must_use]
    pub fn empty(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            dry_run,
            count_before: 0,
            eligible_before: 0,
            duplicate_groups: 0,
            planned_deletions: 0,
            count_deleted: 0,
            count_after: 0,
            decisions: Vec::new(),
            remaining: Vec::new(),
        }
    }

    /// Short one-line summary for logs and notifications.
    #[must_use]
    pub fn summary(&self) -> String {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        format!(
            "before={} duplicate_groups={} deleted={} after={}{mode}",
            self.count_before, self.duplicate_groups, self.count_deleted, self.count_after
        )
    }

    /// Human readable report for the console.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Duplicate alert cleanup");
        let _ = writeln!(out, "  records before:   {}", self.count_before);
        let _ = writeln!(out, "  eligible before:  {}", self.eligible_before);
        let _ = writeln!(out, "  duplicate groups: {}", self.duplicate_groups);

        for decision in &self.decisions {
            let kept_at = decision
                .kept_at
                .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());
            let _ = writeln!(out, "\n  group {}", decision.key);
            let _ = writeln!(out, "    duplicates: {}", decision.group_size());
            let _ = writeln!(out, "    keep:   {} ({kept_at})", decision.kept_id);
            let _ = writeln!(out, "    delete: {} record(s)", decision.deleted_ids.len());
        }

        let _ = writeln!(out);
        if self.dry_run {
            let _ = writeln!(
                out,
                "  dry run: {} record(s) would be deleted",
                self.planned_deletions
            );
        }
        let _ = writeln!(out, "  deleted:          {}", self.count_deleted);
        let _ = writeln!(out, "  records after:    {}", self.count_after);

        if !self.remaining.is_empty() {
            let _ = writeln!(out, "\n  remaining eligible by category:");
            for tally in &self.remaining {
                let name = tally.name.as_deref().unwrap_or("<none>");
                let _ = writeln!(out, "    {name}: {}", tally.count);
            }
        }

        out
    }
}
