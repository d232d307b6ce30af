pub mod cancel;
pub mod error;
pub mod listing;
pub mod matcher;
pub mod merge;
pub mod mtime;
pub mod record;
pub mod report;
pub mod timestamp;
pub mod transport;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use cancel::{CancellationToken, CancelledError};
pub use error::{SyncError, TimestampError, TransportError};
pub use matcher::{match_files, FileMatch, MatchSummary};
pub use merge::{full_diff, plan_merge, FieldDiff, FieldPlan, FieldValue, MergePlan};
pub use record::{AttributeSet, MetadataRecord, DEFAULT_ATTRIBUTES};
pub use timestamp::{ResolveOptions, TimezoneOffset};
pub use transport::{ExifTool, MemoryTransport, MetadataTransport, WriteOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Directory of files receiving dates
    pub target: PathBuf,
    /// Directory of files carrying authoritative dates
    pub source: PathBuf,
    /// Write changes; otherwise only preview them
    #[serde(default)]
    pub commit: bool,
    /// Offset source timestamps are read in; output is rendered as UTC
    #[serde(default)]
    pub timezone: Option<TimezoneOffset>,
    #[serde(default)]
    pub attributes: AttributeSet,
    /// Leave targets with several candidate sources untouched
    #[serde(default)]
    pub skip_ambiguous: bool,
    #[serde(default)]
    pub resolve: ResolveOptions,
    /// Also set the target's mtime to the fallback timestamp when committing
    #[serde(default)]
    pub touch_mtime: bool,
}

impl SyncOptions {
    pub fn new(target: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            source: source.into(),
            commit: false,
            timezone: None,
            attributes: AttributeSet::default(),
            skip_ambiguous: false,
            resolve: ResolveOptions::default(),
            touch_mtime: false,
        }
    }
}

/// Progress and diagnostics emitted while reconciling.
#[derive(Debug)]
pub enum SyncEvent<'a> {
    Matched {
        targets: usize,
        exact: usize,
        multiple: usize,
        unmatched: usize,
    },
    MultipleMatches {
        target: &'a Path,
        chosen: &'a Path,
        count: usize,
    },
    NoMatch {
        target: &'a Path,
    },
    PairStarted {
        index: usize,
        total: usize,
        source: &'a Path,
        target: &'a Path,
    },
    Planned {
        source: &'a Path,
        target: &'a Path,
        source_record: &'a MetadataRecord,
        target_record: &'a MetadataRecord,
        plan: &'a MergePlan,
        committed: bool,
    },
    FieldSkipped {
        target: &'a Path,
        field: &'a str,
        error: &'a TimestampError,
    },
    PairFailed {
        target: &'a Path,
        error: &'a SyncError,
    },
    /// Metadata was written but the mtime could not be set.
    TouchFailed {
        target: &'a Path,
        error: &'a SyncError,
    },
    Cancelled {
        processed: usize,
        remaining: usize,
    },
}

/// Type alias for event callback
pub type EventCallback<'a> = dyn Fn(&SyncEvent<'_>) + Send + Sync + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    /// Target differs from the merge; written when committing.
    Changed,
    Unchanged,
    Failed,
    SkippedAmbiguous,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairResult {
    pub source: PathBuf,
    pub target: PathBuf,
    pub candidate_count: usize,
    pub status: PairStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<MergePlan>,
    /// Why the pair failed, or why its mtime was not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub exact: usize,
    pub multiple: usize,
    pub unmatched: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped_ambiguous: usize,
    pub field_errors: usize,
    pub touch_errors: usize,
    pub committed: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub summary: SyncSummary,
    pub matches: Vec<FileMatch>,
    pub pairs: Vec<PairResult>,
}

/// List both directories, then reconcile them.
pub fn run(
    options: &SyncOptions,
    transport: &mut dyn MetadataTransport,
    on_event: &EventCallback<'_>,
    cancel: Option<&CancellationToken>,
) -> anyhow::Result<SyncOutcome> {
    let targets = listing::list_dir(&options.target)
        .with_context(|| format!("cannot list target directory {}", options.target.display()))?;
    let sources = listing::list_dir(&options.source)
        .with_context(|| format!("cannot list source directory {}", options.source.display()))?;

    let matches = match_files(&targets, &sources);
    Ok(reconcile(options, matches, transport, on_event, cancel))
}

/// Process matched pairs one at a time through `transport`.
///
/// Failures are confined to their pair; the returned summary always covers
/// every pair that was attempted. Cancellation is checked between pairs, so
/// a pair that has started always finishes.
pub fn reconcile(
    options: &SyncOptions,
    matches: Vec<FileMatch>,
    transport: &mut dyn MetadataTransport,
    on_event: &EventCallback<'_>,
    cancel: Option<&CancellationToken>,
) -> SyncOutcome {
    let split = MatchSummary::partition(&matches);
    let mut summary = SyncSummary {
        exact: split.exact.len(),
        multiple: split.multiple.len(),
        unmatched: split.unmatched.len(),
        committed: options.commit,
        ..Default::default()
    };
    on_event(&SyncEvent::Matched {
        targets: matches.len(),
        exact: summary.exact,
        multiple: summary.multiple,
        unmatched: summary.unmatched,
    });

    let mut pairs: Vec<PairResult> = Vec::new();
    let mut queue: Vec<(&FileMatch, PathBuf, PathBuf)> = Vec::new();

    for &m in split.multiple.iter().chain(split.exact.iter()) {
        let Some(source_name) = &m.source else { continue };
        let target = options.target.join(&m.target);
        let source = options.source.join(source_name);
        if m.is_ambiguous() {
            on_event(&SyncEvent::MultipleMatches {
                target: &target,
                chosen: &source,
                count: m.candidate_count,
            });
            if options.skip_ambiguous {
                summary.skipped_ambiguous += 1;
                pairs.push(PairResult {
                    source,
                    target,
                    candidate_count: m.candidate_count,
                    status: PairStatus::SkippedAmbiguous,
                    plan: None,
                    error: None,
                });
                continue;
            }
        }
        queue.push((m, source, target));
    }
    for m in &split.unmatched {
        on_event(&SyncEvent::NoMatch {
            target: &options.target.join(&m.target),
        });
    }

    let total = queue.len();
    for (index, (m, source, target)) in queue.iter().enumerate() {
        let (source, target) = (source.as_path(), target.as_path());
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            summary.cancelled = true;
            on_event(&SyncEvent::Cancelled {
                processed: index,
                remaining: total - index,
            });
            break;
        }
        on_event(&SyncEvent::PairStarted {
            index,
            total,
            source,
            target,
        });

        let result = process_pair(options, transport, source, target, on_event);
        let (status, plan, error) = match result {
            Ok((status, plan)) => {
                let error = touch_target(options, target, &plan).err().map(|e| {
                    on_event(&SyncEvent::TouchFailed { target, error: &e });
                    summary.touch_errors += 1;
                    e.to_string()
                });
                (status, Some(plan), error)
            }
            Err(e) => {
                on_event(&SyncEvent::PairFailed { target, error: &e });
                (PairStatus::Failed, None, Some(e.to_string()))
            }
        };
        match status {
            PairStatus::Changed => summary.changed += 1,
            PairStatus::Unchanged => summary.unchanged += 1,
            PairStatus::Failed => summary.failed += 1,
            PairStatus::SkippedAmbiguous => summary.skipped_ambiguous += 1,
        }
        summary.field_errors += plan.as_ref().map_or(0, |p| p.errors().count());
        pairs.push(PairResult {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            candidate_count: m.candidate_count,
            status,
            plan,
            error,
        });
    }

    SyncOutcome {
        summary,
        matches,
        pairs,
    }
}

fn process_pair(
    options: &SyncOptions,
    transport: &mut dyn MetadataTransport,
    source: &Path,
    target: &Path,
    on_event: &EventCallback<'_>,
) -> error::Result<(PairStatus, MergePlan)> {
    let source_record = transport.read(source)?;
    let target_record = transport.read(target)?;
    let tz = options.timezone.as_ref();

    let plan = plan_merge(
        &source_record,
        &target_record,
        &options.attributes,
        tz,
        &options.resolve,
    );
    for (field, error) in plan.errors() {
        on_event(&SyncEvent::FieldSkipped { target, field, error });
    }
    on_event(&SyncEvent::Planned {
        source,
        target,
        source_record: &source_record,
        target_record: &target_record,
        plan: &plan,
        committed: options.commit,
    });

    let status = if plan.has_changes() {
        PairStatus::Changed
    } else {
        PairStatus::Unchanged
    };
    if options.commit && status == PairStatus::Changed {
        let opts = WriteOptions {
            overwrite_original: true,
        };
        transport.write(target, &plan.write_set(), opts)?;
    }
    Ok((status, plan))
}

/// Set the target's mtime to the fallback once its metadata is settled.
fn touch_target(options: &SyncOptions, target: &Path, plan: &MergePlan) -> error::Result<()> {
    if !(options.commit && options.touch_mtime) {
        return Ok(());
    }
    match &plan.fallback {
        Some(fallback) => mtime::touch_mtime(target, fallback, options.timezone.as_ref()),
        None => Ok(()),
    }
}
