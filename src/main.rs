use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser};
use exif_sync_core::{
    full_diff, AttributeSet, CancellationToken, EventCallback, ExifTool, FieldValue, MergePlan,
    MetadataRecord, ResolveOptions, SyncEvent, SyncOptions, SyncSummary, TimezoneOffset,
};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(
    name = "exif-sync",
    version,
    about = "Copy capture timestamps from source media files onto matching target files"
)]
struct Cli {
    /// Directory of files whose dates are updated
    #[arg(short, long)]
    target: PathBuf,

    /// Directory of files carrying the original dates
    #[arg(short, long)]
    source: PathBuf,

    /// Apply changes (default is preview)
    #[arg(short, long)]
    commit: bool,

    /// Show before/after values; repeat to show every field
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Offset the source dates are in, e.g. -05:00; dates are written as UTC
    #[arg(short = 'z', long, allow_hyphen_values = true, value_parser = TimezoneOffset::parse)]
    timezone: Option<TimezoneOffset>,

    /// Comma-separated date fields to reconcile (default: the QuickTime/EXIF date set)
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Leave targets matching several sources untouched
    #[arg(long)]
    skip_ambiguous: bool,

    /// Treat 0000:00:00 00:00:00 as a real date
    #[arg(long)]
    keep_zero_dates: bool,

    /// Also set each updated file's modification time
    #[arg(long)]
    touch: bool,

    /// exiftool executable
    #[arg(long, env = "EXIFTOOL_PATH", default_value = "exiftool")]
    exiftool: String,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> SyncOptions {
        let mut options = SyncOptions::new(&self.target, &self.source);
        options.commit = self.commit;
        options.timezone = self.timezone;
        if !self.fields.is_empty() {
            options.attributes = AttributeSet::new(self.fields.iter().cloned());
        }
        options.skip_ambiguous = self.skip_ambiguous;
        options.resolve = ResolveOptions {
            skip_zero_dates: !self.keep_zero_dates,
        };
        options.touch_mtime = self.touch;
        options
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();
    let options = cli.options();
    if options.attributes.is_empty() {
        anyhow::bail!("--fields needs at least one field name");
    }

    let cancel = CancellationToken::new();
    {
        let token = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nStopping after the current file...");
            token.cancel();
        })?;
    }

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?);

    let verbose = cli.verbose;
    let on_event: &EventCallback<'_> = &|event| match event {
        SyncEvent::Matched { .. } => {}
        SyncEvent::MultipleMatches { target, chosen, count } => pb.suspend(|| {
            eprintln!(
                "Found {} source matches for {}, using {}",
                count,
                target.display(),
                chosen.display()
            )
        }),
        SyncEvent::NoMatch { target } => {
            pb.suspend(|| eprintln!("Could not find source matches for {}", target.display()))
        }
        SyncEvent::PairStarted { index, total, source, target } => {
            pb.set_length(*total as u64);
            pb.set_position(*index as u64);
            pb.set_message(file_name(target));
            pb.suspend(|| {
                println!("Copy metadata from {} to {}", source.display(), target.display())
            });
        }
        SyncEvent::Planned { source_record, target_record, plan, .. } => {
            pb.inc(1);
            if verbose > 0 {
                pb.suspend(|| print_plan(plan, source_record, target_record, verbose > 1));
            }
        }
        SyncEvent::FieldSkipped { target, field, error } => {
            pb.suspend(|| eprintln!("Skipping {} on {}: {}", field, target.display(), error))
        }
        SyncEvent::PairFailed { target, error } => {
            pb.inc(1);
            pb.suspend(|| eprintln!("Failed to update {}: {}", target.display(), error));
        }
        SyncEvent::TouchFailed { target, error } => {
            pb.suspend(|| eprintln!("Updated {} but {}", target.display(), error))
        }
        SyncEvent::Cancelled { processed, remaining } => pb.suspend(|| {
            eprintln!("Cancelled after {} files, {} not processed", processed, remaining)
        }),
    };

    let mut exiftool = ExifTool::open(&cli.exiftool)
        .with_context(|| format!("cannot start exiftool ({})", cli.exiftool))?;
    let result = exif_sync_core::run(&options, &mut exiftool, on_event, Some(&cancel));
    pb.finish_and_clear();
    exiftool.close()?;
    let outcome = result?;

    print_summary(&outcome.summary);

    if let Some(path) = &cli.report {
        exif_sync_core::report::write_report(&outcome, path)?;
        eprintln!("Report written to {}", path.display());
    }

    eprintln!("Done! ({:.2}s)", t_total.elapsed().as_secs_f64());

    let summary = &outcome.summary;
    if summary.failed > 0 || summary.touch_errors > 0 || summary.cancelled {
        std::process::exit(1);
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

fn show(value: Option<&str>) -> &str {
    value.unwrap_or("null")
}

fn print_plan(
    plan: &MergePlan,
    source: &MetadataRecord,
    target: &MetadataRecord,
    all_fields: bool,
) {
    if all_fields {
        for diff in full_diff(source, target, plan) {
            println!(
                "  {:<24} source={:<22} before={:<22} after={}",
                diff.field,
                show(diff.source.as_deref()),
                show(diff.before.as_deref()),
                show(diff.after.as_deref()),
            );
        }
        return;
    }
    for f in &plan.fields {
        let origin = match &f.value {
            FieldValue::Source(_) => "source",
            FieldValue::Fallback(_) => "fallback",
            FieldValue::Absent => "absent",
        };
        let after = f.after.as_deref().or(f.before.as_deref());
        println!(
            "  {:<18} {:<22} -> {:<22} ({})",
            f.field,
            show(f.before.as_deref()),
            show(after),
            origin
        );
    }
}

fn print_summary(summary: &SyncSummary) {
    println!(
        "{} exact matches, {} multiple matches, {} match failures",
        summary.exact, summary.multiple, summary.unmatched
    );
    if summary.committed {
        println!(
            "{} files updated, {} already up to date, {} failed",
            summary.changed, summary.unchanged, summary.failed
        );
    } else {
        println!(
            "{} files would be updated, {} already up to date, {} failed",
            summary.changed, summary.unchanged, summary.failed
        );
        println!("Preview only, use --commit to apply");
    }
    if summary.skipped_ambiguous > 0 {
        println!("{} ambiguous matches skipped", summary.skipped_ambiguous);
    }
    if summary.field_errors > 0 {
        println!("{} fields skipped: timestamp could not be converted", summary.field_errors);
    }
    if summary.touch_errors > 0 {
        println!("{} modification times could not be set", summary.touch_errors);
    }
}
