//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

use pickr_core::types::{Job, QueueItem};
use pickr_realtime::SyncView;
use pickr_realtime::metrics::MetricsSnapshot;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Job display row
#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    /// Job ID
    job: String,
    /// Restaurant
    restaurant: i64,
    /// Type
    kind: String,
    /// Status
    status: String,
    /// Phase
    phase: String,
    /// Progress
    progress: String,
    /// Error
    error: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        let mut status = job.status.to_string();
        if job.is_interrupted {
            status.push_str(" (interrupted)");
        }
        Self {
            job: job.job_id.to_string(),
            restaurant: job.resource_id,
            kind: job.job_type.to_string(),
            status,
            phase: job
                .metadata
                .get("phase")
                .map(ToString::to_string)
                .unwrap_or_default(),
            progress: format!(
                "{}/{} ({}%)",
                job.progress.current, job.progress.total, job.progress.percentage
            ),
            error: job.error.clone().unwrap_or_default(),
        }
    }
}

/// Queue display row
#[derive(Debug, Serialize, Tabled)]
struct QueueRow {
    /// Queue ID
    queue: String,
    /// Restaurant
    restaurant: i64,
    /// Type
    kind: String,
    /// Status
    status: String,
    /// Position
    position: String,
    /// Error
    error: String,
}

impl From<&QueueItem> for QueueRow {
    fn from(item: &QueueItem) -> Self {
        Self {
            queue: item.queue_id.to_string(),
            restaurant: item.resource_id,
            kind: item.job_type.to_string(),
            status: item.queue_status.to_string(),
            position: item.position.map(|p| p.to_string()).unwrap_or_default(),
            error: item.error.clone().unwrap_or_default(),
        }
    }
}

/// Status report printed by `status` and streamed by `watch --format json`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    view: &'a SyncView,
    metrics: MetricsSnapshot,
}

/// Print a list of items in the selected format
pub fn print_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("  (none)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
            println!("{}", json);
        }
    }
}

/// Print a single item in the selected format
pub fn print_item<T: Serialize + std::fmt::Debug>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("{:#?}", item);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(item).unwrap_or_else(|_| "{}".to_string());
            println!("{}", json);
        }
    }
}

/// Print the synchronized state.
///
/// JSON output is one compact document per call so `watch` emits a stream
/// of newline-delimited reports.
pub fn print_view(view: &SyncView, metrics: MetricsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_kv("Connection", view.connection.as_str());
            if view.loading {
                print_kv("Snapshots", "loading");
            }
            if let Some(error) = &view.last_error {
                print_kv("Last error", error);
            }
            print_kv(
                "Queue",
                &format!(
                    "{} total, {} waiting, {} processing",
                    view.stats.total, view.stats.waiting, view.stats.processing
                ),
            );
            print_kv(
                "Frames / stale",
                &format!("{} / {}", metrics.frames_received, metrics.stale_dropped),
            );

            println!("\nJobs");
            let jobs: Vec<JobRow> = view.jobs.iter().map(JobRow::from).collect();
            print_list(&jobs, format);

            println!("\nQueue");
            let queue: Vec<QueueRow> = view.queue.iter().map(QueueRow::from).collect();
            print_list(&queue, format);
        }
        OutputFormat::Json => {
            let report = Report { view, metrics };
            let json = serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string());
            println!("{}", json);
        }
    }
}

/// Clear the terminal before redrawing a table.
pub fn clear_screen() {
    print!("\x1B[2J\x1B[H");
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    eprintln!("⚠ {}", msg);
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {}", msg);
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<24} {}", format!("{}:", key), value);
}
