use std::{
    collections::{BTreeMap, HashSet},
    fmt::Write as _,
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    cache::HashCache,
    config::Config,
    dispatch::{FailureHandler, OpDispatcher},
    loader::ImageLoader,
    output::{delete_stale, encode_png, write_output},
};

#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Root directory textures are read from.
    pub input_dir: PathBuf,
    /// Root directory outputs are written under.
    pub output_dir: PathBuf,
    pub cache_path: PathBuf,
    /// Treat the previous cache as empty (the file is still rewritten).
    pub ignore_cache: bool,
    /// Skip writing the cache file; stale-output deletion still occurs.
    pub no_output_cache: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Entries that evaluated and made it through the save stage.
    pub processed: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct Report {
    pub message: String,
    pub error: bool,
}

/// Collects per-entry and generic reports across the run; handed to the
/// dispatcher as its failure callback and printed once at the end.
#[derive(Default)]
pub struct RunTracker {
    entries: Mutex<BTreeMap<String, Vec<Report>>>,
    generic: Mutex<Vec<Report>>,
}

impl RunTracker {
    pub fn report_entry(&self, path: &str, message: impl Into<String>, error: bool) {
        self.entries
            .lock()
            .entry(path.to_string())
            .or_default()
            .push(Report {
                message: message.into(),
                error,
            });
    }

    pub fn report_generic(&self, message: impl Into<String>, error: bool) {
        self.generic.lock().push(Report {
            message: message.into(),
            error,
        });
    }

    pub fn total_reports(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum::<usize>() + self.generic.lock().len()
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .values()
            .flatten()
            .chain(self.generic.lock().iter())
            .any(|r| r.error)
    }

    /// Human-readable dump of every collected report, grouped by entry.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let total = self.total_reports();
        if total == 0 {
            return out;
        }
        let _ = writeln!(out, "{total} total report(s)");
        for (path, reports) in self.entries.lock().iter() {
            let _ = writeln!(out, "entry {path}: {} report(s)", reports.len());
            for report in reports {
                let _ = writeln!(out, "  {}", report.message.replace('\n', "\n  "));
            }
        }
        let generic = self.generic.lock();
        if !generic.is_empty() {
            let _ = writeln!(out, "{} generic report(s)", generic.len());
            for report in generic.iter() {
                let _ = writeln!(out, "  {}", report.message.replace('\n', "\n  "));
            }
        }
        out
    }
}

fn failure_handler(tracker: &Arc<RunTracker>) -> FailureHandler {
    let tracker = tracker.clone();
    Arc::new(move |path, err| {
        tracker.report_entry(path, format!("canvas operation failed: {err}"), true);
    })
}

/// Evaluates every entry, hashes the results, writes changed outputs and the
/// refreshed cache, and removes outputs no longer produced.
#[tracing::instrument(skip_all, fields(entries = config.entries.len()))]
pub async fn run_pipeline(
    config: Config,
    options: &RunOptions,
    tracker: Arc<RunTracker>,
) -> RunSummary {
    let cache = if options.ignore_cache {
        HashCache::empty()
    } else {
        HashCache::read(&options.cache_path)
    };

    let mut ops = BTreeMap::new();
    let mut compression = BTreeMap::new();
    for (path, entry) in config.entries {
        compression.insert(path.clone(), entry.compression);
        ops.insert(path, entry.op);
    }
    let total = ops.len();

    let dispatcher = OpDispatcher::dispatch(
        config.default_width,
        config.default_height,
        ops,
        Arc::new(ImageLoader::new(&options.input_dir)),
        failure_handler(&tracker),
    )
    .await;
    let results = dispatcher.await_all().await;

    // Hash + encode + write concurrently, one blocking task per entry.
    let mut save_tasks = Vec::new();
    for (path, canvas) in results {
        let Some(canvas) = canvas else { continue };
        let mode = compression[&path];
        let previous = cache.get(&path);
        let out_dir = options.output_dir.clone();
        let tracker = tracker.clone();
        save_tasks.push(tokio::task::spawn_blocking(move || {
            let hash = canvas.pixel_hash_with(&mode.metadata());
            if previous == Some(hash) {
                tracing::debug!("skipping unchanged entry '{path}'");
                return Some((path, hash, false));
            }
            let written = encode_png(&canvas, mode)
                .and_then(|bytes| write_output(&out_dir, &path, &bytes));
            match written {
                Ok(()) => Some((path, hash, true)),
                Err(err) => {
                    tracker.report_entry(&path, format!("cannot save output: {err}"), true);
                    None
                }
            }
        }));
    }

    let mut fresh = BTreeMap::new();
    let mut summary = RunSummary::default();
    for task in save_tasks {
        match task.await {
            Ok(Some((path, hash, written))) => {
                fresh.insert(path, hash);
                summary.processed += 1;
                if written {
                    summary.written += 1;
                } else {
                    summary.skipped += 1;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracker.report_generic(format!("unexpected fault while saving: {err}"), true);
            }
        }
    }
    summary.failed = total - summary.processed;

    if !options.no_output_cache {
        if let Err(err) = HashCache::write(&options.cache_path, &fresh) {
            tracker.report_generic(format!("cannot update cache file: {err}"), true);
        }
    }

    let stale: HashSet<String> = cache
        .paths()
        .filter(|path| !fresh.contains_key(*path))
        .map(str::to_string)
        .collect();
    delete_stale(&options.output_dir, stale, |msg| {
        tracker.report_generic(msg, true);
    });

    summary
}
