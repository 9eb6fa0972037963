//! Batch population of an [`ImageCollection`]'s datasets.
//!
//! One loader drives `load` across every entry of a collection, either
//! sequentially or through a bounded worker pool, with integer-percent
//! progress, cooperative cancellation, and resume. Cancellation is
//! non-preemptive: an in-flight decode always finishes (its result is
//! discarded), only the next unit of work is skipped.
//!
//! All `done`/progress bookkeeping is mutated by the single coordination
//! thread; workers only run the pure decode and send `(index, result)`
//! back. The index travels with the job, so completion handling never has
//! to look an entry up by identity. Work submission is single-threaded by
//! construction — that is what makes the `done` gating a sufficient
//! at-most-once guard, and it must stay that way if the scheduling is ever
//! reworked.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::data::collection::ImageCollection;
use crate::data::entry::{AnalysisFiles, EntryDecoder, XlsxEntryDecoder};
use crate::data::model::EntryDataset;
use crate::error::Result;
use crate::report::{ErrorSink, LogErrorSink};

/// Fixed pause before each sequential item; keeps an attached UI
/// responsive, no correctness role.
const SEQUENTIAL_ITEM_DELAY: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Phases and modes
// ---------------------------------------------------------------------------

/// Lifecycle of one loader. `Stopped` and `Completed` runs can be
/// restarted; already-done entries are not re-processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderPhase {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// How the batch is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// One entry at a time, in collection order.
    Sequential,
    /// A bounded pool of decode workers; completions are consumed in
    /// arrival order by the coordination thread.
    Concurrent { workers: usize },
}

// ---------------------------------------------------------------------------
// Shared run state
// ---------------------------------------------------------------------------

struct Shared {
    /// Cancellation flag; behind its own `Arc` so decode workers can hold
    /// the flag without the rest of the run state.
    stop: Arc<AtomicBool>,
    percent: AtomicUsize,
    phase: Mutex<LoaderPhase>,
    /// Per-index completion flags; only the coordination thread writes.
    done: Mutex<Vec<bool>>,
}

impl Shared {
    fn set_phase(&self, phase: LoaderPhase) {
        *self.phase.lock().unwrap() = phase;
    }

    /// Mark index done and publish the new integer percent. Returns the
    /// completed count.
    fn mark_done(&self, index: usize) -> (usize, usize) {
        let mut done = self.done.lock().unwrap();
        done[index] = true;
        let completed = done.iter().filter(|d| **d).count();
        let total = done.len();
        self.percent
            .store(completed * 100 / total.max(1), Ordering::SeqCst);
        (completed, total)
    }
}

struct Job {
    index: usize,
    key: String,
    files: AnalysisFiles,
}

// ---------------------------------------------------------------------------
// BatchLoader
// ---------------------------------------------------------------------------

/// Drives dataset loading for every entry of a shared collection.
pub struct BatchLoader {
    collection: Arc<Mutex<ImageCollection>>,
    input_folder: PathBuf,
    mode: LoadMode,
    decoder: Arc<dyn EntryDecoder>,
    errors: Arc<dyn ErrorSink>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl BatchLoader {
    pub fn new(
        collection: Arc<Mutex<ImageCollection>>,
        input_folder: impl Into<PathBuf>,
        mode: LoadMode,
    ) -> Self {
        BatchLoader {
            collection,
            input_folder: input_folder.into(),
            mode,
            decoder: Arc::new(XlsxEntryDecoder),
            errors: Arc::new(LogErrorSink),
            shared: Arc::new(Shared {
                stop: Arc::new(AtomicBool::new(false)),
                percent: AtomicUsize::new(0),
                phase: Mutex::new(LoaderPhase::Idle),
                done: Mutex::new(Vec::new()),
            }),
            handle: None,
        }
    }

    /// Replace the decode step (tests, alternative sources).
    pub fn with_decoder(mut self, decoder: Arc<dyn EntryDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Route user-facing error messages to the presentation layer.
    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    pub fn phase(&self) -> LoaderPhase {
        *self.shared.phase.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == LoaderPhase::Running
    }

    /// Completed entries as integer percent of the batch.
    pub fn progress_percent(&self) -> u32 {
        self.shared.percent.load(Ordering::SeqCst) as u32
    }

    /// Begin or resume a run. A no-op while a run is active.
    pub fn start(&mut self) {
        {
            let mut phase = self.shared.phase.lock().unwrap();
            if *phase == LoaderPhase::Running {
                return;
            }
            *phase = LoaderPhase::Running;
        }
        self.shared.stop.store(false, Ordering::SeqCst);
        self.errors.clear();

        // The previous run's thread has signalled its exit by leaving the
        // Running phase; its handle is stale now.
        if let Some(old) = self.handle.take() {
            let _ = old.join();
        }

        let collection = Arc::clone(&self.collection);
        let folder = self.input_folder.clone();
        let decoder = Arc::clone(&self.decoder);
        let errors = Arc::clone(&self.errors);
        let shared = Arc::clone(&self.shared);

        self.handle = Some(match self.mode {
            LoadMode::Sequential => thread::spawn(move || {
                run_sequential(&shared, &collection, &folder, &*decoder, &*errors);
            }),
            LoadMode::Concurrent { workers } => thread::spawn(move || {
                run_concurrent(&shared, &collection, &folder, decoder, &*errors, workers);
            }),
        });
    }

    /// Request cancellation. In-flight decode work is never interrupted;
    /// the run loop observes the flag at the next boundary.
    pub fn stop(&self) {
        log::info!("stopping batch load...");
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Block until the current run (if any) has finished.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Run loops
// ---------------------------------------------------------------------------

/// Grow the `done` vector to the collection size, keeping earlier flags
/// (resume), pre-mark entries that are already loaded, and publish the
/// starting percent.
fn sync_done_flags(shared: &Shared, collection: &Mutex<ImageCollection>) -> usize {
    let collection = collection.lock().unwrap();
    let mut done = shared.done.lock().unwrap();
    done.resize(collection.len(), false);
    for (index, entry) in collection.entries().enumerate() {
        if entry.loaded() {
            done[index] = true;
        }
    }
    let completed = done.iter().filter(|d| **d).count();
    shared
        .percent
        .store(completed * 100 / done.len().max(1), Ordering::SeqCst);
    done.len()
}

fn run_sequential(
    shared: &Shared,
    collection: &Mutex<ImageCollection>,
    folder: &Path,
    decoder: &dyn EntryDecoder,
    errors: &dyn ErrorSink,
) {
    log::info!("loading dataset...");
    let started = Instant::now();
    let total = sync_done_flags(shared, collection);

    for index in 0..total {
        if shared.done.lock().unwrap()[index] {
            continue;
        }
        if shared.stop.load(Ordering::SeqCst) {
            shared.set_phase(LoaderPhase::Stopped);
            log::info!("batch load stopped");
            return;
        }

        thread::sleep(SEQUENTIAL_ITEM_DELAY);

        let outcome = {
            let mut collection = collection.lock().unwrap();
            match collection.by_index_mut(index) {
                Ok(entry) => (entry.key().to_string(), entry.load_with(folder, decoder)),
                Err(e) => (format!("#{index}"), Err(e)),
            }
        };

        match outcome {
            (key, Ok(())) => {
                let (completed, total) = shared.mark_done(index);
                log::info!("processed step {completed} / {total}: {key}");
            }
            (key, Err(e)) => {
                errors.report(&format!("failed to load '{key}': {e}"));
            }
        }
    }

    shared.set_phase(LoaderPhase::Completed);
    log::info!(
        "batch load completed in {:.2} s",
        started.elapsed().as_secs_f64()
    );
}

fn run_concurrent(
    shared: &Shared,
    collection: &Mutex<ImageCollection>,
    folder: &Path,
    decoder: Arc<dyn EntryDecoder>,
    errors: &dyn ErrorSink,
    workers: usize,
) {
    log::info!("loading dataset...");
    let started = Instant::now();
    let total = sync_done_flags(shared, collection);

    // Snapshot one job per pending entry. Submission happens here, on this
    // thread only.
    let mut jobs: Vec<Job> = Vec::new();
    {
        let collection = collection.lock().unwrap();
        let done = shared.done.lock().unwrap();
        for (index, entry) in collection.entries().enumerate() {
            if done[index] {
                continue;
            }
            match entry.select_analysis_files() {
                Ok(files) => jobs.push(Job {
                    index,
                    key: entry.key().to_string(),
                    files,
                }),
                Err(e) => {
                    errors.report(&format!("failed to load '{}': {e}", entry.key()));
                }
            }
        }
    }

    if jobs.is_empty() {
        shared.set_phase(LoaderPhase::Completed);
        log::info!("batch load completed (nothing to do)");
        return;
    }

    let (job_tx, job_rx) = channel::<Job>();
    let (result_tx, result_rx) = channel::<(usize, String, Result<EntryDataset>)>();
    let job_rx = Arc::new(Mutex::new(job_rx));

    let n_jobs = jobs.len();
    for job in jobs {
        // The receiver outlives this loop; send cannot fail here.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let pool_size = workers.max(1).min(n_jobs);
    for _ in 0..pool_size {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let decoder = Arc::clone(&decoder);
        let folder = folder.to_path_buf();
        let stop = Arc::clone(&shared.stop);
        thread::spawn(move || worker_loop(&job_rx, &result_tx, &*decoder, &folder, &stop));
    }
    drop(result_tx);

    // Single consumer: installs datasets, flips done flags, publishes
    // progress, in completion-arrival order.
    for (index, key, result) in result_rx.iter() {
        if shared.stop.load(Ordering::SeqCst) {
            shared.set_phase(LoaderPhase::Stopped);
            log::info!("batch load stopped");
            return;
        }
        match result {
            Ok(dataset) => {
                if let Ok(entry) = collection.lock().unwrap().by_index_mut(index) {
                    entry.install_dataset(dataset);
                }
                let (completed, _) = shared.mark_done(index);
                log::info!("processed step {completed} / {total}: {key}");
            }
            Err(e) => {
                errors.report(&format!("failed to load '{key}': {e}"));
            }
        }
    }

    shared.set_phase(LoaderPhase::Completed);
    log::info!(
        "batch load completed in {:.2} s",
        started.elapsed().as_secs_f64()
    );
}

fn worker_loop(
    jobs: &Mutex<Receiver<Job>>,
    results: &Sender<(usize, String, Result<EntryDataset>)>,
    decoder: &dyn EntryDecoder,
    folder: &Path,
    stop: &AtomicBool,
) {
    loop {
        let job = { jobs.lock().unwrap().recv() };
        let Ok(job) = job else { break };
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let result = decoder.decode(folder, &job.files);
        if results.send((job.index, job.key, result)).is_err() {
            // Consumer left (stop); drop the remaining work.
            break;
        }
    }
}
