use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tandem::sync::{ConflictResolution, SyncAction, SyncProgress};

/// Bar of the phase currently listing entities.
struct FetchState {
    bar: ProgressBar,
    fetched: usize,
}

/// All mutable progress state, kept under one lock.
#[derive(Default)]
struct ProgressState {
    fetch: Option<FetchState>,
    /// Finished fetch bars, kept so `finish` can settle them.
    fetched_bars: Vec<ProgressBar>,
    /// Single bar counting settled entities across all phases.
    sync_bar: Option<ProgressBar>,
    /// Entities found by the fetch phases so far.
    sync_total: usize,
}

/// Interactive progress reporter using indicatif.
pub(crate) struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub(crate) fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// A reporter that draws nothing.
    #[cfg(test)]
    pub(crate) fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// Create the sync bar below every fetch bar.
    fn sync_bar(&self, state: &mut ProgressState) -> ProgressBar {
        if let Some(ref pb) = state.sync_bar {
            return pb.clone();
        }
        let pb = self.multi.add(ProgressBar::new(state.sync_total as u64));
        pb.set_style(Self::bar_style());
        pb.set_prefix(format!("{:12}", "Syncing"));
        state.sync_bar = Some(pb.clone());
        pb
    }

    pub(crate) fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::TaskStarted {
                task_id,
                direction,
                recovered_from,
                ..
            } => {
                let line = match recovered_from {
                    Some(previous) => format!("Task {task_id} ({direction}), resuming {previous}"),
                    None => format!("Task {task_id} ({direction})"),
                };
                drop(state);
                self.multi.println(line).ok();
            }

            SyncProgress::FetchingEntities {
                entity_type,
                origin,
                ..
            } => {
                let bar = ProgressBar::new_spinner();
                // Keep fetch bars above the sync bar
                let bar = match state.sync_bar {
                    Some(ref sync_bar) => self.multi.insert_before(sync_bar, bar),
                    None => self.multi.add(bar),
                };
                bar.set_style(Self::spinner_style());
                bar.enable_steady_tick(std::time::Duration::from_millis(100));
                bar.set_prefix(format!("{:12}", format!("{entity_type}s")));
                bar.set_message(format!("Fetching from {origin}..."));

                if let Some(previous) = state.fetch.take() {
                    state.fetched_bars.push(previous.bar);
                }
                state.fetch = Some(FetchState { bar, fetched: 0 });
            }

            SyncProgress::FetchedPage { page, count, .. } => {
                if let Some(ref mut fetch) = state.fetch {
                    fetch.fetched += count;
                    fetch
                        .bar
                        .set_message(format!("Page {} ({} fetched)", page, fetch.fetched));
                }
            }

            SyncProgress::FetchComplete { origin, total, .. } => {
                if let Some(fetch) = state.fetch.take() {
                    fetch
                        .bar
                        .finish_with_message(format!("✓ {total} to sync from {origin}"));
                    state.fetched_bars.push(fetch.bar);
                }
                state.sync_total += total;
                let total = state.sync_total as u64;
                self.sync_bar(&mut state).set_length(total);
            }

            SyncProgress::BatchStarted {
                batch_index, size, ..
            } => {
                self.sync_bar(&mut state)
                    .set_message(format!("Batch {} ({} entities)...", batch_index + 1, size));
            }

            SyncProgress::EntitySynced {
                entity_id, action, ..
            } => {
                let pb = self.sync_bar(&mut state);
                pb.inc(1);
                let symbol = match action {
                    SyncAction::Skip(_) => "·",
                    SyncAction::Conflict => "⚠",
                    _ => "✓",
                };
                pb.set_message(format!("{symbol} {entity_id} {action}"));
            }

            SyncProgress::EntityFailed {
                entity_type,
                entity_id,
                error,
                ..
            } => {
                self.sync_bar(&mut state).inc(1);
                drop(state);
                self.multi
                    .println(format!("✗ {entity_type} {entity_id}: {error}"))
                    .ok();
            }

            SyncProgress::ConflictDetected {
                entity_type,
                entity_id,
                field,
                resolution,
                ..
            } => {
                if resolution == ConflictResolution::Unresolved {
                    drop(state);
                    self.multi
                        .println(format!(
                            "⚠ {entity_type} {entity_id}: '{field}' differs, left for review"
                        ))
                        .ok();
                }
            }

            SyncProgress::RetryBackoff {
                operation,
                attempt,
                delay_ms,
                ..
            } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.set_message(format!(
                        "⏳ {}, retry {} in {:.1}s",
                        operation,
                        attempt,
                        delay_ms as f64 / 1000.0
                    ));
                }
            }

            SyncProgress::BatchComplete {
                batch_index,
                totals,
                ..
            } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.set_message(format!(
                        "Batch {} done ({} created, {} updated, {} failed)",
                        batch_index + 1,
                        totals.created,
                        totals.updated,
                        totals.failed
                    ));
                }
            }

            SyncProgress::TaskFinished {
                status, counters, ..
            } => {
                if let Some(ref pb) = state.sync_bar {
                    pb.finish_with_message(format!(
                        "{} - {} processed, {} failed",
                        status, counters.processed, counters.failed
                    ));
                }
            }

            _ => {}
        }
    }

    pub(crate) fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let bars = state
            .fetch
            .iter()
            .map(|f| &f.bar)
            .chain(state.fetched_bars.iter())
            .chain(state.sync_bar.iter());
        for pb in bars {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
