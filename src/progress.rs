//! Per-stage progress tracking and the terminal progress bar.
//!
//! Workers only ever touch a [`ProgressCounter`]. The bar is redrawn from a
//! separate task on a fixed tick, and [`ProgressTracker::finish`] waits for
//! that task to draw the final count before returning.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Shared completion counter handed to stage workers
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter {
    done: Arc<AtomicU64>,
}

impl ProgressCounter {
    pub fn inc(&self) {
        self.done.fetch_add(1, Ordering::AcqRel);
    }

    pub fn get(&self) -> u64 {
        self.done.load(Ordering::Acquire)
    }
}

pub struct ProgressTracker {
    label: String,
    total: u64,
    counter: ProgressCounter,
    stop: Option<oneshot::Sender<()>>,
    render: Option<JoinHandle<u64>>,
}

impl ProgressTracker {
    /// Start tracking a stage of `total` units, redrawing every `interval`
    pub fn start(label: &str, total: u64, interval: Duration, visible: bool) -> Self {
        let counter = ProgressCounter::default();
        let bar = create_progress_bar(label, total, visible);
        let (stop_tx, stop_rx) = oneshot::channel();
        let render = tokio::spawn(render_loop(bar, counter.clone(), interval, stop_rx));

        Self {
            label: label.to_string(),
            total,
            counter,
            stop: Some(stop_tx),
            render: Some(render),
        }
    }

    pub fn counter(&self) -> ProgressCounter {
        self.counter.clone()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn snapshot(&self) -> u64 {
        self.counter.get()
    }

    /// Stop the redraw task after one last render; returns the final count.
    ///
    /// Call this only after the stage barrier released, so the count is settled.
    pub async fn finish(mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let done = match self.render.take() {
            Some(handle) => handle.await.unwrap_or_else(|_| self.counter.get()),
            None => self.counter.get(),
        };
        tracing::debug!(stage = %self.label, done, total = self.total, "stage finished");
        done
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

fn create_progress_bar(label: &str, total: u64, visible: bool) -> ProgressBar {
    let target = if visible {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let bar = ProgressBar::with_draw_target(Some(total), target);
    let style = ProgressStyle::with_template("{prefix:>8} [{elapsed_precise}] {wide_bar} {pos:>4}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    bar.set_style(style);
    bar.set_prefix(label.to_string());
    bar
}

async fn render_loop(
    bar: ProgressBar,
    counter: ProgressCounter,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) -> u64 {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => bar.set_position(counter.get()),
        }
    }

    let done = counter.get();
    bar.set_position(done);
    bar.finish();
    done
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn final_count_reflects_every_increment() {
        let tracker = ProgressTracker::start("Page", 100, Duration::from_millis(5), false);
        let mut handles = Vec::new();
        for _ in 0..10 {
            let counter = tracker.counter();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    counter.inc();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(tracker.snapshot(), 100);
        assert_eq!(tracker.finish().await, 100);
    }

    #[tokio::test]
    async fn finish_without_work_returns_zero() {
        let tracker = ProgressTracker::start("Chapter", 0, Duration::from_millis(5), false);
        assert_eq!(tracker.total(), 0);
        assert_eq!(tracker.finish().await, 0);
    }
}
