// Playback scheduler: strict FIFO playback of decoded assistant audio
//
// Entry N+1 is only handed to the output once entry N's `play` future has
// resolved, so segments are never audible simultaneously and are heard in
// arrival order. Completion is reported over a channel rather than awaited,
// so the owner's event loop never blocks on playback.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::AudioOutput;
use crate::error::SessionError;

/// A decoded PCM16 segment awaiting playback
#[derive(Debug, Clone)]
pub struct PlaybackEntry {
    pub id: u64,
    pub samples: Vec<i16>,
}

/// Completion signal for one entry
#[derive(Debug)]
pub struct PlaybackFinished {
    pub id: u64,
    pub result: Result<(), SessionError>,
}

/// How `clear` treats the entry currently playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Let the in-flight segment finish
    Graceful,
    /// Stop the in-flight segment immediately
    Forced,
}

struct InFlight {
    id: u64,
    task: JoinHandle<()>,
}

pub struct PlaybackScheduler {
    output: Arc<dyn AudioOutput>,
    sample_rate: u32,
    queue: VecDeque<PlaybackEntry>,
    playing: Option<InFlight>,
    next_id: u64,
    done_tx: mpsc::UnboundedSender<PlaybackFinished>,
}

impl PlaybackScheduler {
    /// Create a scheduler and the receiver its completion signals arrive on
    ///
    /// The owner must feed every received signal back through [`Self::on_finished`].
    pub fn new(
        output: Arc<dyn AudioOutput>,
        sample_rate: u32,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackFinished>) {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        info!("Playback scheduler initialized ({}, {}Hz)", output.name(), sample_rate);

        (
            Self {
                output,
                sample_rate,
                queue: VecDeque::new(),
                playing: None,
                next_id: 0,
                done_tx,
            },
            done_rx,
        )
    }

    /// Append a segment to the tail, starting playback if idle
    pub fn enqueue(&mut self, samples: Vec<i16>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        debug!("Queued segment {} ({} samples)", id, samples.len());
        self.queue.push_back(PlaybackEntry { id, samples });
        self.pump();
        id
    }

    /// Handle a completion signal; returns true once the scheduler is idle
    ///
    /// Signals for entries that are no longer in flight (e.g. after a forced
    /// clear) are ignored.
    pub fn on_finished(&mut self, id: u64) -> bool {
        match &self.playing {
            Some(in_flight) if in_flight.id == id => {
                debug!("Segment {} finished", id);
                self.playing = None;
                self.pump();
            }
            _ => debug!("Ignoring stale completion for segment {}", id),
        }
        self.is_idle()
    }

    /// Discard all not-yet-started entries
    pub fn clear(&mut self, mode: ClearMode) {
        let dropped = self.queue.len();
        self.queue.clear();

        if mode == ClearMode::Forced {
            if let Some(in_flight) = self.playing.take() {
                in_flight.task.abort();
                self.output.stop();
            }
        }

        if dropped > 0 {
            info!("Playback cleared ({:?}): {} queued segments dropped", mode, dropped);
        }
    }

    /// True while any entry is queued or playing
    pub fn is_active(&self) -> bool {
        self.playing.is_some() || !self.queue.is_empty()
    }

    pub fn is_idle(&self) -> bool {
        !self.is_active()
    }

    /// Number of entries waiting behind the one playing
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn pump(&mut self) {
        if self.playing.is_some() {
            return;
        }
        let Some(entry) = self.queue.pop_front() else {
            return;
        };

        let output = Arc::clone(&self.output);
        let done_tx = self.done_tx.clone();
        let sample_rate = self.sample_rate;
        let id = entry.id;

        let task = tokio::spawn(async move {
            let result = output.play(entry.samples, sample_rate).await;
            if let Err(e) = &result {
                warn!("Playback of segment {} failed: {}", id, e);
            }
            let _ = done_tx.send(PlaybackFinished { id, result });
        });

        self.playing = Some(InFlight { id, task });
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        if let Some(in_flight) = self.playing.take() {
            in_flight.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::sync::Mutex;

    /// Output that completes instantly and records what it played
    #[derive(Default)]
    struct InstantOutput {
        played: Mutex<Vec<Vec<i16>>>,
        stops: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl AudioOutput for InstantOutput {
        async fn play(&self, samples: Vec<i16>, _sample_rate: u32) -> Result<()> {
            self.played.lock().unwrap().push(samples);
            Ok(())
        }

        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }

        fn name(&self) -> &str {
            "instant"
        }
    }

    #[tokio::test]
    async fn test_enqueue_starts_playback_when_idle() {
        let output = Arc::new(InstantOutput::default());
        let (mut scheduler, mut done_rx) = PlaybackScheduler::new(output.clone(), 24_000);

        let id = scheduler.enqueue(vec![1, 2, 3]);
        assert!(scheduler.is_active());
        assert_eq!(scheduler.pending(), 0);

        let finished = done_rx.recv().await.unwrap();
        assert_eq!(finished.id, id);
        assert!(finished.result.is_ok());
        assert!(scheduler.on_finished(finished.id));
        assert_eq!(output.played.lock().unwrap().as_slice(), &[vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_second_entry_waits_for_first() {
        let output = Arc::new(InstantOutput::default());
        let (mut scheduler, mut done_rx) = PlaybackScheduler::new(output.clone(), 24_000);

        scheduler.enqueue(vec![1]);
        scheduler.enqueue(vec![2]);
        assert_eq!(scheduler.pending(), 1);

        let first = done_rx.recv().await.unwrap();
        assert_eq!(output.played.lock().unwrap().len(), 1);
        assert!(!scheduler.on_finished(first.id));
        assert_eq!(scheduler.pending(), 0);

        let second = done_rx.recv().await.unwrap();
        assert!(scheduler.on_finished(second.id));
        assert_eq!(output.played.lock().unwrap().as_slice(), &[vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_graceful_clear_keeps_in_flight() {
        let output = Arc::new(InstantOutput::default());
        let (mut scheduler, mut done_rx) = PlaybackScheduler::new(output.clone(), 24_000);

        scheduler.enqueue(vec![1]);
        scheduler.enqueue(vec![2]);
        scheduler.enqueue(vec![3]);
        scheduler.clear(ClearMode::Graceful);

        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.is_active());
        assert_eq!(*output.stops.lock().unwrap(), 0);

        let first = done_rx.recv().await.unwrap();
        assert!(scheduler.on_finished(first.id));
        assert_eq!(output.played.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forced_clear_stops_output_and_ignores_stale_signal() {
        let output = Arc::new(InstantOutput::default());
        let (mut scheduler, _done_rx) = PlaybackScheduler::new(output.clone(), 24_000);

        let id = scheduler.enqueue(vec![1]);
        scheduler.enqueue(vec![2]);
        scheduler.clear(ClearMode::Forced);

        assert!(scheduler.is_idle());
        assert_eq!(*output.stops.lock().unwrap(), 1);
        assert!(scheduler.on_finished(id));
    }
}
