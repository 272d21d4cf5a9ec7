//! # Per-Subject Sequencer
//!
//! A subject's second request is not accepted before its first is
//! resolved. Each subject has a lane with a single turn; waiters are served
//! in arrival order. Different subjects never wait on each other.

use dashmap::DashMap;
use shared_types::SubjectId;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type Lanes = DashMap<SubjectId, Arc<Semaphore>>;

#[derive(Debug, Default)]
pub struct SubjectSequencer {
    lanes: Arc<Lanes>,
}

impl SubjectSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `subject`'s turn.
    pub async fn acquire(&self, subject: &SubjectId) -> SubjectTurn {
        let lane = Arc::clone(
            self.lanes
                .entry(subject.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .value(),
        );
        // Lanes are never closed, so acquisition only fails after a close.
        let permit = lane.acquire_owned().await.ok();
        SubjectTurn {
            permit,
            subject: subject.clone(),
            lanes: Arc::clone(&self.lanes),
        }
    }

    /// Subjects with a turn held or waited on.
    pub fn active_subjects(&self) -> usize {
        self.lanes.len()
    }
}

/// Held until the subject's current request is resolved.
#[derive(Debug)]
pub struct SubjectTurn {
    permit: Option<OwnedSemaphorePermit>,
    subject: SubjectId,
    lanes: Arc<Lanes>,
}

impl Drop for SubjectTurn {
    fn drop(&mut self) {
        drop(self.permit.take());
        // Only the map holds the lane once nobody waits on it.
        self.lanes
            .remove_if(&self.subject, |_, lane| Arc::strong_count(lane) == 1);
    }
}
