use std::{collections::HashMap, time::Duration};

use tokio::{sync::mpsc, task::AbortHandle, time::sleep};
use tracing::debug;

use crate::state::game::TimerSlot;

/// Message injected into a game's command channel when a countdown expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub slot: TimerSlot,
    pub generation: u64,
}

struct ArmedTimer {
    generation: u64,
    handle: AbortHandle,
}

/// Countdowns of one game, keyed by slot.
///
/// Arming a slot replaces its previous countdown. A countdown only holds a weak
/// sender so a finished game is never kept alive by its timers, and every
/// countdown is aborted when the set is dropped.
pub struct Timers<M> {
    tx: mpsc::WeakSender<M>,
    active: HashMap<TimerSlot, ArmedTimer>,
    generation: u64,
}

impl<M> Timers<M>
where
    M: From<TimerFired> + Send + 'static,
{
    pub fn new(tx: mpsc::WeakSender<M>) -> Self {
        Self {
            tx,
            active: HashMap::new(),
            generation: 0,
        }
    }

    /// Start a countdown that reports `slot` after `after`.
    pub fn arm(&mut self, slot: TimerSlot, after: Duration) {
        self.generation += 1;
        let generation = self.generation;
        let fired = TimerFired {
            slot: slot.clone(),
            generation,
        };
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            sleep(after).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(M::from(fired)).await;
            }
        })
        .abort_handle();

        debug!(?slot, generation, ?after, "timer armed");
        if let Some(previous) = self.active.insert(slot, ArmedTimer { generation, handle }) {
            previous.handle.abort();
        }
    }

    pub fn cancel(&mut self, slot: &TimerSlot) {
        if let Some(timer) = self.active.remove(slot) {
            timer.handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.active.drain() {
            timer.handle.abort();
        }
    }

    pub fn is_armed(&self, slot: &TimerSlot) -> bool {
        self.active.contains_key(slot)
    }

    /// Consume `fired` if it belongs to the live countdown of its slot.
    ///
    /// A countdown that was cancelled or re-armed after it already queued its
    /// message is stale and reported as such.
    pub fn take_if_current(&mut self, fired: &TimerFired) -> bool {
        match self.active.get(&fired.slot) {
            Some(timer) if timer.generation == fired.generation => {
                self.active.remove(&fired.slot);
                true
            }
            _ => false,
        }
    }
}

impl<M> Drop for Timers<M> {
    fn drop(&mut self) {
        for (_, timer) in self.active.drain() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Harness = (
        Timers<TimerFired>,
        mpsc::Sender<TimerFired>,
        mpsc::Receiver<TimerFired>,
    );

    fn timers() -> Harness {
        let (tx, rx) = mpsc::channel(8);
        (Timers::new(tx.downgrade()), tx, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_duration() {
        let (mut timers, _tx, mut rx) = timers();
        timers.arm(TimerSlot::Phase, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.slot, TimerSlot::Phase);
        assert!(timers.take_if_current(&fired));
        assert!(!timers.is_armed(&TimerSlot::Phase));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_stay_silent() {
        let (mut timers, _tx, mut rx) = timers();
        timers.arm(TimerSlot::Answer("p1".into()), Duration::from_secs(5));
        timers.arm(TimerSlot::Wager("p2".into()), Duration::from_secs(5));
        timers.cancel(&TimerSlot::Answer("p1".into()));
        timers.cancel_all();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_makes_older_messages_stale() {
        let (mut timers, _tx, mut rx) = timers();
        timers.arm(TimerSlot::Phase, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        let stale = rx.recv().await.unwrap();

        timers.arm(TimerSlot::Phase, Duration::from_secs(30));
        assert!(!timers.take_if_current(&stale));
        assert!(timers.is_armed(&TimerSlot::Phase));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_set_aborts_countdowns() {
        let (mut timers, _tx, mut rx) = timers();
        timers.arm(TimerSlot::Phase, Duration::from_secs(1));
        drop(timers);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }
}
