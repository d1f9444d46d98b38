//! Per-worker backpressure table: `receiver -> set<sender>`.
//!
//! A sender appears in at most one worker's table at a time (senders are
//! partitioned by ownership), which is what lets `mute`/`unmute_senders`
//! touch the shared `muted` counter with a relaxed atomic instead of a CAS
//! loop: only the worker holding the sender's row ever mutates it.

use std::sync::atomic::Ordering;

use rustc_hash::FxHashMap;

use crate::actor::{actor_id, ActorHandle, ActorId};

#[derive(Default)]
pub struct MuteTable {
    rows: FxHashMap<ActorId, FxHashMap<ActorId, ActorHandle>>,
}

impl MuteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Record that `sender` is currently parked on `receiver`. Increments
    /// `sender.muted` only on the first insertion for this pair, matching
    /// the invariant that the counter tracks distinct receivers, not
    /// message volume.
    pub fn mute(&mut self, sender: &ActorHandle, receiver: &ActorHandle) {
        assert!(
            !std::sync::Arc::ptr_eq(sender, receiver),
            "an actor cannot mute itself"
        );
        let row = self.rows.entry(actor_id(receiver)).or_default();
        if row.insert(actor_id(sender), sender.clone()).is_none() {
            sender.muted().fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove the row for `receiver`, decrementing every collected sender's
    /// counter. Returns the senders whose count just reached zero -- the
    /// caller reschedules the ones that aren't flagged unscheduled and
    /// broadcasts a further `UnmuteActor` for all of them regardless,
    /// since other workers' tables may still hold them as a sender for a
    /// different receiver key.
    pub fn unmute_senders(&mut self, receiver: &ActorHandle) -> Vec<ActorHandle> {
        let Some(row) = self.rows.remove(&actor_id(receiver)) else {
            return Vec::new();
        };

        let mut drained = Vec::with_capacity(row.len());
        for (_, sender) in row {
            let previous = sender.muted().fetch_sub(1, Ordering::Relaxed);
            debug_assert!(previous > 0, "muted counter underflowed on unmute");
            if previous == 1 {
                drained.push(sender);
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    struct DummyActor {
        muted: AtomicU64,
        unscheduled: bool,
    }

    impl Actor for DummyActor {
        fn muted(&self) -> &AtomicU64 {
            &self.muted
        }

        fn is_unscheduled(&self) -> bool {
            self.unscheduled
        }
    }

    fn actor() -> ActorHandle {
        Arc::new(DummyActor {
            muted: AtomicU64::new(0),
            unscheduled: false,
        })
    }

    #[test]
    #[should_panic(expected = "cannot mute itself")]
    fn mute_rejects_self_targeting() {
        let mut table = MuteTable::new();
        let a = actor();
        table.mute(&a, &a);
    }

    #[test]
    fn mute_increments_once_per_pair() {
        let mut table = MuteTable::new();
        let sender = actor();
        let receiver = actor();
        table.mute(&sender, &receiver);
        table.mute(&sender, &receiver);
        assert_eq!(sender.muted().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unmute_senders_drains_row_and_decrements() {
        let mut table = MuteTable::new();
        let sender = actor();
        let receiver = actor();
        table.mute(&sender, &receiver);
        assert_eq!(sender.muted().load(Ordering::Relaxed), 1);

        let drained = table.unmute_senders(&receiver);
        assert_eq!(drained.len(), 1);
        assert_eq!(sender.muted().load(Ordering::Relaxed), 0);
        assert!(table.is_empty());

        assert!(table.unmute_senders(&receiver).is_empty());
    }

    #[test]
    fn unmute_skips_rows_for_unrelated_receivers() {
        let mut table = MuteTable::new();
        let sender = actor();
        let receiver_a = actor();
        let receiver_b = actor();
        table.mute(&sender, &receiver_a);

        assert!(table.unmute_senders(&receiver_b).is_empty());
        assert_eq!(sender.muted().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn multiple_senders_on_one_receiver_each_drain_independently() {
        let mut table = MuteTable::new();
        let s1 = actor();
        let s2 = actor();
        let receiver = actor();
        table.mute(&s1, &receiver);
        table.mute(&s2, &receiver);

        let drained = table.unmute_senders(&receiver);
        assert_eq!(drained.len(), 2);
        assert_eq!(s1.muted().load(Ordering::Relaxed), 0);
        assert_eq!(s2.muted().load(Ordering::Relaxed), 0);
    }
}
