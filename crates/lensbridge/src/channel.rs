use std::sync::{Mutex, MutexGuard};

use crate::types::{ParameterPair, ParameterSnapshot};

/// Latest-value handoff of [`ParameterPair`]s from caller threads to the renderer.
///
/// Writers overwrite whatever has not been consumed yet; only the newest pair
/// matters for a continuously driven uniform. The pair and its version live
/// behind one mutex so a reader always sees both coefficients from the same
/// write.
#[derive(Debug)]
pub struct ParameterChannel {
    slot: Mutex<ParameterSnapshot>,
}

impl ParameterChannel {
    /// Creates a channel whose first read returns `initial` at version 0.
    pub fn new(initial: ParameterPair) -> Self {
        Self {
            slot: Mutex::new(ParameterSnapshot {
                pair: initial,
                version: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ParameterSnapshot> {
        // The guarded value is plain data that is always written whole, so a
        // poisoned lock still holds a consistent snapshot.
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publishes `pair` and returns the version it was assigned.
    ///
    /// Versions increase strictly across all writers, giving concurrent calls
    /// a total order in which the last one wins.
    pub fn write(&self, pair: ParameterPair) -> u64 {
        let mut slot = self.lock();
        slot.version = slot.version.wrapping_add(1);
        slot.pair = pair;
        slot.version
    }

    /// Publishes `pair` only if `admit` succeeds, evaluated while the slot is locked.
    ///
    /// Pairs with [`ParameterChannel::locked`]: a condition flipped under the
    /// lock cannot change between the check and the write.
    pub fn write_when<E>(
        &self,
        pair: ParameterPair,
        admit: impl FnOnce() -> Result<(), E>,
    ) -> Result<u64, E> {
        let mut slot = self.lock();
        admit()?;
        slot.version = slot.version.wrapping_add(1);
        slot.pair = pair;
        Ok(slot.version)
    }

    /// Runs `op` with the slot locked, excluding concurrent writers.
    pub fn locked<R>(&self, op: impl FnOnce() -> R) -> R {
        let _slot = self.lock();
        op()
    }

    /// Replaces the current value, treating it as a fresh publication.
    pub fn seed(&self, pair: ParameterPair) -> u64 {
        self.write(pair)
    }

    /// Returns the most recently published pair and its version.
    pub fn read_latest(&self) -> ParameterSnapshot {
        *self.lock()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn read_before_any_write_returns_seed() {
        let channel = ParameterChannel::new(ParameterPair::new(0.25, 0.05));
        let snapshot = channel.read_latest();
        assert_eq!(snapshot.pair, ParameterPair::new(0.25, 0.05));
        assert_eq!(snapshot.version, 0);
    }

    #[test]
    fn rejected_conditional_write_leaves_the_slot_alone() {
        let channel = ParameterChannel::new(ParameterPair::new(0.25, 0.05));
        let rejected = channel.write_when(ParameterPair::new(9.0, 9.0), || Err("closed"));
        assert_eq!(rejected, Err("closed"));
        assert_eq!(channel.read_latest().pair, ParameterPair::new(0.25, 0.05));
        assert_eq!(channel.version(), 0);

        let accepted = channel.write_when(ParameterPair::new(1.0, 2.0), || Ok::<(), ()>(()));
        assert_eq!(accepted, Ok(1));
        assert_eq!(channel.read_latest().pair, ParameterPair::new(1.0, 2.0));
    }

    #[test]
    fn later_writes_overwrite_earlier_ones() {
        let channel = ParameterChannel::new(ParameterPair::default());
        let first = channel.write(ParameterPair::new(1.0, 2.0));
        let second = channel.write(ParameterPair::new(3.0, 4.0));
        assert!(second > first);
        let snapshot = channel.read_latest();
        assert_eq!(snapshot.pair, ParameterPair::new(3.0, 4.0));
        assert_eq!(snapshot.version, second);
    }

    #[test]
    fn concurrent_writers_never_produce_torn_pairs() {
        // Every writer publishes pairs with k2 == -k1 * 10, so a torn read
        // would break the relation.
        let channel = Arc::new(ParameterChannel::new(ParameterPair::new(0.0, 0.0)));
        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    for step in 0..5_000u32 {
                        let k1 = (writer * 10_000 + step) as f32;
                        channel.write(ParameterPair::new(k1, -k1 * 10.0));
                    }
                })
            })
            .collect();

        let mut last_version = 0;
        for _ in 0..20_000 {
            let snapshot = channel.read_latest();
            assert_eq!(snapshot.pair.k2, -snapshot.pair.k1 * 10.0, "torn read: {snapshot:?}");
            assert!(snapshot.version >= last_version);
            last_version = snapshot.version;
        }

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(channel.version(), 20_000);
    }

    #[test]
    fn single_writer_order_is_preserved() {
        let channel = Arc::new(ParameterChannel::new(ParameterPair::default()));
        let writer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for step in 1..=10_000u32 {
                    channel.write(ParameterPair::new(step as f32, 0.0));
                }
            })
        };
        let mut last_seen = 0.0f32;
        while !writer.is_finished() {
            let k1 = channel.read_latest().pair.k1;
            assert!(k1 >= last_seen, "went backwards: {k1} < {last_seen}");
            last_seen = k1;
        }
        writer.join().unwrap();
        assert_eq!(channel.read_latest().pair.k1, 10_000.0);
    }
}
