/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`DurabilityJoin`] type, which holds consensus rounds until their keystone events are durable.

use std::{
    collections::VecDeque,
    fmt::{self, Display, Formatter},
    sync::mpsc::Sender,
    time::{Duration, Instant, SystemTime},
};

use crate::{
    events::*,
    sequence_buffer::SequenceBuffer,
    types::data_types::{RoundNumber, SequenceNumber},
};

use super::types::*;

/// Joins the stream of rounds decided by consensus with the stream of durability watermarks reported
/// by the persistent event log. See the [module-level documentation](super) for the guarantees.
pub struct DurabilityJoin<R: ConsensusRound> {
    config: DurabilityJoinConfiguration,
    durable_sequence_number: SequenceNumber,
    pending: VecDeque<NotYetDurableRound<R>>,
    release_history: SequenceBuffer<ReleaseRecord>,
    stale_round_warnings: RateLimiter,
    event_publisher: Option<Sender<Event>>,
}

impl<R: ConsensusRound> DurabilityJoin<R> {
    /// Create an empty `DurabilityJoin` for which nothing is durable yet.
    pub fn new(config: DurabilityJoinConfiguration, event_publisher: Option<Sender<Event>>) -> Self {
        Self {
            release_history: SequenceBuffer::new(config.release_history_capacity.max(1)),
            stale_round_warnings: RateLimiter::new(config.stale_round_warning_period),
            config,
            durable_sequence_number: SequenceNumber::init(),
            pending: VecDeque::new(),
            event_publisher,
        }
    }

    /// Accept the next round decided by consensus, returning the rounds that can be handled now.
    ///
    /// If no earlier round is still held and `round`'s keystone event is already durable, `round` is
    /// returned immediately. Otherwise it is held until a call to
    /// [`set_latest_durable_sequence_number`](Self::set_latest_durable_sequence_number) releases it.
    pub fn add_round(&mut self, round: R) -> Vec<R> {
        if self.pending.is_empty() && round.keystone_sequence() <= self.durable_sequence_number {
            self.record_release(&round, Duration::ZERO);
            return vec![round];
        }

        self.pending
            .push_back(NotYetDurableRound::new(round, Instant::now()));
        Vec::new()
    }

    /// Accept a new durability watermark from the persistent event log, returning, in the order
    /// they were added, every held round whose keystone event is now durable.
    ///
    /// # Errors
    ///
    /// The persistent event log promises that watermarks never move backwards. If
    /// `durable_sequence_number` is smaller than the current watermark, this returns
    /// [`DurabilityJoinError::NonIncreasingDurableSequenceNumber`] and leaves the join unchanged. The
    /// caller must treat this as fatal.
    pub fn set_latest_durable_sequence_number(
        &mut self,
        durable_sequence_number: SequenceNumber,
    ) -> Result<Vec<R>, DurabilityJoinError> {
        if durable_sequence_number < self.durable_sequence_number {
            log::error!(
                "Durable sequence number moved backwards from {} to {}",
                self.durable_sequence_number,
                durable_sequence_number
            );
            return Err(DurabilityJoinError::NonIncreasingDurableSequenceNumber {
                current: self.durable_sequence_number,
                proposed: durable_sequence_number,
            });
        }
        self.durable_sequence_number = durable_sequence_number;

        let now = Instant::now();
        let mut released = Vec::new();
        while let Some(not_yet_durable) = self.pending.pop_front() {
            if not_yet_durable.round.keystone_sequence() > durable_sequence_number {
                self.pending.push_front(not_yet_durable);
                break;
            }
            let waited = not_yet_durable.age(now);
            self.record_release(&not_yet_durable.round, waited);
            released.push(not_yet_durable.round);
        }

        Event::publish(
            &self.event_publisher,
            Event::UpdateDurableSequenceNumber(UpdateDurableSequenceNumberEvent {
                timestamp: SystemTime::now(),
                durable_sequence_number,
                released_rounds: released.len(),
            }),
        );

        Ok(released)
    }

    /// Report the oldest held round if it has waited longer than the configured
    /// [suspicion duration](DurabilityJoinConfiguration::suspicious_round_durability_duration).
    ///
    /// At most one warning is emitted per call, and warnings are rate-limited to one per
    /// [warning period](DurabilityJoinConfiguration::stale_round_warning_period). This never releases,
    /// drops, or reorders rounds.
    pub fn check_for_stale_rounds(&mut self, now: Instant) {
        let oldest = match self.pending.front() {
            Some(oldest) => oldest,
            None => return,
        };

        let age = oldest.age(now);
        if age <= self.config.suspicious_round_durability_duration {
            return;
        }

        if let Some(suppressed) = self.stale_round_warnings.request(now) {
            log::warn!(
                "Round {} has been waiting {:?} for keystone event {} to become durable \
                (durable sequence number: {}, pending rounds: {}, suppressed warnings: {})",
                oldest.round.round_number(),
                age,
                oldest.round.keystone_sequence(),
                self.durable_sequence_number,
                self.pending.len(),
                suppressed
            );
            Event::publish(
                &self.event_publisher,
                Event::StaleRound(StaleRoundEvent {
                    timestamp: SystemTime::now(),
                    round: oldest.round.round_number(),
                    keystone_sequence: oldest.round.keystone_sequence(),
                    durable_sequence_number: self.durable_sequence_number,
                    age,
                    pending_rounds: self.pending.len(),
                }),
            );
        }
    }

    /// Forget the durability watermark and discard, without releasing, every held round.
    ///
    /// This is meant for a full pipeline reset (e.g., after reconnecting). The caller is responsible
    /// for re-deriving which rounds still need to be handled.
    pub fn clear(&mut self) {
        let discarded_rounds = self.pending.len();
        self.pending.clear();
        self.durable_sequence_number = SequenceNumber::init();
        self.release_history.clear();

        Event::publish(
            &self.event_publisher,
            Event::ClearDurabilityJoin(ClearDurabilityJoinEvent {
                timestamp: SystemTime::now(),
                discarded_rounds,
            }),
        );
    }

    /// Get the latest durability watermark.
    pub fn durable_sequence_number(&self) -> SequenceNumber {
        self.durable_sequence_number
    }

    /// Check whether the event with stream sequence number `sequence_number` is known to be durable.
    pub fn is_sequence_durable(&self, sequence_number: SequenceNumber) -> bool {
        sequence_number <= self.durable_sequence_number
    }

    /// Get the number of rounds currently held.
    pub fn pending_round_count(&self) -> usize {
        self.pending.len()
    }

    /// Get how long the oldest held round has been waiting, or `None` if no round is held.
    pub fn oldest_pending_age(&self, now: Instant) -> Option<Duration> {
        self.pending.front().map(|oldest| oldest.age(now))
    }

    /// Get the release record of `round`, if it was released recently enough to still be in the
    /// [release history](DurabilityJoinConfiguration::release_history_capacity).
    pub fn release_record(&self, round: RoundNumber) -> Option<&ReleaseRecord> {
        let index = i64::try_from(round.int()).ok()?;
        self.release_history.get(index)
    }

    fn record_release(&mut self, round: &R, waited: Duration) {
        let record = ReleaseRecord {
            round: round.round_number(),
            keystone_sequence: round.keystone_sequence(),
            waited,
        };
        if let Ok(index) = i64::try_from(record.round.int()) {
            self.release_history.add(index, record);
        }

        Event::publish(
            &self.event_publisher,
            Event::ReleaseRound(ReleaseRoundEvent {
                timestamp: SystemTime::now(),
                round: record.round,
                keystone_sequence: record.keystone_sequence,
                waited,
            }),
        );
    }
}

/// Allows an action at most once per `period`, counting the requests it turns down in between.
struct RateLimiter {
    period: Duration,
    last_allowed: Option<Instant>,
    suppressed: u64,
}

impl RateLimiter {
    fn new(period: Duration) -> Self {
        Self {
            period,
            last_allowed: None,
            suppressed: 0,
        }
    }

    /// Returns the number of requests suppressed since the last allowed one if this request is
    /// allowed, or `None` if it is suppressed.
    fn request(&mut self, now: Instant) -> Option<u64> {
        match self.last_allowed {
            Some(last_allowed) if now.saturating_duration_since(last_allowed) < self.period => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last_allowed = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

/// The ways a call to a method of [`DurabilityJoin`] can fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DurabilityJoinError {
    /// An attempt was made to move the durability watermark backwards. This violates the contract of
    /// the persistent event log, and means that the durability of held rounds can no longer be
    /// trusted.
    NonIncreasingDurableSequenceNumber {
        /// The current watermark.
        current: SequenceNumber,

        /// The lower watermark that the caller tried to set.
        proposed: SequenceNumber,
    },
}

impl Display for DurabilityJoinError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DurabilityJoinError::NonIncreasingDurableSequenceNumber { current, proposed } => write!(
                f,
                "durable sequence number cannot move backwards (current: {}, proposed: {})",
                current, proposed
            ),
        }
    }
}

impl std::error::Error for DurabilityJoinError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct TestRound {
        round: u64,
        keystone: i64,
    }

    impl TestRound {
        fn new(round: u64, keystone: i64) -> Self {
            Self { round, keystone }
        }
    }

    impl ConsensusRound for TestRound {
        fn round_number(&self) -> RoundNumber {
            RoundNumber::new(self.round)
        }

        fn keystone_sequence(&self) -> SequenceNumber {
            SequenceNumber::new(self.keystone)
        }
    }

    fn durability_join() -> DurabilityJoin<TestRound> {
        DurabilityJoin::new(DurabilityJoinConfiguration::default(), None)
    }

    fn seq(int: i64) -> SequenceNumber {
        SequenceNumber::new(int)
    }

    #[test]
    fn fast_path_releases_durable_round_immediately() {
        let mut join = durability_join();
        join.set_latest_durable_sequence_number(seq(10)).unwrap();

        let round = TestRound::new(1, 5);
        assert_eq!(join.add_round(round.clone()), vec![round]);
        assert_eq!(join.pending_round_count(), 0);
        assert_eq!(
            join.release_record(RoundNumber::new(1)).map(|record| record.waited),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn rounds_are_held_until_durable() {
        let mut join = durability_join();
        join.set_latest_durable_sequence_number(seq(0)).unwrap();

        let a = TestRound::new(1, 5);
        let b = TestRound::new(2, 8);
        assert!(join.add_round(a.clone()).is_empty());
        assert!(join.add_round(b.clone()).is_empty());
        assert_eq!(join.set_latest_durable_sequence_number(seq(5)).unwrap(), vec![a]);
        assert_eq!(join.set_latest_durable_sequence_number(seq(8)).unwrap(), vec![b]);
        assert_eq!(join.pending_round_count(), 0);
    }

    #[test]
    fn durable_round_waits_behind_earlier_pending_round() {
        let mut join = durability_join();
        join.set_latest_durable_sequence_number(seq(3)).unwrap();

        let a = TestRound::new(1, 5);
        let b = TestRound::new(2, 5);
        assert!(join.add_round(a.clone()).is_empty());
        // b's keystone is not durable either, and even if it were it must not overtake a.
        assert!(join.add_round(b.clone()).is_empty());
        assert_eq!(
            join.set_latest_durable_sequence_number(seq(20)).unwrap(),
            vec![a, b]
        );
    }

    #[test]
    fn watermark_that_moves_backwards_is_rejected() {
        let mut join = durability_join();
        join.set_latest_durable_sequence_number(seq(10)).unwrap();
        join.add_round(TestRound::new(1, 12));

        let result = join.set_latest_durable_sequence_number(seq(9));
        assert_eq!(
            result,
            Err(DurabilityJoinError::NonIncreasingDurableSequenceNumber {
                current: seq(10),
                proposed: seq(9),
            })
        );
        assert_eq!(join.durable_sequence_number(), seq(10));
        assert_eq!(join.pending_round_count(), 1);
    }

    #[test]
    fn repeating_the_same_watermark_is_allowed() {
        let mut join = durability_join();
        join.set_latest_durable_sequence_number(seq(4)).unwrap();
        assert!(join.set_latest_durable_sequence_number(seq(4)).unwrap().is_empty());
    }

    #[test]
    fn clear_discards_pending_rounds() {
        let mut join = durability_join();
        join.set_latest_durable_sequence_number(seq(2)).unwrap();
        join.add_round(TestRound::new(1, 3));
        join.add_round(TestRound::new(2, 4));
        join.clear();

        assert_eq!(join.pending_round_count(), 0);
        assert_eq!(join.durable_sequence_number(), SequenceNumber::init());
        assert!(join.set_latest_durable_sequence_number(seq(10)).unwrap().is_empty());
    }

    #[test]
    fn durability_query() {
        let mut join = durability_join();
        assert!(!join.is_sequence_durable(seq(0)));
        join.set_latest_durable_sequence_number(seq(7)).unwrap();
        assert!(join.is_sequence_durable(seq(7)));
        assert!(!join.is_sequence_durable(seq(8)));
    }

    #[test]
    fn interleaved_calls_release_every_round_once_and_in_order() {
        let mut join = durability_join();
        let rounds: Vec<TestRound> = (0..50)
            .map(|i| TestRound::new(i, (i as i64) * 3))
            .collect();

        let mut released = Vec::new();
        let mut watermark = -1;
        for (i, round) in rounds.iter().enumerate() {
            for handled in join.add_round(round.clone()) {
                assert!(handled.keystone <= watermark);
                released.push(handled);
            }
            if i % 4 == 3 {
                watermark += 7;
                for handled in join.set_latest_durable_sequence_number(seq(watermark)).unwrap() {
                    assert!(handled.keystone <= watermark);
                    released.push(handled);
                }
            }
        }
        released.extend(join.set_latest_durable_sequence_number(seq(1_000)).unwrap());

        assert_eq!(released, rounds);
    }

    #[test]
    fn stale_rounds_are_reported_at_a_limited_rate() {
        let (event_publisher, event_subscriber) = mpsc::channel();
        let configuration = DurabilityJoinConfiguration::builder()
            .suspicious_round_durability_duration(Duration::from_secs(10))
            .stale_round_warning_period(Duration::from_secs(60))
            .build();
        let mut join = DurabilityJoin::new(configuration, Some(event_publisher));
        join.add_round(TestRound::new(1, 100));

        let now = Instant::now();
        join.check_for_stale_rounds(now);
        join.check_for_stale_rounds(now + Duration::from_secs(11));
        join.check_for_stale_rounds(now + Duration::from_secs(12));
        join.check_for_stale_rounds(now + Duration::from_secs(80));

        let stale_rounds: Vec<StaleRoundEvent> = event_subscriber
            .try_iter()
            .filter_map(|event| match event {
                Event::StaleRound(stale_round_event) => Some(stale_round_event),
                _ => None,
            })
            .collect();
        assert_eq!(stale_rounds.len(), 2);
        assert_eq!(stale_rounds[0].round, RoundNumber::new(1));
        assert_eq!(stale_rounds[0].pending_rounds, 1);

        // Checking for stale rounds never releases them.
        assert_eq!(join.pending_round_count(), 1);
    }

    #[test]
    fn oldest_pending_age_tracks_front_round() {
        let mut join = durability_join();
        assert_eq!(join.oldest_pending_age(Instant::now()), None);
        join.add_round(TestRound::new(1, 1));
        let later = Instant::now() + Duration::from_secs(5);
        assert!(join.oldest_pending_age(later).unwrap() >= Duration::from_secs(5));
    }

    #[test]
    fn released_rounds_are_published() {
        let (event_publisher, event_subscriber) = mpsc::channel();
        let mut join = DurabilityJoin::new(DurabilityJoinConfiguration::default(), Some(event_publisher));
        join.add_round(TestRound::new(1, 0));
        join.add_round(TestRound::new(2, 1));
        join.set_latest_durable_sequence_number(seq(1)).unwrap();

        let released: Vec<RoundNumber> = event_subscriber
            .try_iter()
            .filter_map(|event| match event {
                Event::ReleaseRound(release_round_event) => Some(release_round_event.round),
                _ => None,
            })
            .collect();
        assert_eq!(released, vec![RoundNumber::new(1), RoundNumber::new(2)]);
        assert!(join.release_record(RoundNumber::new(2)).is_some());
    }
}
