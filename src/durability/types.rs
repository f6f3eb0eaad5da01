/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of types specific to the [durability join](super::implementation::DurabilityJoin).

use std::time::{Duration, Instant};

use typed_builder::TypedBuilder;

use crate::types::data_types::{RoundNumber, SequenceNumber};

/// A round decided by the upstream consensus engine.
///
/// The durability join only needs to know which round a value is, and which event in the persistent
/// event log anchors it. Everything else about the round is opaque.
pub trait ConsensusRound {
    /// The number of this round.
    fn round_number(&self) -> RoundNumber;

    /// The stream sequence number of this round's keystone event. Once the persistent event log has
    /// made this event durable, the whole input of the round is durable.
    fn keystone_sequence(&self) -> SequenceNumber;
}

/// A round that reached the durability join before its keystone event was durable.
pub(crate) struct NotYetDurableRound<R> {
    pub(crate) round: R,
    pub(crate) received_at: Instant,
}

impl<R: ConsensusRound> NotYetDurableRound<R> {
    pub(crate) fn new(round: R, received_at: Instant) -> Self {
        Self { round, received_at }
    }

    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.received_at)
    }
}

/// Summary of how a round left the durability join, kept for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReleaseRecord {
    pub round: RoundNumber,
    pub keystone_sequence: SequenceNumber,

    /// How long the round was held. Zero for rounds released on arrival.
    pub waited: Duration,
}

/// Stores the user-defined parameters of a [`DurabilityJoin`](super::DurabilityJoin).
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use keystone_rs::durability::DurabilityJoinConfiguration;
///
/// let configuration = DurabilityJoinConfiguration::builder()
///     .suspicious_round_durability_duration(Duration::from_secs(30))
///     .log_events(true)
///     .build();
/// assert_eq!(configuration.release_history_capacity, 1024);
/// ```
#[derive(Clone, Debug, TypedBuilder)]
pub struct DurabilityJoinConfiguration {
    #[builder(
        default = Duration::from_secs(60),
        setter(doc = "Set how long a round may wait for durability before it is reported as stale. Default: 60s.")
    )]
    pub suspicious_round_durability_duration: Duration,
    #[builder(
        default = Duration::from_secs(5),
        setter(doc = "Set the minimum time between two stale round warnings. Default: 5s.")
    )]
    pub stale_round_warning_period: Duration,
    #[builder(
        default = Duration::from_secs(1),
        setter(doc = "Set how often a durability stage looks for stale rounds. Default: 1s.")
    )]
    pub stale_round_check_period: Duration,
    #[builder(
        default = 1024,
        setter(doc = "Set how many release records are kept for diagnostics. Default: 1024.")
    )]
    pub release_history_capacity: usize,
    #[builder(default = false, setter(doc = "Enable logging of events? Default: false."))]
    pub log_events: bool,
}

impl Default for DurabilityJoinConfiguration {
    fn default() -> Self {
        DurabilityJoinConfiguration::builder().build()
    }
}
