/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Gate that holds decided consensus rounds until their input is durable.
//!
//! Consensus may decide a round before the events it was decided from have been written to the
//! persistent event log. Handling such a round (e.g., applying its transactions to the state) would
//! allow the node to act on input it could lose in a crash. The [`DurabilityJoin`] prevents this by
//! joining two streams:
//! 1. **Decided rounds**, via [`add_round`](DurabilityJoin::add_round). Every round names a
//!    *keystone event*, whose stream sequence number is a conservative bound on the round's input.
//! 2. **Durability watermarks**, via
//!    [`set_latest_durable_sequence_number`](DurabilityJoin::set_latest_durable_sequence_number). A
//!    watermark `n` means that every event with stream sequence number `<= n` is durable.
//!
//! ## Guarantees
//!
//! - A round is released only once its keystone sequence number is at most the latest watermark.
//! - Rounds are released in exactly the order they were added. A round whose keystone is already
//!   durable still waits behind earlier rounds that are not.
//! - Every added round is released at most once, and exactly once if the watermark eventually
//!   reaches its keystone (unless the join is [cleared](DurabilityJoin::clear) first).
//! - The watermark never moves backwards. An attempt to move it backwards is rejected with
//!   [`DurabilityJoinError::NonIncreasingDurableSequenceNumber`] and leaves the join unchanged.
//!
//! ## Stale rounds
//!
//! A round that has waited longer than the
//! [suspicion duration](DurabilityJoinConfiguration::suspicious_round_durability_duration) usually
//! means that the persistent event log is stuck.
//! [`check_for_stale_rounds`](DurabilityJoin::check_for_stale_rounds) reports such rounds through a
//! rate-limited warning and a [`StaleRoundEvent`](crate::events::StaleRoundEvent). It never releases
//! or drops them.
//!
//! ## Threading
//!
//! A `DurabilityJoin` is a plain single-threaded value. [`DurabilityStageSpec::start`] moves one onto
//! its own thread and feeds it from a channel, so that the consensus and persistence threads never
//! share it directly.

pub mod implementation;

pub mod stage;

pub mod types;

pub use implementation::{DurabilityJoin, DurabilityJoinError};

pub use stage::{DurabilityStage, DurabilityStageSpec, DurabilityStageStopped};

pub use types::{ConsensusRound, DurabilityJoinConfiguration, ReleaseRecord};
