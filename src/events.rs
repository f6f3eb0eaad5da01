/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of keystone-rs events, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published
//! by a [`DurabilityJoin`](crate::durability::DurabilityJoin) onto a channel, and are consumed by the
//! [event bus](crate::event_bus), which passes them to the registered handlers.

use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::types::data_types::{RoundNumber, SequenceNumber};

/// Something a [`DurabilityJoin`](crate::durability::DurabilityJoin) did.
///
/// Publishing an event never blocks and never fails. If the event bus has stopped, the event is
/// dropped and the join carries on.
pub enum Event {
    ReleaseRound(ReleaseRoundEvent),
    UpdateDurableSequenceNumber(UpdateDurableSequenceNumberEvent),
    StaleRound(StaleRoundEvent),
    ClearDurabilityJoin(ClearDurabilityJoinEvent),
}

impl Event {
    /// Publish `event` if there is a publisher. Events are dropped silently if the event bus is gone.
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// A round was handed downstream, either immediately (`waited` is zero) or once the durability
/// watermark reached its keystone event.
pub struct ReleaseRoundEvent {
    pub timestamp: SystemTime,
    pub round: RoundNumber,
    pub keystone_sequence: SequenceNumber,
    pub waited: Duration,
}

/// The persistent event log reported a new durability watermark.
pub struct UpdateDurableSequenceNumberEvent {
    pub timestamp: SystemTime,
    pub durable_sequence_number: SequenceNumber,
    pub released_rounds: usize,
}

/// The oldest pending round has been waiting for durability for longer than the configured
/// suspicion duration.
pub struct StaleRoundEvent {
    pub timestamp: SystemTime,
    pub round: RoundNumber,
    pub keystone_sequence: SequenceNumber,
    pub durable_sequence_number: SequenceNumber,
    pub age: Duration,
    pub pending_rounds: usize,
}

/// The durability join was reset, discarding the rounds it was holding.
pub struct ClearDurabilityJoinEvent {
    pub timestamp: SystemTime,
    pub discarded_rounds: usize,
}
