/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the durability join's
//! [configuration](crate::durability::DurabilityJoinConfiguration).
//!
//! keystone-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReleaseRound](crate::events::ReleaseRoundEvent) is printed:
//!
//! ```text
//! ReleaseRound, 1701329264, 17, 4021, 12
//! ```
//!
//! In the snippet:
//! - The third value is the round number.
//! - The fourth value is the stream sequence number of the round's keystone event.
//! - The fifth value is how long the round waited for durability, in milliseconds.

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const RELEASE_ROUND: &str = "ReleaseRound";
pub const UPDATE_DURABLE_SEQUENCE_NUMBER: &str = "UpdateDurableSequenceNumber";
pub const STALE_ROUND: &str = "StaleRound";
pub const CLEAR_DURABILITY_JOIN: &str = "ClearDurabilityJoin";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for ReleaseRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |release_round_event: &ReleaseRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RELEASE_ROUND,
                secs_since_unix_epoch(release_round_event.timestamp),
                release_round_event.round,
                release_round_event.keystone_sequence,
                release_round_event.waited.as_millis()
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateDurableSequenceNumberEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_event: &UpdateDurableSequenceNumberEvent| {
            log::info!(
                "{}, {}, {}, {}",
                UPDATE_DURABLE_SEQUENCE_NUMBER,
                secs_since_unix_epoch(update_event.timestamp),
                update_event.durable_sequence_number,
                update_event.released_rounds
            )
        };
        Box::new(logger)
    }
}

impl Logger for StaleRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |stale_round_event: &StaleRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                STALE_ROUND,
                secs_since_unix_epoch(stale_round_event.timestamp),
                stale_round_event.round,
                stale_round_event.keystone_sequence,
                stale_round_event.durable_sequence_number,
                stale_round_event.age.as_millis(),
                stale_round_event.pending_rounds
            )
        };
        Box::new(logger)
    }
}

impl Logger for ClearDurabilityJoinEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |clear_event: &ClearDurabilityJoinEvent| {
            log::info!(
                "{}, {}, {}",
                CLEAR_DURABILITY_JOIN,
                secs_since_unix_epoch(clear_event.timestamp),
                clear_event.discarded_rounds
            )
        };
        Box::new(logger)
    }
}

/// Get a more readable representation of a bytesequence by base64-encoding it and taking the first
/// 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

/// Seconds elapsed between the Unix Epoch and `timestamp`, or 0 for timestamps before the Epoch.
pub(crate) fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
