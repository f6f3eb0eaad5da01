/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A [`DurabilityJoin`] running on its own thread.
//!
//! ## Starting a durability stage
//!
//! ```no_run
//! # use std::sync::mpsc;
//! # use keystone_rs::durability::{ConsensusRound, DurabilityJoinConfiguration, DurabilityStageSpec};
//! # use keystone_rs::types::data_types::{RoundNumber, SequenceNumber};
//! # struct MyRound(u64, i64);
//! # impl ConsensusRound for MyRound {
//! #     fn round_number(&self) -> RoundNumber { RoundNumber::new(self.0) }
//! #     fn keystone_sequence(&self) -> SequenceNumber { SequenceNumber::new(self.1) }
//! # }
//! let (handled_rounds_sender, handled_rounds) = mpsc::channel();
//! let stage = DurabilityStageSpec::builder()
//!     .configuration(DurabilityJoinConfiguration::default())
//!     .on_stale_round(|event| println!("round {} is stuck", event.round))
//!     .build()
//!     .start(handled_rounds_sender);
//!
//! stage.submit_round(MyRound(0, 3)).unwrap();
//! stage.submit_durable_sequence_number(SequenceNumber::new(3)).unwrap();
//! let round: MyRound = handled_rounds.recv().unwrap();
//! stage.shutdown().unwrap();
//! ```
//!
//! Rounds and watermarks are processed in the order they are submitted. Calling
//! [`shutdown`](DurabilityStage::shutdown) (or dropping the stage) processes everything submitted
//! before it, then stops the stage thread and the event bus thread.

use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Instant,
};

use typed_builder::TypedBuilder;

use crate::{
    event_bus::*,
    events::*,
    types::data_types::SequenceNumber,
};

use super::{implementation::*, types::*};

/// Stores the configuration and the event handlers of a [`DurabilityStage`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [DurabilityStageSpec]. On the builder call the following methods to construct a valid [DurabilityStageSpec].

    Required:
    - `.configuration(...)`

    Optional:
    - `.on_release_round(...)`
    - `.on_update_durable_sequence_number(...)`
    - `.on_stale_round(...)`
    - `.on_clear(...)`
"))]
pub struct DurabilityStageSpec {
    #[builder(setter(doc = "Set the [configuration](DurabilityJoinConfiguration) of the durability join. Required."))]
    configuration: DurabilityJoinConfiguration,

    #[builder(default, setter(transform = |handler: impl Fn(&ReleaseRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReleaseRoundEvent>),
    doc = "Register a handler closure to be invoked after a round is handed downstream. Optional."))]
    on_release_round: Option<HandlerPtr<ReleaseRoundEvent>>,

    #[builder(default, setter(transform = |handler: impl Fn(&UpdateDurableSequenceNumberEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateDurableSequenceNumberEvent>),
    doc = "Register a handler closure to be invoked after the durability watermark advances. Optional."))]
    on_update_durable_sequence_number: Option<HandlerPtr<UpdateDurableSequenceNumberEvent>>,

    #[builder(default, setter(transform = |handler: impl Fn(&StaleRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StaleRoundEvent>),
    doc = "Register a handler closure to be invoked when a round has waited suspiciously long for durability. Optional."))]
    on_stale_round: Option<HandlerPtr<StaleRoundEvent>>,

    #[builder(default, setter(transform = |handler: impl Fn(&ClearDurabilityJoinEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ClearDurabilityJoinEvent>),
    doc = "Register a handler closure to be invoked after the durability join is cleared. Optional."))]
    on_clear: Option<HandlerPtr<ClearDurabilityJoinEvent>>,
}

impl DurabilityStageSpec {
    /// Start the stage thread (and, if any handler is registered or logging is enabled, the event bus
    /// thread). Released rounds are sent to `output` in the order they were submitted.
    pub fn start<R: ConsensusRound + Send + 'static>(self, output: Sender<R>) -> DurabilityStage<R> {
        let stale_round_check_period = self.configuration.stale_round_check_period;

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_release_round,
            self.on_update_durable_sequence_number,
            self.on_stale_round,
            self.on_clear,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let event_bus = event_subscriber
            .map(|event_subscriber| start_event_bus(event_handlers, event_subscriber));

        let (messages, message_receiver) = mpsc::channel();
        let durability_join = DurabilityJoin::new(self.configuration, event_publisher);
        let stage = thread::spawn(move || {
            run_stage(
                durability_join,
                message_receiver,
                output,
                stale_round_check_period,
            )
        });

        DurabilityStage {
            messages,
            stage: Some(stage),
            event_bus,
        }
    }
}

/// A handle to the threads of a running durability stage. When this value is dropped, the threads
/// are gracefully shut down.
pub struct DurabilityStage<R: ConsensusRound> {
    messages: Sender<StageMessage<R>>,
    stage: Option<JoinHandle<Result<(), DurabilityJoinError>>>,
    event_bus: Option<JoinHandle<()>>,
}

impl<R: ConsensusRound> DurabilityStage<R> {
    /// Submit the next round decided by consensus.
    pub fn submit_round(&self, round: R) -> Result<(), DurabilityStageStopped> {
        self.send(StageMessage::Round(round))
    }

    /// Submit a new durability watermark reported by the persistent event log.
    ///
    /// A watermark smaller than a previously submitted one stops the stage. The cause is returned by
    /// [`shutdown`](Self::shutdown).
    pub fn submit_durable_sequence_number(
        &self,
        durable_sequence_number: SequenceNumber,
    ) -> Result<(), DurabilityStageStopped> {
        self.send(StageMessage::DurableSequenceNumber(durable_sequence_number))
    }

    /// Clear the durability join once everything submitted before has been processed.
    pub fn clear(&self) -> Result<(), DurabilityStageStopped> {
        self.send(StageMessage::Clear)
    }

    /// Process everything submitted so far, then stop the stage.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the stage early, if any.
    pub fn shutdown(mut self) -> Result<(), DurabilityJoinError> {
        self.stop()
    }

    fn send(&self, message: StageMessage<R>) -> Result<(), DurabilityStageStopped> {
        self.messages
            .send(message)
            .map_err(|_| DurabilityStageStopped)
    }

    fn stop(&mut self) -> Result<(), DurabilityJoinError> {
        // The stage thread may have stopped already.
        let _ = self.messages.send(StageMessage::Shutdown);

        // The stage thread owns the only event publisher, so the event bus stops after it does.
        let result = match self.stage.take() {
            Some(stage) => match stage.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            },
            None => Ok(()),
        };

        if let Some(event_bus) = self.event_bus.take() {
            if event_bus.join().is_err() {
                log::error!("Event bus thread panicked");
            }
        }

        result
    }
}

impl<R: ConsensusRound> Drop for DurabilityStage<R> {
    fn drop(&mut self) {
        if self.stage.is_none() || thread::panicking() {
            return;
        }
        if let Err(err) = self.stop() {
            log::error!("Durability stage stopped with an error: {}", err);
        }
    }
}

/// Returned when submitting to a [`DurabilityStage`] whose thread has already stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DurabilityStageStopped;

impl Display for DurabilityStageStopped {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "the durability stage has stopped")
    }
}

impl std::error::Error for DurabilityStageStopped {}

enum StageMessage<R> {
    Round(R),
    DurableSequenceNumber(SequenceNumber),
    Clear,
    Shutdown,
}

fn run_stage<R: ConsensusRound>(
    mut durability_join: DurabilityJoin<R>,
    messages: Receiver<StageMessage<R>>,
    output: Sender<R>,
    stale_round_check_period: std::time::Duration,
) -> Result<(), DurabilityJoinError> {
    loop {
        let released = match messages.recv_timeout(stale_round_check_period) {
            Ok(StageMessage::Round(round)) => durability_join.add_round(round),
            Ok(StageMessage::DurableSequenceNumber(durable_sequence_number)) => {
                durability_join.set_latest_durable_sequence_number(durable_sequence_number)?
            }
            Ok(StageMessage::Clear) => {
                durability_join.clear();
                Vec::new()
            }
            Ok(StageMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Err(RecvTimeoutError::Timeout) => Vec::new(),
        };

        for round in released {
            if output.send(round).is_err() {
                log::warn!("Receiver of handled rounds is gone, stopping durability stage");
                return Ok(());
            }
        }

        durability_join.check_for_stale_rounds(Instant::now());
    }
}
