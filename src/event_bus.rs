/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives published [events](crate::events) and fires the handlers registered for them.

use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::Receiver;
use std::thread;
use std::thread::JoinHandle;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) release_round_handlers: Vec<HandlerPtr<ReleaseRoundEvent>>,
    pub(crate) update_durable_sequence_number_handlers:
        Vec<HandlerPtr<UpdateDurableSequenceNumberEvent>>,
    pub(crate) stale_round_handlers: Vec<HandlerPtr<StaleRoundEvent>>,
    pub(crate) clear_durability_join_handlers: Vec<HandlerPtr<ClearDurabilityJoinEvent>>,
}

impl EventHandlers {
    /// Collect the user-defined handlers, and if `log_events` is set, the default logging handler of
    /// every event type.
    pub(crate) fn new(
        log_events: bool,
        release_round_handler: Option<HandlerPtr<ReleaseRoundEvent>>,
        update_durable_sequence_number_handler: Option<HandlerPtr<UpdateDurableSequenceNumberEvent>>,
        stale_round_handler: Option<HandlerPtr<StaleRoundEvent>>,
        clear_durability_join_handler: Option<HandlerPtr<ClearDurabilityJoinEvent>>,
    ) -> EventHandlers {
        let mut handlers = EventHandlers {
            release_round_handlers: release_round_handler.into_iter().collect(),
            update_durable_sequence_number_handlers: update_durable_sequence_number_handler
                .into_iter()
                .collect(),
            stale_round_handlers: stale_round_handler.into_iter().collect(),
            clear_durability_join_handlers: clear_durability_join_handler.into_iter().collect(),
        };

        if log_events {
            handlers
                .release_round_handlers
                .push(ReleaseRoundEvent::get_logger());
            handlers
                .update_durable_sequence_number_handlers
                .push(UpdateDurableSequenceNumberEvent::get_logger());
            handlers
                .stale_round_handlers
                .push(StaleRoundEvent::get_logger());
            handlers
                .clear_durability_join_handlers
                .push(ClearDurabilityJoinEvent::get_logger());
        }

        handlers
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.release_round_handlers.is_empty()
            && self.update_durable_sequence_number_handlers.is_empty()
            && self.stale_round_handlers.is_empty()
            && self.clear_durability_join_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::ReleaseRound(release_round_event) => self
                .release_round_handlers
                .iter()
                .for_each(|handler| handler(&release_round_event)),

            Event::UpdateDurableSequenceNumber(update_event) => self
                .update_durable_sequence_number_handlers
                .iter()
                .for_each(|handler| handler(&update_event)),

            Event::StaleRound(stale_round_event) => self
                .stale_round_handlers
                .iter()
                .for_each(|handler| handler(&stale_round_event)),

            Event::ClearDurabilityJoin(clear_event) => self
                .clear_durability_join_handlers
                .iter()
                .for_each(|handler| handler(&clear_event)),
        }
    }
}

/// Start a thread that fires `event_handlers` for every event received on `event_subscriber`.
///
/// The thread exits once every publisher of `event_subscriber` has been dropped and every event
/// already published has been handled.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in event_subscriber.iter() {
            event_handlers.fire_handlers(event)
        }
    })
}
