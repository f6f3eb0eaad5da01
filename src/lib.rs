/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Crash-safe round release and stake-weighted state proofs for BFT ledger nodes.
//!
//! keystone-rs provides two mechanisms that let a consensus node treat "this round has been
//! handled" and "this data is attested by the network" as trustworthy facts:
//! 1. The [durability join](durability), which holds rounds decided by consensus until the event that
//!    anchors each round (its *keystone event*) has been made durable by the persistent event log.
//!    Rounds are then released in order, with no gaps and no duplicates.
//! 2. [State proofs](state_proof), which bind pieces of ledger data to a stake-weighted
//!    [quorum](quorum) of signatures over the root of a hash tree, and can be checked by a remote
//!    verifier against a [roster](types::roster::Roster).
//!
//! Both are built on small, reusable pieces: a fixed-capacity [sequence buffer](sequence_buffer)
//! and the shared [types].
//!
//! ## Observing a durability join
//!
//! A [`DurabilityJoin`](durability::DurabilityJoin) publishes [events] as it releases rounds. When
//! run as a [durability stage](durability::stage), handlers registered on its
//! [`DurabilityStageSpec`](durability::DurabilityStageSpec) are called for
//! these events on a separate thread, and if enabled, the events are [logged](logging).

pub mod durability;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

pub mod quorum;

pub mod sequence_buffer;

pub mod state_proof;

pub mod types;
