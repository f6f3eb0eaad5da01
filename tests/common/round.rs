use keystone_rs::{
    durability::ConsensusRound,
    types::data_types::{RoundNumber, SequenceNumber},
};

/// A decided round that carries nothing but its number and keystone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TestRound {
    pub(crate) round: u64,
    pub(crate) keystone: i64,
}

impl TestRound {
    pub(crate) fn new(round: u64, keystone: i64) -> TestRound {
        TestRound { round, keystone }
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
