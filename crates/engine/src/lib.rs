pub mod deals;
pub mod decider;
pub mod detached;
pub mod ledger;
pub mod rate_gate;
pub mod read_state;
pub mod staleness;
pub mod threshold;
pub mod tracker;
