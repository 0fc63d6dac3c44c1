/// A reference adapter driving simulated transponders.
pub mod basic;
