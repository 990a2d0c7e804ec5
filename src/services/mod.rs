pub mod coordinator;
pub mod gaps;
pub mod setup;
pub mod statistics;
