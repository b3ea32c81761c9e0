//! limestream-test-harness: Test utilities and mock device ports for
//! limestream.
//!
//! This crate provides [`LoopbackPort`] for driving the streaming engine end
//! to end without a board, [`MockControlPort`] for testing control-path
//! exchanges, and [`ManualClock`] for deterministic TX scheduling.

pub mod clock;
pub mod loopback;
pub mod mock_control;

pub use clock::ManualClock;
pub use loopback::LoopbackPort;
pub use mock_control::MockControlPort;
