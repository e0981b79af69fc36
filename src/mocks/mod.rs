//! Test doubles for the scheduler's injected collaborators.

mod clock;
mod sender;

pub use clock::Clock;
pub use sender::{Journal, Sender};
