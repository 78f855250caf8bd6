pub mod arbiter;
pub mod gate;

pub use arbiter::{ArbiterSettings, SendArbiter, SendOutcome};
pub use gate::SendGate;
