pub mod announce;
pub mod breaks;

pub use breaks::{
    clamp_minutes, BreakInfo, BreakRejection, BreakStart, BreakTimerManager, MAX_BREAK_MINUTES,
    MIN_BREAK_MINUTES, UNKNOWN_REQUESTER,
};
