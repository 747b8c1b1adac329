pub mod poll_ctx;
pub mod stage_plan;

pub use poll_ctx::{PollAttempt, PollCtx};
pub use stage_plan::TerminalPredicate;
