mod manager;
mod recorder;
mod view;

// Public API of the session subsystem.
pub use manager::SessionManager;
pub use recorder::AnswerRecorder;
pub use view::{AnswerFeedback, FinalizeSummary, SessionView};
