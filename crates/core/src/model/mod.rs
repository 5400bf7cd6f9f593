mod answer;
mod ids;
mod mastery;
mod session;

pub use ids::{AnswerId, ParseIdError, QuestionId, SessionId, SubjectId, UserId};

pub use answer::{Answer, NewAnswer, QuestionKey};
pub use mastery::{
    HISTORY_WEIGHT, MasteryError, MasteryMetric, MasteryRollup, SESSION_WEIGHT, next_streak,
    round_to, smooth_accuracy,
};
pub use session::{
    DEFAULT_TARGET_COUNT, NewTrainingSession, SessionKind, SessionScore, SessionState,
    SessionStateError, TrainingSession, elapsed_seconds, whole_minutes,
};
