#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod metrics;
pub mod requests;
pub mod sessions;

pub use study_core::Clock;

pub use app_services::TrainingServices;
pub use error::{AppServicesError, ErrorKind, TrainingError};
pub use metrics::{InsightService, MasteryMetricAggregator, MetricsService};
pub use requests::{RecordAnswer, RecordAnswerRequest, StartSession, StartSessionRequest};
pub use sessions::{AnswerFeedback, AnswerRecorder, FinalizeSummary, SessionManager, SessionView};
