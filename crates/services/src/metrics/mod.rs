mod aggregator;
mod insights;
mod queries;

pub use aggregator::MasteryMetricAggregator;
pub use insights::InsightService;
pub use queries::{
    CONSTANCY_DAYS, ConstancyDay, DailyMinutes, Dashboard, MetricsService, MetricsSummary,
    RECENT_SESSION_LIMIT, SubjectAccuracy, SubjectMetricDetail, SubjectMetricView, UserMetrics,
    WEEK_DAYS,
};
