pub mod exception_writer;
pub mod metrics;
pub mod status_poller;

pub use exception_writer::ExceptionWriter;
pub use metrics::{
    DisplayStatus, DocumentFilter, DocumentView, ExceptionAlert, MatchStatus, MetricsAggregator,
    MetricsSummary, Severity,
};
pub use status_poller::{PollOutcome, StatusPoller};
