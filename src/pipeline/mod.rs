pub mod cancel;
pub mod coordinator;
pub mod progress;
pub mod rate;
pub mod row;
pub mod stats;


pub use cancel::CancelToken;
pub use coordinator::{
    BuildResult,
    MediaPipeline,
};
pub use progress::{
    drain,
    progress_channel,
    ProgressEvent,
    ProgressSender,
};
pub use rate::RateSignalTracker;
pub use row::RowProcessor;
pub use stats::{
    BuildStatistics,
    BuildSummary,
};
