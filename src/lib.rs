pub mod checker;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod model;
pub mod probe;
pub mod report;
pub mod report_queue;

pub use checker::Checker;
pub use error::{CheckerError, CheckerResult};
pub use lifecycle::Lifecycle;
pub use report::{PdfRenderer, ReportBuilder, ReportRenderer};
pub use report_queue::{ReportQueue, ReportWorker};
