// upscaler/src/processors/mod.rs
pub mod batch;
pub mod compressor;
pub mod filters;
pub mod loader;
pub mod preview;
pub mod resizer;

pub use batch::{BatchSummary, IntakeNotice, IntakeReport, JobEvent, JobQueue};
pub use compressor::{BudgetOutcome, BudgetSearch, Compressor};
pub use filters::ColorAdjust;
pub use loader::Loader;
pub use preview::{PreviewFrame, QualityPreview};
pub use resizer::Resizer;

pub mod prelude {
    pub use super::{BudgetSearch, Compressor, JobQueue, Loader, QualityPreview, Resizer};
}
