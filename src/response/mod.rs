pub mod body;
pub mod report;

pub use report::{render, ReportFormat};
