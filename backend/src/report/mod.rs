pub mod pdf;
pub mod renderer;

pub use renderer::{render_analysis, report_filename};
