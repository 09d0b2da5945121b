pub mod class_map;
pub mod classifier;
pub mod mock;
pub mod models;
pub mod service;
pub mod tract_backend;
pub mod upload;

pub use class_map::ClassMapCatalog;
pub use classifier::ClassifierService;
pub use mock::MockGenerator;
pub use service::{AnalyzeRequest, DiagnosisService};
