pub mod models;
pub mod otp;
pub mod password;
pub mod service;
pub mod validation;

pub use service::FarmerService;
