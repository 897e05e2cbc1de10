pub mod handlers;
pub mod license;
pub mod models;
pub mod router;
pub mod services;

pub use license::LicenseId;
pub use models::*;
pub use services::*;
