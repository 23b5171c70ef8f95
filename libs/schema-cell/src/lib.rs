pub mod error;
pub mod models;
pub mod schema;
pub mod services;

pub use error::*;
pub use models::*;
pub use schema::CLINIC_SCHEMA;
pub use services::*;
