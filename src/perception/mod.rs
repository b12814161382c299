pub mod context;
pub mod stability;
pub mod traits;
pub mod types;
