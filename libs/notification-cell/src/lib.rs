pub mod models;
pub mod sink;

pub use models::*;
pub use sink::*;
