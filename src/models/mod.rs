pub mod config;
pub mod errors;
pub mod record;
pub mod report;

pub use config::*;
pub use errors::*;
pub use record::*;
pub use report::*;
