pub mod config;
pub mod error;
pub mod metric;
pub mod time;
pub mod window;

pub use error::{PerflogError, Result};
