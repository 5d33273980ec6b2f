pub mod banner;
pub mod errors;
pub mod logger;
pub mod multimap;
pub mod task;
pub mod time;
pub mod types;

pub use errors::*;
pub use logger::*;
pub use multimap::MultiMap;
pub use task::{BackgroundTask, PeriodicTask};
pub use types::*;
