pub mod base;
pub mod engine;
pub mod lighting;
pub mod logging;
pub mod mixer;

pub use base::*;
pub use engine::*;
pub use lighting::*;
pub use logging::*;
pub use mixer::*;
