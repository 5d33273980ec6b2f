pub mod auth;
pub mod composite;
pub mod constants;
pub mod requests;
pub mod session;

pub use session::{MixerClient, types::ConnectionStatus};
