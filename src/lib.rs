pub mod common;
pub mod configs;
pub mod engine;
pub mod gateway;
pub mod lighting;
pub mod protocol;
pub mod tracker;
