pub mod config;
pub mod db;
pub mod decode;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod loader;
pub mod pipeline;
pub mod store;
pub mod verify;
