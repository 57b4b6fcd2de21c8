pub mod backend;
pub mod backend_factory;
pub mod client;
pub mod config;
pub mod error;
pub mod http_client;
pub mod model;
pub mod providers;
pub mod stream;
pub mod telemetry;
pub mod text;

pub use client::InstrumentedClient;
