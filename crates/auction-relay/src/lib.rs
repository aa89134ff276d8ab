pub mod api;
pub mod arguments;
pub mod chat;
pub mod connection;
pub mod handlers;
pub mod hub;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod run;
pub mod session;
pub mod validation;
pub mod vault_signers;

pub use run::{run, start};
