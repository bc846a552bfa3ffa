pub mod config;
pub mod dice;
pub mod error;
pub mod llm;
pub mod persona;
pub mod routes;

pub use config::ServerConfig;
pub use error::ChatError;
pub use llm::{backend_from_config, EventStream, InferenceBackend};
pub use routes::{router, AppState};
