pub mod ai;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::OllamaClient;
pub use config::{Config, Settings};
pub use dispatcher::{Dispatcher, Phase};
pub use error::ChatError;
pub use session::{Preambles, Session, Turn, DEFAULT_PREAMBLE};
pub use state::{ChatMessage, ChatRole};
