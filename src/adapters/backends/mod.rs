//! Model and code-runner backend adapters.

pub mod mock;
pub mod openai_api;

pub use mock::{MockCodeRunner, MockModelBackend, ScriptedReply};
pub use openai_api::{OpenAiApiConfig, OpenAiBackend};
