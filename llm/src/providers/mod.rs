pub(crate) mod claude;

pub use claude::{ClaudeChatModel, ClaudeProvider, DEFAULT_BASE_URL};
