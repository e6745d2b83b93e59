// AI-completion adapters

pub mod anthropic;

pub use anthropic::AnthropicClient;
