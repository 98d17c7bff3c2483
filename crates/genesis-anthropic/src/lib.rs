pub mod provider;
mod wire;

pub use provider::AnthropicProvider;
