pub mod agents;
pub mod config;
pub mod dom;
pub mod knowledge;
pub mod llm;
pub mod normalize;
pub mod prompts;
pub mod selector;
pub mod server;
pub mod store;
