use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use tracing::{info, warn};

use crate::knowledge::{KnowledgeBase, TextSplitter, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::llm::{
    GeminiBackend, Generator, OllamaBackend, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL,
    DEFAULT_OLLAMA_ENDPOINT, DEFAULT_OLLAMA_MODEL,
};
use crate::prompts::PromptSet;
use crate::store::{uploads_dir, ContentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Gemini,
    Ollama,
}

/// Settings for the API server. Every flag can also come from the environment.
#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    /// Host to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1", env = "SENTINEL_HOST")]
    pub host: String,

    /// Port to serve the API on
    #[arg(long, default_value_t = 8000, env = "SENTINEL_PORT")]
    pub port: u16,

    /// Directory uploaded files are written to (default: ~/.sentinel-qa/uploads)
    #[arg(long, env = "SENTINEL_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Text generation backend
    #[arg(long, value_enum, default_value_t = Provider::Gemini, env = "SENTINEL_PROVIDER")]
    pub provider: Provider,

    /// Model name (default depends on the provider)
    #[arg(long, env = "SENTINEL_MODEL")]
    pub model: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini API base URL
    #[arg(long, default_value = DEFAULT_GEMINI_BASE_URL, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: String,

    /// Ollama generate endpoint
    #[arg(long, default_value = DEFAULT_OLLAMA_ENDPOINT, env = "OLLAMA_ENDPOINT")]
    pub ollama_endpoint: String,

    /// Maximum characters per knowledge base chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "SENTINEL_CHUNK_SIZE")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP, env = "SENTINEL_CHUNK_OVERLAP")]
    pub chunk_overlap: usize,

    /// YAML file overriding the built-in prompts
    #[arg(long, env = "SENTINEL_PROMPTS")]
    pub prompts: Option<PathBuf>,
}

impl ServeConfig {
    pub fn content_store(&self) -> ContentStore {
        ContentStore::with_base(self.upload_dir.clone().unwrap_or_else(uploads_dir))
    }

    pub fn generator(&self) -> Arc<dyn Generator> {
        match self.provider {
            Provider::Gemini => {
                let model = self.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
                let key = self.api_key.as_deref().unwrap_or("");
                if key.is_empty() {
                    warn!("no Gemini API key configured; generation requests will fail");
                }
                info!(provider = "gemini", model = %model, "generator configured");
                Arc::new(GeminiBackend::new(key, model).with_base_url(&self.gemini_base_url))
            }
            Provider::Ollama => {
                let model = self.model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL);
                info!(provider = "ollama", model = %model, endpoint = %self.ollama_endpoint, "generator configured");
                Arc::new(OllamaBackend::new(&self.ollama_endpoint, model))
            }
        }
    }

    pub fn knowledge_base(&self) -> KnowledgeBase {
        KnowledgeBase::with_splitter(TextSplitter::new(self.chunk_size, self.chunk_overlap))
    }

    pub fn prompt_set(&self) -> anyhow::Result<PromptSet> {
        match &self.prompts {
            Some(path) => PromptSet::from_yaml_file(path),
            None => Ok(PromptSet::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeConfig,
    }

    fn parse(args: &[&str]) -> ServeConfig {
        let mut argv = vec!["sentinel-qa"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().serve
    }

    #[test]
    fn ollama_provider_selected_by_flag() {
        let config = parse(&["--provider", "ollama", "--model", "mistral"]);
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.generator().name(), "ollama");
    }

    #[test]
    fn explicit_upload_dir_is_used() {
        let config = parse(&["--upload-dir", "/tmp/sentinel-uploads"]);
        assert_eq!(
            config.content_store().base(),
            std::path::Path::new("/tmp/sentinel-uploads")
        );
    }

    #[test]
    fn chunking_flags_reach_the_knowledge_base() {
        let config = parse(&["--chunk-size", "10", "--chunk-overlap", "0"]);
        let mut kb = config.knowledge_base();
        assert!(kb.ingest("a.txt", "alpha beta gamma delta epsilon") > 1);

        let defaults = parse(&[]);
        assert_eq!(defaults.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(defaults.gemini_base_url, DEFAULT_GEMINI_BASE_URL);
    }

    #[test]
    fn prompts_default_without_file() {
        let config = parse(&["--provider", "ollama"]);
        assert!(config.prompt_set().is_ok());
    }
}
