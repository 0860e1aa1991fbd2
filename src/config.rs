use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default maximum chunk length (characters) for PDF documents.
pub const DEFAULT_PDF_MAX_SIZE: usize = 500;
/// Default maximum chunk length (characters) for PPTX documents.
pub const DEFAULT_PPTX_MAX_SIZE: usize = 300;
/// Timeout applied to every vision request.
pub const DEFAULT_VISION_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Size thresholds and feature switches for one chunking engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkingOptions {
    /// Maximum characters per chunk before fallback splitting kicks in.
    pub max_size: usize,
    /// Reserved overlap budget; the fallback splitter does not apply it.
    pub overlap_size: usize,
    /// Minimum characters a fallback-processed chunk must carry.
    pub min_chunk_size: usize,
    /// Minimum whitespace-separated words a fallback-processed chunk must carry.
    pub min_word_count: usize,
    /// Emit a Large summary chunk per page/slide and link Small chunks to it.
    pub enable_small_to_large: bool,
    /// Use font/position layout analysis for PDF pages (ignored for PPTX).
    pub enable_layout_analysis: bool,
}

impl ChunkingOptions {
    /// Defaults tuned for PDF pages.
    pub fn pdf_defaults() -> Self {
        Self {
            max_size: DEFAULT_PDF_MAX_SIZE,
            ..Self::shared_defaults()
        }
    }

    /// Defaults tuned for PPTX slides.
    pub fn pptx_defaults() -> Self {
        Self {
            max_size: DEFAULT_PPTX_MAX_SIZE,
            ..Self::shared_defaults()
        }
    }

    fn shared_defaults() -> Self {
        Self {
            max_size: DEFAULT_PDF_MAX_SIZE,
            overlap_size: 50,
            min_chunk_size: 50,
            min_word_count: 5,
            enable_small_to_large: true,
            enable_layout_analysis: true,
        }
    }
}

/// Wire protocol used to reach the vision-capable LLM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionApiStyle {
    /// Ollama native `/api/generate` with an `images` array.
    Ollama,
    /// OpenAI-compatible `/v1/chat/completions` with `image_url` parts.
    OpenAI,
    /// Generic HTTP endpoint; the concrete style is inferred from the base URL.
    Request,
}

impl std::str::FromStr for VisionApiStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "request" => Ok(Self::Request),
            _ => Err(()),
        }
    }
}

/// Settings for the optional vision-augmented slide summaries.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Whether vision augmentation is available at all.
    pub enabled: bool,
    /// Explicit API style; `None` falls back to URL inspection.
    pub api_style: Option<VisionApiStyle>,
    /// Base URL of the LLM endpoint.
    pub base_url: String,
    /// Vision-capable model identifier.
    pub model: String,
    /// Optional bearer token for OpenAI-compatible endpoints.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_style: None,
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llava".to_string(),
            api_key: None,
            timeout: DEFAULT_VISION_TIMEOUT,
        }
    }
}

impl VisionConfig {
    /// Resolve the concrete API style once, defaulting to Ollama when the URL is ambiguous.
    pub fn resolved_style(&self) -> VisionApiStyle {
        match self.api_style {
            Some(VisionApiStyle::Ollama) => VisionApiStyle::Ollama,
            Some(VisionApiStyle::OpenAI) => VisionApiStyle::OpenAI,
            Some(VisionApiStyle::Request) | None => infer_style_from_url(&self.base_url),
        }
    }
}

fn infer_style_from_url(base_url: &str) -> VisionApiStyle {
    let normalized = base_url.to_lowercase();
    if normalized.contains("/v1") || normalized.contains("openai") {
        VisionApiStyle::OpenAI
    } else {
        VisionApiStyle::Ollama
    }
}

/// Runtime configuration for the Rusty RAG binary.
#[derive(Debug)]
pub struct Config {
    /// Options applied to PDF documents.
    pub pdf: ChunkingOptions,
    /// Options applied to PPTX documents.
    pub pptx: ChunkingOptions,
    /// Vision augmentation settings.
    pub vision: VisionConfig,
    /// Base URL of the Qdrant instance that stores chunk vectors.
    pub qdrant_url: Option<String>,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_size_override = parse_optional::<usize>("CHUNK_MAX_SIZE")?;
        let overlap_size = parse_optional::<usize>("CHUNK_OVERLAP_SIZE")?;
        let min_chunk_size = parse_optional::<usize>("CHUNK_MIN_SIZE")?;
        let min_word_count = parse_optional::<usize>("CHUNK_MIN_WORDS")?;
        let small_to_large = parse_flag("ENABLE_SMALL_TO_LARGE")?;
        let layout_analysis = parse_flag("ENABLE_LAYOUT_ANALYSIS")?;

        let apply = |mut options: ChunkingOptions| {
            if let Some(value) = max_size_override {
                options.max_size = value.max(1);
            }
            if let Some(value) = overlap_size {
                options.overlap_size = value;
            }
            if let Some(value) = min_chunk_size {
                options.min_chunk_size = value;
            }
            if let Some(value) = min_word_count {
                options.min_word_count = value;
            }
            if let Some(value) = small_to_large {
                options.enable_small_to_large = value;
            }
            if let Some(value) = layout_analysis {
                options.enable_layout_analysis = value;
            }
            options
        };

        let defaults = VisionConfig::default();
        let vision = VisionConfig {
            enabled: parse_flag("ENABLE_VISION")?.unwrap_or(false),
            api_style: load_env_optional("LLM_API_TYPE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("LLM_API_TYPE".to_string()))
                })
                .transpose()?,
            base_url: load_env_optional("LLM_BASE_URL").unwrap_or(defaults.base_url),
            model: load_env_optional("LLM_MODEL").unwrap_or(defaults.model),
            api_key: load_env_optional("LLM_API_KEY"),
            timeout: defaults.timeout,
        };

        Ok(Self {
            pdf: apply(ChunkingOptions::pdf_defaults()),
            pptx: apply(ChunkingOptions::pptx_defaults()),
            vision,
            qdrant_url: load_env_optional("QDRANT_URL"),
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| "rusty-rag".to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?.unwrap_or(768),
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    load_env_optional(key)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from `.env` and the environment and install it in the global cache.
///
/// A second call keeps the configuration installed by the first.
pub fn init_config() -> Result<(), ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        pdf_max_size = config.pdf.max_size,
        pptx_max_size = config.pptx.max_size,
        vision_enabled = config.vision.enabled,
        vision_style = ?config.vision.resolved_style(),
        qdrant_url = ?config.qdrant_url,
        collection = %config.qdrant_collection_name,
        "Loaded configuration"
    );
    let _ = CONFIG.set(config);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_differ_only_in_max_size() {
        let pdf = ChunkingOptions::pdf_defaults();
        let pptx = ChunkingOptions::pptx_defaults();
        assert_eq!(pdf.max_size, 500);
        assert_eq!(pptx.max_size, 300);
        assert_eq!(pdf.min_chunk_size, pptx.min_chunk_size);
        assert_eq!(pdf.min_word_count, 5);
        assert!(pdf.enable_small_to_large);
    }

    #[test]
    fn api_style_parses_known_values() {
        assert_eq!("Ollama".parse::<VisionApiStyle>(), Ok(VisionApiStyle::Ollama));
        assert_eq!("openai".parse::<VisionApiStyle>(), Ok(VisionApiStyle::OpenAI));
        assert_eq!("request".parse::<VisionApiStyle>(), Ok(VisionApiStyle::Request));
        assert!("grpc".parse::<VisionApiStyle>().is_err());
    }

    #[test]
    fn unresolved_style_defaults_to_ollama() {
        let config = VisionConfig {
            base_url: "http://gpu-box:8080".into(),
            ..VisionConfig::default()
        };
        assert_eq!(config.resolved_style(), VisionApiStyle::Ollama);
    }

    #[test]
    fn request_style_sniffs_openai_urls() {
        let config = VisionConfig {
            api_style: Some(VisionApiStyle::Request),
            base_url: "http://localhost:1234/v1".into(),
            ..VisionConfig::default()
        };
        assert_eq!(config.resolved_style(), VisionApiStyle::OpenAI);

        let explicit = VisionConfig {
            api_style: Some(VisionApiStyle::Ollama),
            base_url: "http://localhost:1234/v1".into(),
            ..VisionConfig::default()
        };
        assert_eq!(explicit.resolved_style(), VisionApiStyle::Ollama);
    }
}
