//! Schema-constrained product extraction with an LLM.
//!
//! [`LlmExtractor`] splits page Markdown into chunks, sends each chunk with
//! the product JSON schema to an [`ExtractionBackend`], and collects the
//! [`ProductInfo`] items the model returns. A failing chunk is recorded and
//! the remaining chunks still run.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use interior_shared::{AppConfig, GeminiConfig, InteriorError, ProductInfo, Result, gemini_api_key};

/// Rough tokens-per-word ratio used for chunk sizing.
const TOKENS_PER_WORD: f64 = 1.3;

const REQUEST_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// JSON Schema for [`ProductInfo`], embedded in every prompt.
pub fn product_schema() -> Value {
    json!({
        "title": "ProductInfo",
        "type": "object",
        "properties": {
            "brand_name": {
                "type": "string",
                "description": "Brand name"
            },
            "item_name": {
                "type": "string",
                "description": "Product name"
            },
            "size": {
                "type": "string",
                "description": "Size in millimetres",
                "examples": ["W500 D500 H550"]
            },
            "weight": {
                "type": "string",
                "description": "Weight",
                "examples": ["15kg"]
            },
            "material": {
                "type": "string",
                "description": "Materials",
                "examples": ["Fabric, Steel"]
            },
            "price": {
                "type": "string",
                "description": "Price in Japanese yen, stating whether tax is included",
                "examples": ["￥120,000 (tax incl.)"]
            },
            "description": {
                "type": "string",
                "description": "Product description",
                "examples": ["A sofa that combines a comfortable seat with a clean, modern design."]
            },
            "image_urls": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Product image URLs"
            }
        },
        "required": ProductInfo::FIELD_NAMES,
    })
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// One model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: String,
    pub latency_ms: u64,
}

/// Text generation service used for extraction.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Completion>;
}

/// Google Gemini `generateContent` client.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| InteriorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    /// Backend from app config, reading the API key from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = gemini_api_key(config)?;
        Self::new(&config.gemini, api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ExtractionBackend for GeminiBackend {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<Completion> {
        let start = Instant::now();
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| InteriorError::Network(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(InteriorError::Extraction(format!(
                "Gemini API returned {status}: {snippet}"
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InteriorError::Extraction(format!("invalid Gemini response: {e}")))?;

        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| InteriorError::Extraction("Gemini returned no candidates".into()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
            return Err(InteriorError::Extraction(format!(
                "Gemini returned no text (finish reason: {reason})"
            )));
        }

        let (tokens_in, tokens_out) = body
            .usage_metadata
            .map_or((0, 0), |u| (u.prompt_token_count, u.candidates_token_count));
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(tokens_in, tokens_out, latency_ms, "completion received");

        Ok(Completion {
            text,
            tokens_in,
            tokens_out,
            model: body.model_version.unwrap_or_else(|| self.model.clone()),
            latency_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// How page text is split before extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingOptions {
    pub apply_chunking: bool,
    /// Estimated tokens per chunk.
    pub chunk_token_threshold: usize,
    /// Fraction of each chunk repeated at the start of the next, `0.0..1.0`.
    pub overlap_rate: f32,
}

impl From<&GeminiConfig> for ChunkingOptions {
    fn from(config: &GeminiConfig) -> Self {
        Self {
            apply_chunking: config.apply_chunking,
            chunk_token_threshold: config.chunk_token_threshold,
            overlap_rate: config.overlap_rate,
        }
    }
}

/// Estimated token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * TOKENS_PER_WORD).ceil() as usize
}

/// Split `text` into word-aligned chunks. Blank text gives no chunks.
pub fn chunk_text(text: &str, opts: &ChunkingOptions) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if !opts.apply_chunking || estimate_tokens(text) <= opts.chunk_token_threshold {
        return vec![text.to_string()];
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let per_chunk = ((opts.chunk_token_threshold as f64 / TOKENS_PER_WORD).floor() as usize).max(1);
    let overlap = ((per_chunk as f64 * f64::from(opts.overlap_rate.clamp(0.0, 1.0))).floor()
        as usize)
        .min(per_chunk - 1);
    let step = per_chunk - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + per_chunk).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// A chunk whose extraction failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkError {
    pub chunk_index: usize,
    pub message: String,
}

/// Everything extracted from one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionOutcome {
    pub items: Vec<ProductInfo>,
    pub errors: Vec<ChunkError>,
    pub chunks: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ExtractionOutcome {
    /// Extracted items as a pretty-printed JSON array.
    pub fn extracted_content(&self) -> String {
        serde_json::to_string_pretty(&self.items).unwrap_or_else(|_| "[]".into())
    }

    /// True when chunks were sent and every one of them failed.
    pub fn all_failed(&self) -> bool {
        self.chunks > 0 && self.errors.len() == self.chunks
    }
}

/// Runs the extraction prompt over page Markdown.
pub struct LlmExtractor {
    backend: Box<dyn ExtractionBackend>,
    instruction: String,
    chunking: ChunkingOptions,
}

impl LlmExtractor {
    pub fn new(backend: Box<dyn ExtractionBackend>, config: &GeminiConfig) -> Self {
        Self {
            backend,
            instruction: config.instruction.clone(),
            chunking: ChunkingOptions::from(config),
        }
    }

    /// Extractor backed by Gemini, configured from `config`.
    pub fn gemini(config: &AppConfig) -> Result<Self> {
        let backend = GeminiBackend::from_config(config)?;
        Ok(Self::new(Box::new(backend), &config.gemini))
    }

    fn prompt(&self, url: &str, chunk: &str) -> String {
        let schema = serde_json::to_string_pretty(&product_schema()).unwrap_or_default();
        format!(
            "{}\n\n# JSON schema\n{schema}\n\n# Page URL\n{url}\n\n# Page content\n{chunk}\n",
            self.instruction
        )
    }

    /// Extract products from `markdown` fetched from `url`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract(&self, url: &str, markdown: &str) -> ExtractionOutcome {
        let chunks = chunk_text(markdown, &self.chunking);
        let mut outcome = ExtractionOutcome {
            chunks: chunks.len(),
            ..ExtractionOutcome::default()
        };

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let completion = match self.backend.generate(&self.prompt(url, chunk)).await {
                Ok(completion) => completion,
                Err(e) => {
                    warn!(chunk_index, error = %e, "extraction chunk failed");
                    outcome.errors.push(ChunkError {
                        chunk_index,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            outcome.tokens_in += completion.tokens_in;
            outcome.tokens_out += completion.tokens_out;
            outcome.model.get_or_insert(completion.model);

            match parse_products(&completion.text) {
                Ok(items) => outcome.items.extend(items),
                Err(e) => {
                    warn!(chunk_index, error = %e, "unparseable extraction response");
                    outcome.errors.push(ChunkError {
                        chunk_index,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            chunks = outcome.chunks,
            items = outcome.items.len(),
            failed_chunks = outcome.errors.len(),
            tokens_in = outcome.tokens_in,
            tokens_out = outcome.tokens_out,
            "extraction finished"
        );
        outcome
    }
}

/// Parse a model answer into products. Accepts one object or an array of
/// objects, optionally wrapped in a Markdown code fence. Blank items are
/// dropped.
pub fn parse_products(text: &str) -> Result<Vec<ProductInfo>> {
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| InteriorError::Extraction(format!("response is not JSON: {e}")))?;

    let items = match value {
        Value::Array(values) => values
            .into_iter()
            .map(serde_json::from_value::<ProductInfo>)
            .collect::<std::result::Result<Vec<_>, _>>(),
        object @ Value::Object(_) => serde_json::from_value(object).map(|p| vec![p]),
        other => {
            return Err(InteriorError::Extraction(format!(
                "expected a JSON object or array, got {other}"
            )));
        }
    }
    .map_err(|e| InteriorError::Extraction(format!("response does not match schema: {e}")))?;

    Ok(items.into_iter().filter(|p| !p.is_blank()).collect())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
