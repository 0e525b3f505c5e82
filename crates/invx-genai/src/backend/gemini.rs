//! Gemini REST backend (File API + streaming generateContent).

use std::io::{BufRead, BufReader};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GenAiError;
use crate::{Content, DocumentHandle, DocumentState, GenerativeBackend, Part, Result, Role, TextStream};

/// Public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Sampling and output settings sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: Some("application/json".to_string()),
        }
    }
}

/// Connection settings for [`GeminiBackend`].
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub generation: GenerationConfig,
    pub request_timeout: Duration,
}

impl GeminiSettings {
    /// Settings with default endpoint and generation config.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            generation: GenerationConfig::default(),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Backend talking to the Gemini REST API with a blocking HTTP client.
pub struct GeminiBackend {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiBackend {
    /// Create a backend, validating the settings.
    pub fn new(settings: GeminiSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(GenAiError::Config("API key is empty".to_string()));
        }
        if settings.model.trim().is_empty() {
            return Err(GenAiError::Config("model name is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GenAiError::Http(e.to_string()))?;

        debug!("Gemini backend ready for model {}", settings.model);

        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }
}

impl GenerativeBackend for GeminiBackend {
    fn register_document(
        &self,
        bytes: &[u8],
        mime_type: &str,
        display_name: &str,
    ) -> Result<DocumentHandle> {
        let start = self
            .client
            .post(self.url("upload/v1beta/files"))
            .header("x-goog-api-key", &self.settings.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .map_err(http_error)?;
        let start = check_status(start)?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| GenAiError::Decode("missing upload URL in response".to_string()))?
            .to_string();

        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes.to_vec())
            .send()
            .map_err(http_error)?;

        let uploaded: UploadResponse = check_status(response)?
            .json()
            .map_err(|e| GenAiError::Decode(e.to_string()))?;

        let handle = uploaded.file.into_handle(display_name, mime_type);
        info!("Uploaded file '{}' as: {}", handle.display_name, handle.uri);
        Ok(handle)
    }

    fn document_state(&self, handle: &DocumentHandle) -> Result<DocumentState> {
        let response = self
            .client
            .get(self.url(&format!("v1beta/{}", handle.name)))
            .header("x-goog-api-key", &self.settings.api_key)
            .send()
            .map_err(http_error)?;

        let file: WireFile = check_status(response)?
            .json()
            .map_err(|e| GenAiError::Decode(e.to_string()))?;

        Ok(parse_state(file.state.as_deref()))
    }

    fn stream_generate(&self, contents: &[Content]) -> Result<TextStream> {
        let request = GenerateRequest {
            contents: contents.iter().map(WireContent::from).collect(),
            generation_config: &self.settings.generation,
        };

        debug!(
            "Sending prompt with {} turns to {}",
            contents.len(),
            self.settings.model
        );

        let response = self
            .client
            .post(self.url(&format!(
                "v1beta/models/{}:streamGenerateContent?alt=sse",
                self.settings.model
            )))
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .map_err(http_error)?;
        let response = check_status(response)?;

        let chunks = BufReader::new(response)
            .lines()
            .filter_map(|line| match line {
                Ok(line) => parse_sse_line(&line),
                Err(e) => Some(Err(GenAiError::Io(e))),
            });

        Ok(TextStream::new(chunks))
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

fn http_error(e: reqwest::Error) -> GenAiError {
    GenAiError::Http(e.to_string())
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(GenAiError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn parse_state(state: Option<&str>) -> DocumentState {
    match state {
        Some("ACTIVE") => DocumentState::Active,
        Some("PROCESSING") => DocumentState::Processing,
        Some("FAILED") => DocumentState::Failed,
        _ => DocumentState::Pending,
    }
}

/// Parse one server-sent-events line into a text fragment.
///
/// Returns `None` for lines that carry no data (blank separators, comments).
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }

    Some(
        serde_json::from_str::<StreamChunk>(payload)
            .map(StreamChunk::into_text)
            .map_err(|e| GenAiError::Decode(e.to_string())),
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<WireContent<'a>>,
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct WireContent<'a> {
    role: Role,
    parts: Vec<WirePart<'a>>,
}

impl<'a> From<&'a Content> for WireContent<'a> {
    fn from(content: &'a Content) -> Self {
        Self {
            role: content.role,
            parts: content.parts.iter().map(WirePart::from).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum WirePart<'a> {
    Text(&'a str),
    InlineData(WireBlob<'a>),
    FileData(WireFileRef<'a>),
}

impl<'a> From<&'a Part> for WirePart<'a> {
    fn from(part: &'a Part) -> Self {
        match part {
            Part::Text(text) => WirePart::Text(text),
            Part::InlineData { mime_type, data } => WirePart::InlineData(WireBlob {
                mime_type,
                data: BASE64_STANDARD.encode(data),
            }),
            Part::FileData { mime_type, uri } => WirePart::FileData(WireFileRef {
                mime_type,
                file_uri: uri,
            }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireFileRef<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: WireFile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl WireFile {
    fn into_handle(self, display_name: &str, mime_type: &str) -> DocumentHandle {
        DocumentHandle {
            name: self.name,
            uri: self.uri,
            display_name: self.display_name.unwrap_or_else(|| display_name.to_string()),
            mime_type: self.mime_type.unwrap_or_else(|| mime_type.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl StreamChunk {
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}
