//! `OpenAI` adapter covering vision, image, speech and audio endpoints.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use hyper::body::to_bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue, RETRY_AFTER};
use hyper::{Body, Request, StatusCode, Uri};
use modal_config::ProviderSettings;
use modal_primitives::MediaFormat;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::timeout;
use tracing::debug;

use crate::http_client::{HyperClient, build_https_client};
use crate::multipart::MultipartForm;
use crate::remote::{TransferError, download};
use crate::traits::{
    AdapterMetadata, AudioAnalysisRequest, AudioTransformRequest, Capability,
    ImageAnalysisRequest, ImageEditRequest, ImageGenerationRequest, MediaPayload,
    ProviderAdapter, ProviderError, ProviderOutput, ProviderRequest, ProviderResult,
    ResponseShape, SpeechRequest, TranscriptionRequest,
};

/// Ceiling applied when an image endpoint answers with a URL instead of
/// inline bytes.
const DEFAULT_DOWNLOAD_LIMIT: u64 = 25 * 1024 * 1024;

/// Configuration for the `OpenAI` adapter.
#[derive(Clone)]
pub struct OpenAiConfig {
    api_key: Option<String>,
    base_url: String,
    organization: Option<String>,
    project: Option<String>,
    timeout: Duration,
    download_limit: u64,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        let settings = ProviderSettings::default();
        Self {
            api_key: None,
            base_url: settings.base_url,
            organization: None,
            project: None,
            timeout: settings.timeout,
            download_limit: DEFAULT_DOWNLOAD_LIMIT,
        }
    }
}

impl OpenAiConfig {
    /// Creates a configuration with the built-in endpoint and timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from host provider settings.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if the base URL is invalid.
    pub fn from_settings(settings: &ProviderSettings) -> ProviderResult<Self> {
        let mut config = Self::new().with_base_url(&settings.base_url)?;
        config.api_key.clone_from(&settings.api_key);
        config.organization.clone_from(&settings.organization);
        config.project.clone_from(&settings.project);
        config.timeout = settings.timeout;
        Ok(config)
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> ProviderResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the organization header.
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Sets the project header.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the ceiling for image downloads triggered by URL responses.
    #[must_use]
    pub fn with_download_limit(mut self, limit: u64) -> Self {
        self.download_limit = limit;
        self
    }
}

/// `OpenAI` adapter that calls the official API over HTTPS.
pub struct OpenAiAdapter {
    client: HyperClient,
    base_url: String,
    metadata: AdapterMetadata,
    api_key: String,
    organization: Option<String>,
    project: Option<String>,
    timeout: Duration,
    download_limit: u64,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

enum Payload {
    Json(Value),
    Multipart(MultipartForm),
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if the API key is missing.
    pub fn new(config: OpenAiConfig) -> ProviderResult<Self> {
        let api_key = config
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::configuration("OpenAI adapter requires an API key"))?;

        Ok(Self {
            client: build_https_client(),
            base_url: config.base_url,
            metadata: AdapterMetadata::new("openai"),
            api_key,
            organization: config.organization,
            project: config.project,
            timeout: config.timeout,
            download_limit: config.download_limit,
        })
    }

    fn endpoint(&self, path: &str) -> ProviderResult<Uri> {
        format!("{}v1/{path}", self.base_url)
            .parse::<Uri>()
            .map_err(|err| ProviderError::configuration(format!("invalid OpenAI endpoint: {err}")))
    }

    async fn post(&self, path: &str, payload: Payload, capability: Capability) -> ProviderResult<Bytes> {
        let endpoint = self.endpoint(path)?;
        let (content_type, body) = match payload {
            Payload::Json(value) => {
                let body = serde_json::to_vec(&value).map_err(|err| {
                    ProviderError::invalid_request(format!("failed to encode OpenAI request: {err}"))
                })?;
                ("application/json".to_owned(), Bytes::from(body))
            }
            Payload::Multipart(form) => {
                let content_type = form.content_type();
                (content_type, form.finish())
            }
        };

        let mut builder = Request::post(endpoint)
            .header(CONTENT_TYPE, content_type)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key));
        if let Some(organization) = &self.organization {
            builder = builder.header("OpenAI-Organization", organization.as_str());
        }
        if let Some(project) = &self.project {
            builder = builder.header("OpenAI-Project", project.as_str());
        }

        let request = builder.body(Body::from(body)).map_err(|err| {
            ProviderError::transport(format!("failed to build OpenAI request: {err}"))
        })?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ProviderError::Timeout {
                after: self.timeout,
            })?
            .map_err(|err| ProviderError::transport(format!("OpenAI request failed: {err}")))?;

        let status = response.status();
        let retry_after = response.headers().get(RETRY_AFTER).and_then(parse_retry_after);
        let bytes = timeout(self.timeout, to_bytes(response.into_body()))
            .await
            .map_err(|_| ProviderError::Timeout {
                after: self.timeout,
            })?
            .map_err(|err| {
                ProviderError::transport(format!("failed to read OpenAI response: {err}"))
            })?;

        if status.is_success() {
            Ok(bytes)
        } else {
            Err(classify_failure(status, retry_after, &bytes, capability))
        }
    }

    async fn analyze_image(&self, request: ImageAnalysisRequest) -> ProviderResult<ProviderOutput> {
        let body = build_responses_body(&request);
        let bytes = self.post("responses", Payload::Json(body), Capability::General).await?;
        let response: ResponsesResponse = decode(&bytes)?;
        shape_text(response.text(), &request.shape)
    }

    async fn generate_image(&self, request: ImageGenerationRequest) -> ProviderResult<ProviderOutput> {
        let body = build_generation_body(&request);
        let bytes = self
            .post("images/generations", Payload::Json(body), Capability::General)
            .await?;
        self.image_bytes(decode(&bytes)?).await
    }

    async fn edit_image(&self, request: ImageEditRequest) -> ProviderResult<ProviderOutput> {
        let capability = if request.mask.is_some() {
            Capability::MaskedEdit
        } else {
            Capability::General
        };
        let form = build_edit_form(&request);
        let bytes = self
            .post("images/edits", Payload::Multipart(form), capability)
            .await?;
        self.image_bytes(decode(&bytes)?).await
    }

    async fn transcribe(&self, request: TranscriptionRequest) -> ProviderResult<ProviderOutput> {
        let form = build_transcription_form(&request);
        let bytes = self
            .post("audio/transcriptions", Payload::Multipart(form), Capability::General)
            .await?;
        let response: TranscriptionResponse = decode(&bytes)?;
        let mut out = json!({ "text": response.text });
        if let Some(segments) = response.segments.filter(|_| request.timestamps) {
            out["segments"] = segments;
        }
        Ok(ProviderOutput::Json(out))
    }

    async fn analyze_audio(&self, request: AudioAnalysisRequest) -> ProviderResult<ProviderOutput> {
        let body = build_audio_analysis_body(&request);
        let bytes = self
            .post("chat/completions", Payload::Json(body), Capability::General)
            .await?;
        let response: ChatResponse = decode(&bytes)?;
        let text = response
            .into_message()
            .and_then(|message| message.content)
            .ok_or_else(|| ProviderError::response("OpenAI returned no message content"))?;
        shape_text(text, &request.shape)
    }

    async fn speech(&self, request: SpeechRequest) -> ProviderResult<ProviderOutput> {
        let body = build_speech_body(&request);
        let bytes = self
            .post("audio/speech", Payload::Json(body), Capability::General)
            .await?;
        if bytes.is_empty() {
            return Err(ProviderError::response("OpenAI returned an empty audio body"));
        }
        Ok(ProviderOutput::Bytes(bytes))
    }

    async fn transform_audio(&self, request: AudioTransformRequest) -> ProviderResult<ProviderOutput> {
        let body = build_audio_transform_body(&request);
        let bytes = self
            .post("chat/completions", Payload::Json(body), Capability::SpeechToSpeech)
            .await?;
        let response: ChatResponse = decode(&bytes)?;
        let audio = response
            .into_message()
            .and_then(|message| message.audio)
            .ok_or_else(|| {
                ProviderError::unsupported(
                    Capability::SpeechToSpeech,
                    format!("model `{}` returned no audio", request.model),
                )
            })?;
        let decoded = BASE64
            .decode(audio.data.as_bytes())
            .map_err(|err| ProviderError::response(format!("invalid base64 audio: {err}")))?;
        Ok(ProviderOutput::Bytes(Bytes::from(decoded)))
    }

    async fn image_bytes(&self, response: ImagesResponse) -> ProviderResult<ProviderOutput> {
        let item = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::response("No image data in response"))?;

        if let Some(encoded) = item.b64_json {
            let decoded = BASE64
                .decode(encoded.as_bytes())
                .map_err(|err| ProviderError::response(format!("invalid base64 image: {err}")))?;
            return Ok(ProviderOutput::Bytes(Bytes::from(decoded)));
        }

        if let Some(url) = item.url {
            debug!("downloading generated image from provider URL");
            let bytes = download(&self.client, self.timeout, &url, self.download_limit)
                .await
                .map_err(|err| match err {
                    TransferError::Timeout { after } => ProviderError::Timeout { after },
                    other => ProviderError::response(format!("failed to download image: {other}")),
                })?;
            return Ok(ProviderOutput::Bytes(bytes));
        }

        Err(ProviderError::response("No image data in response"))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn execute(&self, request: ProviderRequest) -> ProviderResult<ProviderOutput> {
        debug!(
            operation = request.operation(),
            model = request.model(),
            "calling OpenAI"
        );
        match request {
            ProviderRequest::AnalyzeImage(request) => self.analyze_image(request).await,
            ProviderRequest::GenerateImage(request) => self.generate_image(request).await,
            ProviderRequest::EditImage(request) => self.edit_image(request).await,
            ProviderRequest::Transcribe(request) => self.transcribe(request).await,
            ProviderRequest::AnalyzeAudio(request) => self.analyze_audio(request).await,
            ProviderRequest::Speech(request) => self.speech(request).await,
            ProviderRequest::TransformAudio(request) => self.transform_audio(request).await,
        }
    }
}

fn build_responses_body(request: &ImageAnalysisRequest) -> Value {
    let mut image = json!({
        "type": "input_image",
        "image_url": data_url(&request.image),
    });
    if let Some(detail) = &request.detail {
        image["detail"] = json!(detail);
    }

    let mut body = json!({
        "model": request.model,
        "input": [{
            "role": "user",
            "content": [
                { "type": "input_text", "text": request.instruction },
                image,
            ],
        }],
    });
    if let Some(tokens) = request.max_output_tokens {
        body["max_output_tokens"] = json!(tokens);
    }
    if let ResponseShape::Json {
        name,
        schema,
        strict,
    } = &request.shape
    {
        body["text"] = json!({
            "format": {
                "type": "json_schema",
                "name": name,
                "schema": schema,
                "strict": strict,
            }
        });
    }
    body
}

fn build_generation_body(request: &ImageGenerationRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "prompt": request.prompt,
        "n": 1,
    });
    insert_opt(&mut body, "size", request.size.as_deref());
    insert_opt(&mut body, "background", request.background.as_deref());
    insert_opt(&mut body, "quality", request.quality.as_deref());
    if supports_output_format(&request.model) {
        body["output_format"] = json!(request.format.as_str());
    }
    body
}

fn build_edit_form(request: &ImageEditRequest) -> MultipartForm {
    let mut form = MultipartForm::new()
        .text("model", &request.model)
        .text("prompt", &request.prompt)
        .text("n", "1")
        .text_opt("size", request.size.as_deref())
        .file(
            "image",
            &request.image.file_name("image"),
            request.image.format.mime_type(),
            &request.image.bytes,
        );
    if let Some(mask) = &request.mask {
        form = form.file("mask", &mask.file_name("mask"), mask.format.mime_type(), &mask.bytes);
    }
    if supports_output_format(&request.model) {
        form = form.text("output_format", request.format.as_str());
    }
    form
}

fn build_transcription_form(request: &TranscriptionRequest) -> MultipartForm {
    let mut form = MultipartForm::new()
        .text("model", &request.model)
        .text_opt("language", request.language.as_deref())
        .text_opt("prompt", request.prompt.as_deref());
    form = if request.timestamps {
        form.text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
    } else {
        form.text("response_format", "json")
    };
    form.file(
        "file",
        &request.audio.file_name("audio"),
        request.audio.format.mime_type(),
        &request.audio.bytes,
    )
}

fn build_audio_analysis_body(request: &AudioAnalysisRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "modalities": ["text"],
        "messages": [audio_message(&request.instruction, &request.audio)],
    });
    if let ResponseShape::Json {
        name,
        schema,
        strict,
    } = &request.shape
    {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": { "name": name, "schema": schema, "strict": strict },
        });
    }
    body
}

fn build_speech_body(request: &SpeechRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "input": request.text,
        "voice": request.voice,
        "response_format": request.format.as_str(),
    });
    if let Some(speed) = request.speed {
        body["speed"] = json!(speed);
    }
    insert_opt(&mut body, "instructions", request.instructions.as_deref());
    body
}

fn build_audio_transform_body(request: &AudioTransformRequest) -> Value {
    json!({
        "model": request.model,
        "modalities": ["text", "audio"],
        "audio": { "voice": request.voice, "format": audio_output_format(request.format) },
        "messages": [audio_message(&request.instruction, &request.audio)],
    })
}

fn audio_message(instruction: &str, audio: &MediaPayload) -> Value {
    json!({
        "role": "user",
        "content": [
            { "type": "text", "text": instruction },
            {
                "type": "input_audio",
                "input_audio": {
                    "data": BASE64.encode(&audio.bytes),
                    "format": audio.format.as_str(),
                },
            },
        ],
    })
}

fn audio_output_format(format: MediaFormat) -> &'static str {
    match format {
        MediaFormat::Pcm => "pcm16",
        other => other.as_str(),
    }
}

fn supports_output_format(model: &str) -> bool {
    model.starts_with("gpt-image")
}

fn data_url(payload: &MediaPayload) -> String {
    format!(
        "data:{};base64,{}",
        payload.format.mime_type(),
        BASE64.encode(&payload.bytes)
    )
}

fn insert_opt(body: &mut Value, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        body[key] = json!(value);
    }
}

fn shape_text(text: String, shape: &ResponseShape) -> ProviderResult<ProviderOutput> {
    match shape {
        ResponseShape::Text => Ok(ProviderOutput::Text(text)),
        ResponseShape::Json { .. } => serde_json::from_str::<Value>(&text)
            .map(ProviderOutput::Json)
            .map_err(|_| ProviderError::response("Model output was not valid JSON")),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> ProviderResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|err| ProviderError::response(format!("failed to decode OpenAI response: {err}")))
}

fn parse_retry_after(value: &HeaderValue) -> Option<Duration> {
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn classify_failure(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &[u8],
    capability: Capability,
) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited { retry_after };
    }

    let envelope = serde_json::from_slice::<ErrorEnvelope>(body).ok();
    let detail = envelope.as_ref().map(|envelope| &envelope.error);
    let message = detail
        .and_then(|detail| detail.message.clone())
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_owned());

    if status.is_client_error() && detail.is_some_and(ErrorDetail::is_unsupported) {
        return ProviderError::unsupported(capability, message);
    }
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        return ProviderError::invalid_request(format!("OpenAI returned {status}: {message}"));
    }
    ProviderError::response(format!("OpenAI returned {status}: {message}"))
}

fn sanitize_base_url(input: &str) -> ProviderResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ProviderError::configuration(
            "OpenAI base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    if base.ends_with("/v1/") {
        base.truncate(base.len() - "v1/".len());
    }
    base.parse::<Uri>()
        .map_err(|err| ProviderError::configuration(format!("invalid OpenAI base URL: {err}")))?;
    Ok(base)
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<ResponsesItem>,
}

impl ResponsesResponse {
    fn text(self) -> String {
        if let Some(text) = self.output_text {
            return text;
        }
        self.output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesItem {
    #[serde(default)]
    content: Vec<ResponsesContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn into_message(self) -> Option<ChatMessage> {
        self.choices.into_iter().find_map(|choice| choice.message)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    audio: Option<ChatAudio>,
}

#[derive(Debug, Deserialize)]
struct ChatAudio {
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ErrorDetail {
    fn is_unsupported(&self) -> bool {
        let code_unsupported = self.code.as_deref().is_some_and(|code| {
            matches!(
                code,
                "unsupported_value"
                    | "unsupported_parameter"
                    | "unsupported_file"
                    | "unsupported_format"
                    | "model_not_supported"
            )
        });
        let message_unsupported = self.message.as_deref().is_some_and(|message| {
            let lowered = message.to_ascii_lowercase();
            lowered.contains("not supported")
                || lowered.contains("does not support")
                || lowered.contains("unsupported")
        });
        code_unsupported || message_unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> MediaPayload {
        MediaPayload::new(vec![0x89, b'P', b'N', b'G'], MediaFormat::Png)
    }

    #[test]
    fn base_url_requires_scheme() {
        let err = OpenAiConfig::new()
            .with_base_url("api.openai.com")
            .expect_err("missing scheme should error");
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }

    #[test]
    fn base_url_is_normalized() {
        let cfg = OpenAiConfig::new()
            .with_base_url("https://example.com/openai/v1")
            .expect("valid URL");
        assert_eq!(cfg.base_url, "https://example.com/openai/");
    }

    #[test]
    fn adapter_requires_api_key() {
        let err = OpenAiAdapter::new(OpenAiConfig::new()).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
        assert!(OpenAiAdapter::new(OpenAiConfig::new().with_api_key("sk-test")).is_ok());
    }

    #[test]
    fn responses_body_carries_schema_format() {
        let request = ImageAnalysisRequest {
            model: "gpt-4o-mini".into(),
            instruction: "Respond in French. Describe".into(),
            image: png(),
            shape: ResponseShape::Json {
                name: "image_analysis",
                schema: json!({ "type": "object" }),
                strict: true,
            },
            max_output_tokens: Some(200),
            detail: Some("low".into()),
        };
        let body = build_responses_body(&request);
        assert_eq!(body["text"]["format"]["name"], "image_analysis");
        assert_eq!(body["text"]["format"]["strict"], true);
        assert_eq!(body["max_output_tokens"], 200);
        let content = &body["input"][0]["content"];
        assert_eq!(content[0]["text"], "Respond in French. Describe");
        assert_eq!(content[1]["detail"], "low");
        assert!(
            content[1]["image_url"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );
    }

    #[test]
    fn responses_text_falls_back_to_output_items() {
        let parsed: ResponsesResponse = serde_json::from_str(
            r#"{ "output": [ { "type": "message", "content": [
                { "type": "output_text", "text": "{\"rows\":" },
                { "type": "output_text", "text": "[]}" }
            ] } ] }"#,
        )
        .unwrap();
        assert_eq!(parsed.text(), r#"{"rows":[]}"#);
    }

    #[test]
    fn json_shape_rejects_prose() {
        let shape = ResponseShape::Json {
            name: "image_analysis",
            schema: json!({}),
            strict: true,
        };
        let err = shape_text("not json".into(), &shape).unwrap_err();
        assert_eq!(err.to_string(), "provider response error: Model output was not valid JSON");
    }

    #[test]
    fn speech_body_defaults_are_explicit() {
        let body = build_speech_body(&SpeechRequest {
            model: "gpt-4o-mini-tts".into(),
            text: "hello".into(),
            voice: "alloy".into(),
            format: MediaFormat::Wav,
            speed: None,
            instructions: None,
        });
        assert_eq!(body["voice"], "alloy");
        assert_eq!(body["response_format"], "wav");
        assert!(body.get("speed").is_none());
    }

    #[test]
    fn generation_sends_output_format_only_to_image_models() {
        let mut request = ImageGenerationRequest {
            model: "gpt-image-1".into(),
            prompt: "a cat".into(),
            format: MediaFormat::Webp,
            size: Some("1024x1024".into()),
            background: None,
            quality: None,
        };
        assert_eq!(build_generation_body(&request)["output_format"], "webp");
        request.model = "dall-e-3".into();
        assert!(build_generation_body(&request).get("output_format").is_none());
    }

    #[test]
    fn failures_are_classified() {
        let body = br#"{"error":{"message":"Audio output is not supported for this model","code":"unsupported_value"}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, None, body, Capability::SpeechToSpeech);
        assert!(matches!(
            err,
            ProviderError::Unsupported {
                capability: Capability::SpeechToSpeech,
                ..
            }
        ));

        let body = br#"{"error":{"message":"Missing required parameter: 'prompt'."}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, None, body, Capability::General);
        assert!(matches!(err, ProviderError::InvalidRequest { .. }));

        let err = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(2)),
            b"",
            Capability::General,
        );
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after: Some(_)
            }
        ));

        let err = classify_failure(StatusCode::BAD_GATEWAY, None, b"upstream", Capability::General);
        assert!(matches!(err, ProviderError::Response { .. }));
    }
}
