use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use modal_adapters::traits::{
    AdapterMetadata, ProviderAdapter, ProviderError, ProviderOutput, ProviderRequest,
    ProviderResult,
};
use modal_config::{ByteLimits, HostConfig};
use modal_kernel::{CollectingSink, Envelope, Invocation, ToolHost};
use modal_primitives::{ErrorCode, MediaFormat};
use serde_json::{Value, json};

/// Replays queued responses and counts every call it receives.
struct ScriptedAdapter {
    metadata: AdapterMetadata,
    responses: Mutex<VecDeque<ProviderResult<ProviderOutput>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedAdapter {
    fn new(responses: Vec<ProviderResult<ProviderOutput>>) -> Arc<Self> {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted"),
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn execute(&self, request: ProviderRequest) -> ProviderResult<ProviderOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::response("no scripted response left")))
    }
}

struct PanickingAdapter {
    metadata: AdapterMetadata,
}

#[async_trait]
impl ProviderAdapter for PanickingAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn execute(&self, _request: ProviderRequest) -> ProviderResult<ProviderOutput> {
        panic!("adapter bug");
    }
}

/// Answers every call with distinct MP3 bytes after a delay that grows with
/// each call, so concurrent invocations finish in a known order.
struct SlowSpeechAdapter {
    metadata: AdapterMetadata,
    calls: AtomicUsize,
}

#[async_trait]
impl ProviderAdapter for SlowSpeechAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn execute(&self, _request: ProviderRequest) -> ProviderResult<ProviderOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50 * (call as u64 + 1))).await;
        let mut bytes = mp3();
        bytes.push(u8::try_from(call).unwrap());
        Ok(ProviderOutput::Bytes(bytes.into()))
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

fn ogg() -> Vec<u8> {
    let mut bytes = b"OggS\x00\x02".to_vec();
    bytes.resize(64, 0);
    bytes
}

fn mp3() -> Vec<u8> {
    let mut bytes = b"ID3\x04\x00\x00".to_vec();
    bytes.resize(48, 0);
    bytes
}

fn host(root: &Path, adapter: Arc<ScriptedAdapter>) -> (ToolHost, Arc<CollectingSink>) {
    host_with(HostConfig::default().with_allowed_roots([root]), adapter)
}

fn host_with(config: HostConfig, adapter: Arc<ScriptedAdapter>) -> (ToolHost, Arc<CollectingSink>) {
    let sink = CollectingSink::new();
    let host = ToolHost::new(Arc::new(config), adapter).with_sink(sink.clone());
    (host, sink)
}

fn error_code(envelope: &Envelope) -> ErrorCode {
    envelope.error().expect("envelope should carry an error").code
}

fn metadata_field<'a>(envelope: &'a Envelope, key: &str) -> &'a Value {
    envelope
        .metadata()
        .and_then(|map| map.get(key))
        .unwrap_or_else(|| panic!("metadata field `{key}` missing"))
}

#[tokio::test]
async fn mismatched_mask_is_rejected_before_the_provider_call() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("photo.png"), png(512, 512)).unwrap();
    std::fs::write(root.path().join("mask.png"), png(256, 256)).unwrap();
    let adapter = ScriptedAdapter::new(vec![Ok(ProviderOutput::Bytes(png(512, 512).into()))]);
    let (host, _sink) = host(root.path(), adapter.clone());

    let envelope = host
        .call(
            "image_edit",
            json!({
                "image_ref": "photo.png",
                "mask_ref": "mask.png",
                "prompt": "remove the lamp",
                "output_ref": "edited.png"
            }),
        )
        .await;

    assert!(!envelope.ok());
    assert_eq!(error_code(&envelope), ErrorCode::InvalidArgument);
    assert!(envelope.error().unwrap().message.contains("256x256"));
    assert_eq!(adapter.calls(), 0);
    assert!(!root.path().join("edited.png").exists());
}

#[tokio::test]
async fn structured_extraction_is_returned_inline() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("receipt.png"), png(64, 64)).unwrap();
    let adapter = ScriptedAdapter::new(vec![Ok(ProviderOutput::Json(json!({"rows": []})))]);
    let (host, _sink) = host(root.path(), adapter.clone());

    let envelope = host
        .call(
            "image_extract",
            json!({
                "image_ref": "receipt.png",
                "json_schema": {
                    "type": "object",
                    "required": ["rows"],
                    "properties": {"rows": {"type": "array"}}
                }
            }),
        )
        .await;

    assert!(envelope.ok(), "{:?}", envelope.error());
    assert_eq!(envelope.data(), Some(&json!({"rows": []})));
    assert!(envelope.outputs().is_empty());
    assert!(envelope.error().is_none());
    assert_eq!(metadata_field(&envelope, "tool"), "image_extract");
    assert_eq!(metadata_field(&envelope, "model_source"), "default");
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn model_override_wins_over_configuration() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("scene.png"), png(32, 32)).unwrap();
    let adapter = ScriptedAdapter::new(vec![Ok(ProviderOutput::Text("a cat".to_owned()))]);
    let config = HostConfig::default()
        .with_allowed_roots([root.path()])
        .with_tool_model("image_analyze", "configured-vision");
    let (host, _sink) = host_with(config, adapter.clone());

    let envelope = host
        .invoke(
            Invocation::new(
                "image_analyze",
                json!({"image_ref": "scene.png", "instruction": "what is this?"}),
            )
            .with_model("caller-vision"),
        )
        .await;

    assert!(envelope.ok(), "{:?}", envelope.error());
    assert_eq!(envelope.data(), Some(&json!("a cat")));
    assert_eq!(metadata_field(&envelope, "model"), "caller-vision");
    assert_eq!(metadata_field(&envelope, "model_source"), "argument");
    assert_eq!(adapter.last_request().unwrap().model(), "caller-vision");
}

#[tokio::test]
async fn chain_reports_completed_outputs_when_a_later_step_fails() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("ui.png"), png(128, 96)).unwrap();
    std::fs::write(root.path().join("voice.ogg"), ogg()).unwrap();
    let adapter = ScriptedAdapter::new(vec![
        Ok(ProviderOutput::Text("# Login screen\n".to_owned())),
        Ok(ProviderOutput::Bytes(mp3().into())),
    ]);
    let (host, _sink) = host(root.path(), adapter.clone());

    let envelope = host
        .call(
            "multimodal_chain",
            json!({
                "steps": [
                    {
                        "tool": "image_to_spec",
                        "arguments": {"image_ref": "ui.png", "output_ref": "spec.md"},
                        "output_symbol": "spec"
                    },
                    {
                        "tool": "audio_transform",
                        "arguments": {
                            "audio_ref": "voice.ogg",
                            "instruction": "Narrate ${spec}",
                            "output_ref": "narration.mp3"
                        }
                    }
                ]
            }),
        )
        .await;

    assert!(!envelope.ok());
    assert_eq!(error_code(&envelope), ErrorCode::ChainStepFailed);
    assert_eq!(envelope.outputs().len(), 1);
    let spec = &envelope.outputs()[0];
    assert!(spec.reference.ends_with("spec.md"), "{}", spec.reference);
    assert_eq!(spec.format, MediaFormat::Markdown);
    assert_eq!(
        std::fs::read_to_string(root.path().join("spec.md")).unwrap(),
        "# Login screen\n"
    );

    let failed = metadata_field(&envelope, "failed_step");
    assert_eq!(failed["index"], 1);
    assert_eq!(failed["tool"], "audio_transform");
    assert_eq!(failed["code"], "UNSUPPORTED_FORMAT");
    assert_eq!(adapter.calls(), 1);
    assert!(!root.path().join("narration.mp3").exists());
}

#[tokio::test]
async fn chain_feeds_symbols_into_later_steps() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("ui.png"), png(128, 96)).unwrap();
    let adapter = ScriptedAdapter::new(vec![
        Ok(ProviderOutput::Text("a login form".to_owned())),
        Ok(ProviderOutput::Bytes(mp3().into())),
    ]);
    let (host, _sink) = host(root.path(), adapter.clone());

    let envelope = host
        .call(
            "multimodal_chain",
            json!({
                "steps": [
                    {
                        "tool": "image_analyze",
                        "arguments": {"image_ref": "ui.png", "instruction": "describe"},
                        "output_symbol": "summary"
                    },
                    {
                        "tool": "audio_tts",
                        "arguments": {"text": "Screen: ${summary}", "output_ref": "summary.mp3"},
                        "output_symbol": "speech"
                    }
                ]
            }),
        )
        .await;

    assert!(envelope.ok(), "{:?}", envelope.error());
    assert_eq!(envelope.outputs().len(), 1);
    assert_eq!(envelope.outputs()[0].format, MediaFormat::Mp3);
    assert_eq!(adapter.calls(), 2);
    match adapter.last_request().unwrap() {
        ProviderRequest::Speech(request) => assert_eq!(request.text, "Screen: a login form"),
        other => panic!("unexpected request {other:?}"),
    }
    let steps = metadata_field(&envelope, "steps").as_array().unwrap();
    assert_eq!(steps.len(), 2);
}

#[tokio::test]
async fn existing_targets_need_overwrite() {
    let root = tempfile::tempdir().unwrap();
    let adapter = ScriptedAdapter::new(vec![
        Ok(ProviderOutput::Bytes(mp3().into())),
        Ok(ProviderOutput::Bytes(mp3().into())),
    ]);
    let (host, _sink) = host(root.path(), adapter.clone());
    let arguments = json!({"text": "hello", "output_ref": "hello.mp3"});

    let first = host.call("audio_tts", arguments.clone()).await;
    assert!(first.ok(), "{:?}", first.error());
    let written = &first.outputs()[0];
    assert_eq!(written.bytes, mp3().len() as u64);
    assert_eq!(written.sha256, modal_kernel::sha256_hex(&mp3()));

    let second = host.call("audio_tts", arguments.clone()).await;
    assert_eq!(error_code(&second), ErrorCode::AlreadyExists);
    assert_eq!(adapter.calls(), 1);

    let mut replace = arguments;
    replace["overwrite"] = json!(true);
    let third = host.call("audio_tts", replace).await;
    assert!(third.ok(), "{:?}", third.error());
    assert_eq!(adapter.calls(), 2);
}

#[tokio::test]
async fn oversized_inputs_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let mut large = png(16, 16);
    large.resize(256, 0);
    std::fs::write(root.path().join("large.png"), large).unwrap();
    let adapter = ScriptedAdapter::new(Vec::new());
    let config = HostConfig::default()
        .with_allowed_roots([root.path()])
        .with_limits(ByteLimits {
            max_input_bytes: 64,
            ..ByteLimits::default()
        });
    let (host, _sink) = host_with(config, adapter.clone());

    let envelope = host
        .call(
            "image_analyze",
            json!({"image_ref": "large.png", "instruction": "describe"}),
        )
        .await;

    assert_eq!(error_code(&envelope), ErrorCode::PayloadTooLarge);
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn chain_symbols_must_be_produced_by_earlier_steps() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("ui.png"), png(8, 8)).unwrap();
    let adapter = ScriptedAdapter::new(Vec::new());
    let (host, _sink) = host(root.path(), adapter.clone());

    let forward = host
        .call(
            "multimodal_chain",
            json!({
                "steps": [
                    {
                        "tool": "image_analyze",
                        "arguments": {"image_ref": "ui.png", "instruction": "${later}"}
                    },
                    {
                        "tool": "image_analyze",
                        "arguments": {"image_ref": "ui.png", "instruction": "describe"},
                        "output_symbol": "later"
                    }
                ]
            }),
        )
        .await;
    assert_eq!(error_code(&forward), ErrorCode::InvalidArgument);
    assert!(forward.outputs().is_empty());

    let own = host
        .call(
            "multimodal_chain",
            json!({
                "steps": [{
                    "tool": "image_analyze",
                    "arguments": {"image_ref": "ui.png", "instruction": "${me}"},
                    "output_symbol": "me"
                }]
            }),
        )
        .await;
    assert_eq!(error_code(&own), ErrorCode::InvalidArgument);
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn unknown_tools_are_not_found() {
    let root = tempfile::tempdir().unwrap();
    let adapter = ScriptedAdapter::new(Vec::new());
    let (host, _sink) = host(root.path(), adapter.clone());

    let direct = host.call("video_render", json!({})).await;
    assert_eq!(error_code(&direct), ErrorCode::NotFound);

    let chained = host
        .call(
            "multimodal_chain",
            json!({"steps": [{"tool": "video_render", "arguments": {}}]}),
        )
        .await;
    assert_eq!(error_code(&chained), ErrorCode::NotFound);
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn adapter_panics_become_upstream_errors() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("scene.png"), png(8, 8)).unwrap();
    let adapter = Arc::new(PanickingAdapter {
        metadata: AdapterMetadata::new("panicking"),
    });
    let config = Arc::new(HostConfig::default().with_allowed_roots([root.path()]));
    let host = ToolHost::new(config, adapter);

    let envelope = host
        .call(
            "image_analyze",
            json!({"image_ref": "scene.png", "instruction": "describe"}),
        )
        .await;

    assert_eq!(error_code(&envelope), ErrorCode::UpstreamError);
    assert!(envelope.error().unwrap().message.contains("internal fault"));
}

#[tokio::test]
async fn single_tool_envelopes_are_either_success_or_error() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("scene.png"), png(8, 8)).unwrap();
    let adapter = ScriptedAdapter::new(vec![
        Ok(ProviderOutput::Text("a tree".to_owned())),
        Err(ProviderError::transport("connection reset")),
    ]);
    let (host, sink) = host(root.path(), adapter);

    let arguments = json!({"image_ref": "scene.png", "instruction": "describe"});
    host.call("image_analyze", arguments.clone()).await;
    host.call("image_analyze", arguments).await;
    host.call("image_analyze", json!({"instruction": "describe"})).await;
    host.call("audio_tts", json!({"text": "hi", "output_ref": "../escape.mp3"}))
        .await;

    let envelopes = sink.drain();
    assert_eq!(envelopes.len(), 4);
    for envelope in &envelopes {
        let succeeded = envelope.error().is_none();
        assert_eq!(envelope.ok(), succeeded);
        if succeeded {
            assert!(envelope.data().is_some() || !envelope.outputs().is_empty());
        } else {
            assert!(envelope.outputs().is_empty());
            assert!(envelope.data().is_none());
        }
        assert!(envelope.metadata().is_some_and(|map| map.contains_key("invocation_id")));
    }
    assert_eq!(error_code(&envelopes[1]), ErrorCode::UpstreamError);
    assert_eq!(error_code(&envelopes[2]), ErrorCode::InvalidArgument);
    assert_eq!(error_code(&envelopes[3]), ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn the_catalog_lists_every_tool() {
    let adapter = ScriptedAdapter::new(Vec::new());
    let host = ToolHost::new(Arc::new(HostConfig::default()), adapter);
    let names: Vec<String> = host.tools().into_iter().map(|tool| tool.name).collect();
    assert_eq!(names.len(), 10);
    assert_eq!(names.first().map(String::as_str), Some("image_analyze"));
    assert_eq!(names.last().map(String::as_str), Some("multimodal_chain"));
}

#[tokio::test]
async fn concurrent_writes_to_one_target_keep_the_first_artifact() {
    let root = tempfile::tempdir().unwrap();
    let adapter = Arc::new(SlowSpeechAdapter {
        metadata: AdapterMetadata::new("slow"),
        calls: AtomicUsize::new(0),
    });
    let config = Arc::new(HostConfig::default().with_allowed_roots([root.path()]));
    let host = ToolHost::new(config, adapter.clone());
    let arguments = json!({"text": "hello", "output_ref": "race.mp3"});

    let (first, second) = tokio::join!(
        host.call("audio_tts", arguments.clone()),
        host.call("audio_tts", arguments.clone()),
    );

    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    let (winner, loser) = if first.ok() { (first, second) } else { (second, first) };
    assert!(winner.ok(), "{:?}", winner.error());
    assert_eq!(error_code(&loser), ErrorCode::AlreadyExists);
    assert!(loser.outputs().is_empty());

    let on_disk = std::fs::read(root.path().join("race.mp3")).unwrap();
    assert_eq!(modal_kernel::sha256_hex(&on_disk), winner.outputs()[0].sha256);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
}

fn summarize_then_speak(final_output: &str) -> Value {
    json!({
        "steps": [
            {
                "tool": "image_analyze",
                "arguments": {"image_ref": "ui.png", "instruction": "describe"},
                "output_symbol": "summary"
            },
            {
                "tool": "audio_tts",
                "arguments": {"text": "Screen: ${summary}", "output_ref": "summary.mp3"}
            }
        ],
        "final_output_ref": final_output,
        "final_symbol": "summary"
    })
}

#[tokio::test]
async fn final_symbol_writes_an_earlier_step_result() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("ui.png"), png(64, 48)).unwrap();
    let adapter = ScriptedAdapter::new(vec![
        Ok(ProviderOutput::Text("a login form".to_owned())),
        Ok(ProviderOutput::Bytes(mp3().into())),
    ]);
    let (host, _sink) = host(root.path(), adapter.clone());

    let envelope = host
        .call("multimodal_chain", summarize_then_speak("summary.md"))
        .await;

    assert!(envelope.ok(), "{:?}", envelope.error());
    assert_eq!(adapter.calls(), 2);
    assert_eq!(envelope.data(), Some(&json!("a login form")));

    let outputs = envelope.outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].format, MediaFormat::Mp3);
    let summary = &outputs[1];
    assert!(summary.reference.ends_with("summary.md"), "{}", summary.reference);
    assert_eq!(summary.format, MediaFormat::Markdown);
    assert_eq!(summary.bytes, "a login form".len() as u64);

    let written = std::fs::read(root.path().join("summary.md")).unwrap();
    assert_eq!(written, b"a login form");
    assert_eq!(summary.sha256, modal_kernel::sha256_hex(&written));
}

#[tokio::test]
async fn final_write_collisions_fail_after_the_last_step() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("ui.png"), png(64, 48)).unwrap();
    std::fs::write(root.path().join("summary.md"), "kept").unwrap();
    let adapter = ScriptedAdapter::new(vec![
        Ok(ProviderOutput::Text("a login form".to_owned())),
        Ok(ProviderOutput::Bytes(mp3().into())),
    ]);
    let (host, _sink) = host(root.path(), adapter.clone());

    let envelope = host
        .call("multimodal_chain", summarize_then_speak("summary.md"))
        .await;

    assert_eq!(error_code(&envelope), ErrorCode::ChainStepFailed);
    let failed = metadata_field(&envelope, "failed_step");
    assert_eq!(failed["index"], 2);
    assert_eq!(failed["code"], "ALREADY_EXISTS");
    assert_eq!(envelope.outputs().len(), 1);
    assert!(envelope.outputs()[0].reference.ends_with("summary.mp3"));
    assert!(root.path().join("summary.mp3").exists());
    assert_eq!(
        std::fs::read_to_string(root.path().join("summary.md")).unwrap(),
        "kept"
    );
}

#[tokio::test]
async fn final_artifacts_must_match_their_extension() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("ui.png"), png(64, 48)).unwrap();
    let adapter = ScriptedAdapter::new(vec![
        Ok(ProviderOutput::Text("a login form".to_owned())),
        Ok(ProviderOutput::Bytes(mp3().into())),
    ]);
    let (host, _sink) = host(root.path(), adapter.clone());

    let envelope = host
        .call("multimodal_chain", summarize_then_speak("summary.png"))
        .await;

    assert_eq!(error_code(&envelope), ErrorCode::ChainStepFailed);
    let failed = metadata_field(&envelope, "failed_step");
    assert_eq!(failed["index"], 2);
    assert_eq!(failed["code"], "INVALID_ARGUMENT");
    assert!(!root.path().join("summary.png").exists());
}
