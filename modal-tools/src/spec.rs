//! Immutable tool descriptors.

use modal_primitives::{ErrorCode, HostError, MediaFormat, ModelCategory, Result};
use modal_schema::{SchemaNode, ValidationMode, ValidationOutcome, validate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kind::ToolKind;

/// Where a tool delivers its result.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Writes exactly one artifact to `output_ref`.
    WritesFile,
    /// Returns its result inline and never writes.
    Inline,
    /// Runs other tools; may write a final artifact.
    Composite,
}

/// Static description of one tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub(crate) kind: ToolKind,
    pub(crate) description: &'static str,
    pub(crate) input: SchemaNode,
    pub(crate) output_mode: OutputMode,
    pub(crate) error_codes: Vec<ErrorCode>,
    pub(crate) category: Option<ModelCategory>,
    pub(crate) allows_partial: bool,
    pub(crate) output_formats: Vec<MediaFormat>,
}

impl ToolSpec {
    /// Returns the tool variant.
    #[must_use]
    pub const fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Returns the stable wire name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Returns the one-line description.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.description
    }

    /// Returns the closed input contract.
    #[must_use]
    pub fn input_schema(&self) -> &SchemaNode {
        &self.input
    }

    /// Returns how results are delivered.
    #[must_use]
    pub const fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Returns `true` for generative-to-file tools.
    #[must_use]
    pub fn writes_file(&self) -> bool {
        self.output_mode == OutputMode::WritesFile
    }

    /// Returns the error codes this tool may report.
    #[must_use]
    pub fn error_codes(&self) -> &[ErrorCode] {
        &self.error_codes
    }

    /// Returns the model family, `None` for the composite tool.
    #[must_use]
    pub const fn category(&self) -> Option<ModelCategory> {
        self.category
    }

    /// Returns the built-in default model.
    #[must_use]
    pub fn default_model(&self) -> Option<&'static str> {
        self.category.map(ModelCategory::default_model)
    }

    /// Returns `true` when structured results may be partial.
    #[must_use]
    pub const fn allows_partial(&self) -> bool {
        self.allows_partial
    }

    /// Returns the validation mode used for structured provider output.
    #[must_use]
    pub const fn output_validation_mode(&self) -> ValidationMode {
        if self.allows_partial {
            ValidationMode::BestEffort
        } else {
            ValidationMode::Strict
        }
    }

    /// Returns the output formats a writes-file tool can produce; the first
    /// entry is the default.
    #[must_use]
    pub fn output_formats(&self) -> &[MediaFormat] {
        &self.output_formats
    }

    /// Checks `arguments` against the closed input contract.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_ARGUMENT` naming the first offending path.
    pub fn validate_arguments(&self, arguments: &Value) -> Result<()> {
        match validate(arguments, &self.input, ValidationMode::Strict) {
            ValidationOutcome::Invalid(violation) => Err(HostError::invalid_argument(format!(
                "{}: invalid arguments at {violation}",
                self.name()
            ))),
            ValidationOutcome::Valid | ValidationOutcome::ValidWithWarnings(_) => Ok(()),
        }
    }

    /// Picks the output format from the explicit `format` argument and the
    /// extension of `output_ref`.
    ///
    /// When both name a format they must agree. Without an explicit format
    /// the extension decides, falling back to the tool default. The
    /// reference itself is never rewritten.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_ARGUMENT` when the two disagree, when either names a
    /// format the tool cannot produce, or when the tool writes no files.
    pub fn resolve_output_format(
        &self,
        requested: Option<&str>,
        output_ref: &str,
    ) -> Result<MediaFormat> {
        let Some(default) = self.output_formats.first().copied() else {
            return Err(HostError::invalid_argument(format!(
                "{} does not produce files",
                self.name()
            )));
        };

        let requested = requested
            .map(|raw| {
                raw.parse::<MediaFormat>()
                    .ok()
                    .filter(|format| self.output_formats.contains(format))
                    .ok_or_else(|| {
                        HostError::invalid_argument(format!(
                            "{} cannot produce format `{raw}`",
                            self.name()
                        ))
                    })
            })
            .transpose()?;

        let inferred = MediaFormat::from_reference(output_ref);
        match (requested, inferred) {
            (Some(requested), Some(inferred)) if requested != inferred => {
                Err(HostError::invalid_argument(format!(
                    "format `{requested}` conflicts with the extension of `{output_ref}` ({inferred})"
                )))
            }
            (Some(requested), _) => Ok(requested),
            (None, Some(inferred)) if self.output_formats.contains(&inferred) => Ok(inferred),
            (None, Some(inferred)) => Err(HostError::invalid_argument(format!(
                "{} cannot produce `{inferred}` output for `{output_ref}`",
                self.name()
            ))),
            (None, None) => Ok(default),
        }
    }

    /// Returns a serializable summary for tool listings.
    #[must_use]
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_owned(),
            description: self.description.to_owned(),
            output_mode: self.output_mode,
            input_schema: self.input.to_json(),
            error_codes: self.error_codes.clone(),
            default_model: self.default_model().map(str::to_owned),
        }
    }
}

/// Wire form of a tool for discovery endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Stable tool name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Output delivery mode.
    pub output_mode: OutputMode,
    /// JSON Schema of the arguments.
    pub input_schema: Value,
    /// Error codes the tool may report.
    pub error_codes: Vec<ErrorCode>,
    /// Built-in default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[cfg(test)]
mod tests {
    use crate::catalog::spec_for;
    use crate::kind::ToolKind;
    use modal_primitives::{ErrorCode, MediaFormat};
    use serde_json::json;

    #[test]
    fn unknown_arguments_are_rejected() {
        let spec = spec_for(ToolKind::ImageAnalyze);
        let err = spec
            .validate_arguments(&json!({
                "image_ref": "a.png",
                "instruction": "describe",
                "temperature": 0.2
            }))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(err.message().contains("$.temperature"), "{}", err.message());
    }

    #[test]
    fn missing_required_argument_names_the_field() {
        let spec = spec_for(ToolKind::AudioTts);
        let err = spec
            .validate_arguments(&json!({ "text": "hello" }))
            .unwrap_err();
        assert!(err.message().contains("$.output_ref"), "{}", err.message());
    }

    #[test]
    fn format_follows_extension_or_default() {
        let spec = spec_for(ToolKind::ImageGenerate);
        assert_eq!(spec.resolve_output_format(None, "out/cat.webp").unwrap(), MediaFormat::Webp);
        assert_eq!(spec.resolve_output_format(None, "out/cat").unwrap(), MediaFormat::Png);
        assert_eq!(
            spec.resolve_output_format(Some("jpeg"), "out/cat.jpg").unwrap(),
            MediaFormat::Jpeg
        );
    }

    #[test]
    fn conflicting_format_and_extension_is_rejected() {
        let spec = spec_for(ToolKind::AudioTts);
        let err = spec
            .resolve_output_format(Some("wav"), "speech.mp3")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = spec.resolve_output_format(None, "speech.png").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn inline_tools_have_no_output_format() {
        let spec = spec_for(ToolKind::ImageAnalyze);
        assert!(spec.resolve_output_format(None, "x.png").is_err());
        assert!(!spec.writes_file());
    }
}
