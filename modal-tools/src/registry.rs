//! Read-only registry resolving tool names to specs.

use std::collections::{HashMap, HashSet};

use modal_policy::ResourceRef;
use modal_primitives::{HostError, Result};
use modal_schema::SchemaNode;
use thiserror::Error;
use tracing::debug;

use crate::catalog::builtin_specs;
use crate::kind::ToolKind;
use crate::spec::{OutputMode, ToolDescriptor, ToolSpec};

/// Errors raised when assembling a custom catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolSpecError {
    /// Two specs share a name.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// A spec breaks a catalog invariant.
    #[error("invalid spec for `{name}`: {reason}")]
    InvalidSpec {
        /// Name of the offending tool.
        name: String,
        /// Human-readable reason for rejection.
        reason: &'static str,
    },
}

/// Registry of tool specs keyed by name.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    index: HashMap<&'static str, usize>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolRegistry {
    /// Creates a registry holding the full built-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self::assemble(builtin_specs())
    }

    /// Creates a registry from an explicit list of specs, e.g. a subset of
    /// the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ToolSpecError::DuplicateTool`] for repeated names and
    /// [`ToolSpecError::InvalidSpec`] when a file-writing tool lacks an
    /// `output_ref` argument or output formats.
    pub fn from_specs(specs: Vec<ToolSpec>) -> std::result::Result<Self, ToolSpecError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name()) {
                return Err(ToolSpecError::DuplicateTool {
                    name: spec.name().to_owned(),
                });
            }
            check_spec(spec)?;
        }
        Ok(Self::assemble(specs))
    }

    fn assemble(specs: Vec<ToolSpec>) -> Self {
        let index = specs
            .iter()
            .enumerate()
            .map(|(position, spec)| (spec.name(), position))
            .collect();
        Self { specs, index }
    }

    /// Resolves a tool by name.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` when no tool carries `name`.
    pub fn resolve(&self, name: &str) -> Result<&ToolSpec> {
        self.index
            .get(name)
            .and_then(|position| self.specs.get(*position))
            .ok_or_else(|| HostError::not_found(format!("tool `{name}` is not registered")))
    }

    /// Returns the spec for a known variant, if registered.
    #[must_use]
    pub fn get(&self, kind: ToolKind) -> Option<&ToolSpec> {
        self.resolve(kind.name()).ok()
    }

    /// Lists specs in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.specs.iter()
    }

    /// Lists descriptors in catalog order.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.specs.iter().map(ToolSpec::descriptor).collect()
    }

    /// Enforces the write-target rule for an authorized output.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_ARGUMENT` for inline tools, which never write, and
    /// `ALREADY_EXISTS` when the target exists and `overwrite` is false.
    pub fn check_output_target(
        &self,
        spec: &ToolSpec,
        target: &ResourceRef,
        overwrite: bool,
    ) -> Result<()> {
        if spec.output_mode() == OutputMode::Inline {
            return Err(HostError::invalid_argument(format!(
                "{} returns results inline and cannot write `{}`",
                spec.name(),
                target.reference()
            )));
        }
        if target.exists() && !overwrite {
            debug!(tool = spec.name(), target = target.reference(), "write target exists");
            return Err(HostError::already_exists(format!(
                "`{}` already exists; pass overwrite=true to replace it",
                target.reference()
            )));
        }
        Ok(())
    }
}

fn check_spec(spec: &ToolSpec) -> std::result::Result<(), ToolSpecError> {
    let invalid = |reason| ToolSpecError::InvalidSpec {
        name: spec.name().to_owned(),
        reason,
    };
    let SchemaNode::Object(input) = spec.input_schema() else {
        return Err(invalid("input contract must be an object"));
    };
    if !input.is_closed() {
        return Err(invalid("input contract must be closed"));
    }
    if spec.writes_file() {
        if !input.required().iter().any(|name| name == "output_ref") {
            return Err(invalid("file-writing tools must require `output_ref`"));
        }
        if spec.output_formats().is_empty() {
            return Err(invalid("file-writing tools must declare output formats"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modal_primitives::ErrorCode;

    #[test]
    fn resolves_every_builtin_tool() {
        let registry = ToolRegistry::builtin();
        for kind in ToolKind::ALL {
            assert_eq!(registry.resolve(kind.name()).unwrap().kind(), kind);
        }
        assert_eq!(registry.list().len(), ToolKind::ALL.len());
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let err = ToolRegistry::builtin().resolve("video_generate").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn builtin_catalog_passes_spec_checks() {
        assert!(ToolRegistry::from_specs(builtin_specs()).is_ok());
    }

    #[test]
    fn duplicate_specs_are_rejected() {
        let mut specs = builtin_specs();
        specs.push(specs[0].clone());
        let err = ToolRegistry::from_specs(specs).unwrap_err();
        assert!(matches!(err, ToolSpecError::DuplicateTool { name } if name == "image_analyze"));
    }

    #[test]
    fn subsets_only_resolve_their_members() {
        let specs = builtin_specs()
            .into_iter()
            .filter(|spec| spec.kind() == ToolKind::AudioTts)
            .collect();
        let registry = ToolRegistry::from_specs(specs).unwrap();
        assert!(registry.get(ToolKind::AudioTts).is_some());
        assert!(registry.get(ToolKind::ImageEdit).is_none());
    }
}
