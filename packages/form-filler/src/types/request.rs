//! Typed request for one form-filling run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::document::{DocumentRef, DEFAULT_IDENTITY};
use crate::error::{FormFillError, Result};

/// Input to [`FormFiller::process`](crate::FormFiller::process).
///
/// Optional fields carry documented defaults:
/// - `reuse_index`: `true`
/// - `filter_identities`: the source identity only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FillRequest {
    /// Document the answers are retrieved from
    pub source: Option<DocumentRef>,

    /// Form whose fields are to be filled
    pub target_form: Option<PathBuf>,

    /// Load a persisted index for the source identity when one exists
    #[serde(default)]
    pub reuse_index: Option<bool>,

    /// Identities retrieval is restricted to
    #[serde(default)]
    pub filter_identities: Option<Vec<String>>,
}

impl FillRequest {
    pub fn new(source: DocumentRef, target_form: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source),
            target_form: Some(target_form.into()),
            reuse_index: None,
            filter_identities: None,
        }
    }

    pub fn with_reuse_index(mut self, reuse: bool) -> Self {
        self.reuse_index = Some(reuse);
        self
    }

    pub fn with_filter_identities(
        mut self,
        identities: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.filter_identities = Some(identities.into_iter().map(Into::into).collect());
        self
    }

    /// Check required references and resolve defaults.
    ///
    /// Runs before any collaborator is touched.
    pub fn validate(self) -> Result<ValidatedRequest> {
        let mut source = self
            .source
            .ok_or_else(|| FormFillError::invalid_input("no source document provided"))?;
        if source.path.as_os_str().is_empty() {
            return Err(FormFillError::invalid_input("source document path is empty"));
        }
        if source.identity.trim().is_empty() {
            source.identity = DEFAULT_IDENTITY.to_string();
        }
        validate_identity(&source.identity)?;

        let target_form = self
            .target_form
            .ok_or_else(|| FormFillError::invalid_input("no target form provided"))?;
        if target_form.as_os_str().is_empty() {
            return Err(FormFillError::invalid_input("target form path is empty"));
        }

        let mut filter_identities = Vec::new();
        for id in self
            .filter_identities
            .unwrap_or_else(|| vec![source.identity.clone()])
        {
            let id = id.trim().to_string();
            if !id.is_empty() && !filter_identities.contains(&id) {
                filter_identities.push(id);
            }
        }

        Ok(ValidatedRequest {
            source,
            target_form,
            reuse_index: self.reuse_index.unwrap_or(true),
            filter_identities,
        })
    }
}

/// A request whose references were checked and defaults applied.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub source: DocumentRef,
    pub target_form: PathBuf,
    pub reuse_index: bool,
    pub filter_identities: Vec<String>,
}

/// Identities name storage directories, so they must be a single path component.
pub fn validate_identity(identity: &str) -> Result<()> {
    if identity.is_empty()
        || identity == "."
        || identity == ".."
        || identity.contains(['/', '\\'])
    {
        return Err(FormFillError::invalid_input(format!(
            "identity {identity:?} cannot name a storage directory"
        )));
    }
    Ok(())
}
