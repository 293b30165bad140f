//! Project verification against the external registry.
//!
//! Every submitted node name is checked before persistence. The registry
//! may return a different canonical name than the one submitted (project
//! renames); both are kept. The synthetic root never reaches the
//! registry.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use fanout_graph::ROOT_NODE;

/// A registry-confirmed project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProject {
    /// Canonical name per the registry; may differ from the submitted one.
    pub verified_name: String,
    /// Registry identifier; `None` only for the synthetic root.
    pub project_id: Option<String>,
}

/// Why a verification attempt did not produce a project.
#[derive(Debug, Clone)]
pub enum VerifyError {
    /// The registry does not know this project. Not retryable.
    NotFound(String),
    /// The registry could not be reached or answered abnormally.
    Unavailable(String),
}

#[async_trait]
pub trait ProjectVerifier: Send + Sync {
    async fn verify(
        &self,
        project_name: &str,
        chain_id: u64,
    ) -> Result<VerifiedProject, VerifyError>;
}

/// Verify one node, short-circuiting the synthetic root with a canned
/// success so it never hits the registry.
pub async fn verify_node(
    verifier: &dyn ProjectVerifier,
    project_name: &str,
    chain_id: u64,
) -> Result<VerifiedProject, VerifyError> {
    if project_name == ROOT_NODE {
        return Ok(VerifiedProject {
            verified_name: ROOT_NODE.to_string(),
            project_id: None,
        });
    }
    verifier.verify(project_name, chain_id).await
}

// ── HTTP registry client ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RegistryProject {
    id: String,
    name: String,
}

/// `ProjectVerifier` backed by the registry's HTTP API.
pub struct RegistryVerifier {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryVerifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProjectVerifier for RegistryVerifier {
    async fn verify(
        &self,
        project_name: &str,
        chain_id: u64,
    ) -> Result<VerifiedProject, VerifyError> {
        let url = format!("{}/api/projects/{}", self.base_url, project_name);
        let response = self
            .http
            .get(&url)
            .query(&[("chainId", chain_id.to_string())])
            .send()
            .await
            .map_err(|e| VerifyError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(VerifyError::NotFound(project_name.to_string()));
        }
        if !response.status().is_success() {
            return Err(VerifyError::Unavailable(format!(
                "registry returned {}",
                response.status()
            )));
        }

        let project: RegistryProject = response
            .json()
            .await
            .map_err(|e| VerifyError::Unavailable(e.to_string()))?;

        debug!(
            submitted = project_name,
            verified = %project.name,
            "project verified"
        );
        Ok(VerifiedProject {
            verified_name: project.name,
            project_id: Some(project.id),
        })
    }
}

// ── Static verifier ────────────────────────────────────────────────

use std::collections::HashMap;

/// In-process verifier for local runs and tests.
///
/// In passthrough mode every name verifies as itself. Individual names
/// can be remapped (rename case) or failed.
#[derive(Default)]
pub struct StaticVerifier {
    renames: HashMap<String, String>,
    rejects: HashMap<String, String>,
}

impl StaticVerifier {
    /// Everything verifies as submitted.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Make `submitted` verify under a different canonical name.
    pub fn with_rename(mut self, submitted: &str, canonical: &str) -> Self {
        self.renames
            .insert(submitted.to_string(), canonical.to_string());
        self
    }

    /// Make `submitted` fail verification permanently.
    pub fn with_reject(mut self, submitted: &str, reason: &str) -> Self {
        self.rejects
            .insert(submitted.to_string(), reason.to_string());
        self
    }
}

#[async_trait]
impl ProjectVerifier for StaticVerifier {
    async fn verify(
        &self,
        project_name: &str,
        _chain_id: u64,
    ) -> Result<VerifiedProject, VerifyError> {
        if let Some(reason) = self.rejects.get(project_name) {
            return Err(VerifyError::NotFound(reason.clone()));
        }
        let verified_name = self
            .renames
            .get(project_name)
            .cloned()
            .unwrap_or_else(|| project_name.to_string());
        Ok(VerifiedProject {
            project_id: Some(format!("proj-{verified_name}")),
            verified_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_short_circuits_without_touching_the_verifier() {
        // A verifier that rejects everything: root must still pass.
        let verifier = StaticVerifier::passthrough().with_reject("root", "never called");

        let project = verify_node(&verifier, ROOT_NODE, 1).await.unwrap();
        assert_eq!(project.verified_name, ROOT_NODE);
        assert_eq!(project.project_id, None);
    }

    #[tokio::test]
    async fn passthrough_verifies_as_submitted() {
        let verifier = StaticVerifier::passthrough();
        let project = verify_node(&verifier, "acme/lib", 1).await.unwrap();
        assert_eq!(project.verified_name, "acme/lib");
        assert!(project.project_id.is_some());
    }

    #[tokio::test]
    async fn renames_surface_the_canonical_name() {
        let verifier = StaticVerifier::passthrough().with_rename("old/name", "new/name");
        let project = verify_node(&verifier, "old/name", 1).await.unwrap();
        assert_eq!(project.verified_name, "new/name");
    }

    #[tokio::test]
    async fn rejects_fail_permanently() {
        let verifier = StaticVerifier::passthrough().with_reject("gone/project", "not found");
        let result = verify_node(&verifier, "gone/project", 1).await;
        assert!(matches!(result, Err(VerifyError::NotFound(_))));
    }
}
