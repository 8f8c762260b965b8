//! Deployment detection — cloud vs. self-hosted.
//!
//! An explicit `DEPLOYMENT_TYPE` wins. Otherwise the presence of any
//! cloud-specific variable selects a cloud deployment.

use serde::Serialize;

/// Cloud-provider hint variables, checked in order.
const CLOUD_MARKERS: &[(&str, CloudProvider)] = &[
    ("VERCEL", CloudProvider::Vercel),
    ("AWS_REGION", CloudProvider::Aws),
    ("AZURE_FUNCTIONS_ENVIRONMENT", CloudProvider::Azure),
    ("GOOGLE_CLOUD_PROJECT", CloudProvider::Gcp),
    ("STORAGE_BUCKET", CloudProvider::Generic),
];

/// Which cloud the service appears to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Vercel,
    Aws,
    Azure,
    Gcp,
    Generic,
}

/// Detected deployment flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "provider", rename_all = "kebab-case")]
pub enum DeploymentKind {
    Cloud(CloudProvider),
    SelfHosted,
}

impl DeploymentKind {
    /// Detect from the process environment.
    pub fn from_env() -> Self {
        Self::detect(|key| std::env::var(key).ok())
    }

    /// Detect using an arbitrary variable lookup.
    pub fn detect<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // A marker counts when set at all, even to an empty value.
        let present = |key: &str| lookup(key).is_some();

        if let Some(explicit) = lookup("DEPLOYMENT_TYPE") {
            match explicit.trim().to_ascii_lowercase().as_str() {
                "self-hosted" | "selfhosted" | "self_hosted" => return DeploymentKind::SelfHosted,
                "cloud" => {
                    let provider = CLOUD_MARKERS
                        .iter()
                        .find(|(key, _)| present(key))
                        .map(|(_, p)| *p)
                        .unwrap_or(CloudProvider::Generic);
                    return DeploymentKind::Cloud(provider);
                }
                other => {
                    tracing::warn!(value = other, "Unknown DEPLOYMENT_TYPE, falling back to detection");
                }
            }
        }

        CLOUD_MARKERS
            .iter()
            .find(|(key, _)| present(key))
            .map(|(_, p)| DeploymentKind::Cloud(*p))
            .unwrap_or(DeploymentKind::SelfHosted)
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, DeploymentKind::Cloud(_))
    }
}

impl std::fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentKind::Cloud(p) => write!(f, "cloud ({:?})", p),
            DeploymentKind::SelfHosted => write!(f, "self-hosted"),
        }
    }
}
