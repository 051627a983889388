//! Rendered resources

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One rendered resource, handed to the apply collaborator as-is
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResourceSpec {
    ServiceAccount(ServiceAccount),
    Service(Service),
    Deployment(Deployment),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
    Ingress(Ingress),
    HttpRoute(HttpRoute),
}

impl ResourceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceAccount(_) => "ServiceAccount",
            Self::Service(_) => "Service",
            Self::Deployment(_) => "Deployment",
            Self::HorizontalPodAutoscaler(_) => "HorizontalPodAutoscaler",
            Self::Ingress(_) => "Ingress",
            Self::HttpRoute(_) => "HTTPRoute",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ServiceAccount(r) => &r.metadata,
            Self::Service(r) => &r.metadata,
            Self::Deployment(r) => &r.metadata,
            Self::HorizontalPodAutoscaler(r) => &r.metadata,
            Self::Ingress(r) => &r.metadata,
            Self::HttpRoute(r) => &r.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// File the resource is written to (`--output-dir`, `# Source:` headers)
    pub fn source_file(&self) -> &'static str {
        match self {
            Self::ServiceAccount(_) => "serviceaccount.yaml",
            Self::Service(_) => "service.yaml",
            Self::Deployment(_) => "deployment.yaml",
            Self::HorizontalPodAutoscaler(_) => "hpa.yaml",
            Self::Ingress(_) => "ingress.yaml",
            Self::HttpRoute(_) => "httproute.yaml",
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Render resources as one multi-document YAML stream
pub fn to_yaml(specs: &[ResourceSpec]) -> Result<String> {
    let mut out = String::new();
    for spec in specs {
        out.push_str("---\n");
        out.push_str(&format!("# Source: {}\n", spec.source_file()));
        out.push_str(&spec.to_yaml()?);
    }
    Ok(out)
}

/// Gateway API `HTTPRoute` (gateway.networking.k8s.io/v1)
///
/// Not part of the core API, so not covered by k8s-openapi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: HttpRouteSpec,
}

impl HttpRoute {
    pub const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    pub const KIND: &'static str = "HTTPRoute";

    pub fn new(metadata: ObjectMeta, spec: HttpRouteSpec) -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata,
            spec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_refs: Vec<ParentReference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<HttpRouteRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// Route rule; matches and filters are passed through unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_refs: Vec<BackendRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    pub name: String,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}
