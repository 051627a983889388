//! Manifest renderer
//!
//! Walks a [`ResolvedConfig`] and emits the release's resources in a fixed
//! order: ServiceAccount, Service, Deployment, HorizontalPodAutoscaler,
//! Ingress, HTTPRoute. Each optional resource has exactly one inclusion
//! flag; nothing is inferred from the presence of other keys.

use deckhand_core::{ChartMetadata, ConfigNode, ResolvedConfig};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    MetricSpec, MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, LocalObjectReference, PodSpec, PodTemplateSpec, Probe, Service,
    ServiceAccount, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::{BTreeMap, HashSet};

use crate::env::EnvAssembly;
use crate::error::{EngineError, Result};
use crate::naming::{Naming, Release};
use crate::ports::{container_ports, service_ports, PortSpec};
use crate::project::{non_empty, project, project_opt, quantities_as_strings, string_map, to_i32};
use crate::resource::{BackendRef, HttpRoute, HttpRouteRule, HttpRouteSpec, ParentReference, ResourceSpec};

const PROBE_SLOTS: [&str; 3] = ["livenessProbe", "readinessProbe", "startupProbe"];
const PROBE_HANDLERS: [&str; 4] = ["httpGet", "tcpSocket", "grpc", "exec"];

/// Renders resolved configuration into the release's resources
#[derive(Debug, Clone)]
pub struct ManifestRenderer {
    chart: ChartMetadata,
    release: Release,
}

impl ManifestRenderer {
    pub fn new(chart: ChartMetadata, release: Release) -> Self {
        Self { chart, release }
    }

    pub fn chart(&self) -> &ChartMetadata {
        &self.chart
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    /// Render every resource of the release, or nothing on the first error
    pub fn render(&self, config: &ResolvedConfig) -> Result<Vec<ResourceSpec>> {
        let naming = Naming::new(&self.chart, &self.release, config);
        let ports = service_ports(config)?;
        let mut specs = Vec::new();

        if config.get_bool("serviceAccount.create").unwrap_or(false) {
            specs.push(ResourceSpec::ServiceAccount(self.service_account(config, &naming)?));
        }
        specs.push(ResourceSpec::Service(self.service(config, &naming, &ports)?));
        specs.push(ResourceSpec::Deployment(self.deployment(config, &naming, &ports)?));

        if config.get_bool("autoscaling.enabled").unwrap_or(false) {
            specs.push(ResourceSpec::HorizontalPodAutoscaler(self.autoscaler(config, &naming)?));
        }

        let ingress = config.get_bool("ingress.enabled").unwrap_or(false);
        let http_route = config.get_bool("httpRoute.enabled").unwrap_or(false);
        if ingress {
            specs.push(ResourceSpec::Ingress(self.ingress(config, &naming, &ports)?));
        }
        if http_route {
            specs.push(ResourceSpec::HttpRoute(self.http_route(config, &naming, &ports)?));
        }
        if ingress && http_route {
            tracing::warn!(
                release = %self.release.name,
                "both ingress and httpRoute are enabled; rendering both"
            );
        }

        tracing::debug!(
            release = %self.release.name,
            resources = specs.len(),
            "rendered release"
        );
        Ok(specs)
    }

    fn metadata(
        &self,
        name: &str,
        naming: &Naming,
        annotations: BTreeMap<String, String>,
    ) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.release.namespace.clone()),
            labels: Some(naming.labels()),
            annotations: non_empty(annotations),
            ..Default::default()
        }
    }

    fn service_account(&self, config: &ResolvedConfig, naming: &Naming) -> Result<ServiceAccount> {
        let name = naming.service_account_name(config);
        let annotations = string_map(config, "serviceAccount.annotations")?;

        Ok(ServiceAccount {
            metadata: self.metadata(&name, naming, annotations),
            automount_service_account_token: config.get_bool("serviceAccount.automount"),
            ..Default::default()
        })
    }

    fn service(&self, config: &ResolvedConfig, naming: &Naming, ports: &[PortSpec]) -> Result<Service> {
        Ok(Service {
            metadata: self.metadata(naming.fullname(), naming, BTreeMap::new()),
            spec: Some(ServiceSpec {
                type_: config.get_str("service.type").map(str::to_string),
                ports: Some(ports.iter().map(PortSpec::to_service_port).collect()),
                selector: Some(naming.selector_labels()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn deployment(&self, config: &ResolvedConfig, naming: &Naming, ports: &[PortSpec]) -> Result<Deployment> {
        let container_ports = container_ports(ports);
        let container = self.main_container(config, &container_ports)?;
        let init_containers = self.init_containers(config, &container.name)?;

        let volumes: Option<Vec<Volume>> = project_opt(config, "volumes")?;
        check_volume_mounts(container.volume_mounts.as_deref(), volumes.as_deref())?;

        let replicas = if config.get_bool("autoscaling.enabled").unwrap_or(false) {
            None
        } else {
            Some(to_i32(config.get_i64("replicaCount").unwrap_or(1), "replicaCount")?)
        };

        let termination_grace_period_seconds = config
            .get_duration("terminationGracePeriod")
            .map(|d| {
                i64::try_from(d.as_secs())
                    .map_err(|_| EngineError::render("terminationGracePeriod", "duration is too long"))
            })
            .transpose()?;

        let mut pod_labels = naming.labels();
        pod_labels.extend(string_map(config, "podLabels")?);

        let pod = PodSpec {
            image_pull_secrets: project_opt::<Vec<LocalObjectReference>>(config, "imagePullSecrets")?,
            service_account_name: Some(naming.service_account_name(config)),
            security_context: project_opt(config, "podSecurityContext")?,
            init_containers: Some(init_containers).filter(|c| !c.is_empty()),
            containers: vec![container],
            volumes,
            node_selector: non_empty(string_map(config, "nodeSelector")?),
            affinity: project_opt(config, "affinity")?,
            tolerations: project_opt(config, "tolerations")?,
            termination_grace_period_seconds,
            ..Default::default()
        };

        Ok(Deployment {
            metadata: self.metadata(naming.fullname(), naming, BTreeMap::new()),
            spec: Some(DeploymentSpec {
                replicas,
                selector: LabelSelector {
                    match_labels: Some(naming.selector_labels()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        annotations: non_empty(string_map(config, "podAnnotations")?),
                        ..Default::default()
                    }),
                    spec: Some(pod),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn main_container(&self, config: &ResolvedConfig, ports: &[ContainerPort]) -> Result<Container> {
        let env = EnvAssembly::from_config(config)?;

        let [liveness_probe, readiness_probe, startup_probe] =
            PROBE_SLOTS.map(|slot| self.probe(config, slot, ports));

        let resources = match config.get("resources") {
            Some(node) if !node.is_empty() => Some(project(&quantities_as_strings(node), "resources")?),
            _ => None,
        };

        Ok(Container {
            name: self.chart.name.clone(),
            image: Some(self.image(config)?),
            image_pull_policy: config.get_str("image.pullPolicy").map(str::to_string),
            security_context: project_opt(config, "securityContext")?,
            ports: Some(ports.to_vec()),
            env: Some(env.env).filter(|e| !e.is_empty()),
            env_from: Some(env.env_from).filter(|e| !e.is_empty()),
            liveness_probe: liveness_probe?,
            readiness_probe: readiness_probe?,
            startup_probe: startup_probe?,
            resources,
            volume_mounts: project_opt::<Vec<VolumeMount>>(config, "volumeMounts")?,
            ..Default::default()
        })
    }

    /// `repository:tag`, the tag falling back to the chart's appVersion
    fn image(&self, config: &ResolvedConfig) -> Result<String> {
        let repository = config
            .get_str("image.repository")
            .filter(|r| !r.is_empty())
            .ok_or_else(|| EngineError::render("image.repository", "image repository is required"))?;

        let tag = config
            .get_str("image.tag")
            .filter(|t| !t.is_empty())
            .or(self.chart.app_version.as_deref());

        Ok(match tag {
            Some(tag) => format!("{}:{}", repository, tag),
            None => repository.to_string(),
        })
    }

    /// A probe is emitted only when its slot holds a non-empty mapping
    fn probe(&self, config: &ResolvedConfig, slot: &str, ports: &[ContainerPort]) -> Result<Option<Probe>> {
        let Some(node) = config.get(slot).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };

        // Layers deep-merge, so a new handler sits next to the default one
        let handlers: Vec<&str> = PROBE_HANDLERS
            .into_iter()
            .filter(|h| node.get(h).is_some_and(|n| !n.is_null()))
            .collect();
        if let [first, _, ..] = handlers.as_slice() {
            return Err(EngineError::render_with_help(
                slot,
                format!("probe sets more than one handler ({})", handlers.join(", ")),
                format!("set the handler being replaced to null, e.g. `{}.{}: null`", slot, first),
            ));
        }

        for handler in ["httpGet", "tcpSocket"] {
            let path = format!("{}.{}.port", slot, handler);
            if let Some(port) = node.get(&format!("{}.port", handler)).and_then(ConfigNode::as_str) {
                let known = ports.iter().any(|p| p.name.as_deref() == Some(port));
                if !known {
                    return Err(EngineError::render_with_help(
                        path,
                        format!("no container port named '{}'", port),
                        "name one of service.ports accordingly or use a port number",
                    ));
                }
            }
        }

        project(node, slot).map(Some)
    }

    fn init_containers(&self, config: &ResolvedConfig, main: &str) -> Result<Vec<Container>> {
        let items = config
            .get("initContainers")
            .and_then(ConfigNode::as_sequence)
            .unwrap_or_default();

        let mut names = HashSet::from([main.to_string()]);
        let mut containers = Vec::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            let path = format!("initContainers[{}]", i);
            let container: Container = project(item, &path)?;
            if !names.insert(container.name.clone()) {
                let reason = if container.name == main {
                    format!("'{}' collides with the main container", container.name)
                } else {
                    format!("duplicate container name '{}'", container.name)
                };
                return Err(EngineError::render(format!("{}.name", path), reason));
            }
            containers.push(container);
        }

        Ok(containers)
    }

    fn autoscaler(&self, config: &ResolvedConfig, naming: &Naming) -> Result<HorizontalPodAutoscaler> {
        let min = to_i32(config.get_i64("autoscaling.minReplicas").unwrap_or(1), "autoscaling.minReplicas")?;
        let max = to_i32(config.get_i64("autoscaling.maxReplicas").unwrap_or(100), "autoscaling.maxReplicas")?;
        if min > max {
            return Err(EngineError::render(
                "autoscaling.minReplicas",
                format!("minReplicas ({}) exceeds maxReplicas ({})", min, max),
            ));
        }

        let mut metrics = Vec::new();
        for (resource, key) in [
            ("cpu", "autoscaling.targetCPUUtilizationPercentage"),
            ("memory", "autoscaling.targetMemoryUtilizationPercentage"),
        ] {
            if let Some(target) = config.get_i64(key) {
                metrics.push(utilization_metric(resource, to_i32(target, key)?));
            }
        }

        Ok(HorizontalPodAutoscaler {
            metadata: self.metadata(naming.fullname(), naming, BTreeMap::new()),
            spec: Some(HorizontalPodAutoscalerSpec {
                scale_target_ref: CrossVersionObjectReference {
                    api_version: Some("apps/v1".to_string()),
                    kind: "Deployment".to_string(),
                    name: naming.fullname().to_string(),
                },
                min_replicas: Some(min),
                max_replicas: max,
                metrics: Some(metrics).filter(|m| !m.is_empty()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn ingress(&self, config: &ResolvedConfig, naming: &Naming, ports: &[PortSpec]) -> Result<Ingress> {
        let backend_port = primary_port(ports)?;
        let hosts = config
            .get("ingress.hosts")
            .and_then(ConfigNode::as_sequence)
            .unwrap_or_default();

        let mut rules = Vec::with_capacity(hosts.len());
        for (i, host) in hosts.iter().enumerate() {
            let paths = host
                .get("paths")
                .and_then(ConfigNode::as_sequence)
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(j, p)| {
                    let path = p.get("path").and_then(ConfigNode::as_str).ok_or_else(|| {
                        EngineError::render(format!("ingress.hosts[{}].paths[{}].path", i, j), "path is required")
                    })?;
                    Ok(HTTPIngressPath {
                        path: Some(path.to_string()),
                        path_type: p
                            .get("pathType")
                            .and_then(ConfigNode::as_str)
                            .unwrap_or("ImplementationSpecific")
                            .to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: naming.fullname().to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(backend_port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            rules.push(IngressRule {
                host: host.get("host").and_then(ConfigNode::as_str).map(str::to_string),
                http: Some(HTTPIngressRuleValue { paths }),
            });
        }

        let class_name = config
            .get_str("ingress.className")
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(Ingress {
            metadata: self.metadata(
                naming.fullname(),
                naming,
                string_map(config, "ingress.annotations")?,
            ),
            spec: Some(IngressSpec {
                ingress_class_name: class_name,
                rules: Some(rules).filter(|r| !r.is_empty()),
                tls: project_opt::<Vec<IngressTLS>>(config, "ingress.tls")?,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn http_route(&self, config: &ResolvedConfig, naming: &Naming, ports: &[PortSpec]) -> Result<HttpRoute> {
        let backend = BackendRef {
            name: naming.fullname().to_string(),
            port: primary_port(ports)?,
            weight: Some(1),
        };

        let parent_refs: Vec<ParentReference> =
            project_opt(config, "httpRoute.parentRefs")?.unwrap_or_default();
        let hostnames: Vec<String> = project_opt(config, "httpRoute.hostnames")?.unwrap_or_default();

        let mut rules: Vec<HttpRouteRule> = project_opt(config, "httpRoute.rules")?.unwrap_or_default();
        if rules.is_empty() {
            rules.push(HttpRouteRule::default());
        }
        for rule in &mut rules {
            rule.backend_refs = vec![backend.clone()];
        }

        Ok(HttpRoute::new(
            self.metadata(
                naming.fullname(),
                naming,
                string_map(config, "httpRoute.annotations")?,
            ),
            HttpRouteSpec {
                parent_refs,
                hostnames,
                rules,
            },
        ))
    }
}

/// The port routes point at: the first service port
fn primary_port(ports: &[PortSpec]) -> Result<i32> {
    ports
        .first()
        .map(|p| p.port)
        .ok_or_else(|| EngineError::render("service.ports", "no service port to route to"))
}

fn utilization_metric(resource: &str, average_utilization: i32) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: resource.to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(average_utilization),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

fn check_volume_mounts(mounts: Option<&[VolumeMount]>, volumes: Option<&[Volume]>) -> Result<()> {
    let names: HashSet<&str> = volumes
        .unwrap_or_default()
        .iter()
        .map(|v| v.name.as_str())
        .collect();

    for (i, mount) in mounts.unwrap_or_default().iter().enumerate() {
        if !names.contains(mount.name.as_str()) {
            return Err(EngineError::render_with_help(
                format!("volumeMounts[{}].name", i),
                format!("no volume named '{}'", mount.name),
                "declare the volume under volumes",
            ));
        }
    }
    Ok(())
}
