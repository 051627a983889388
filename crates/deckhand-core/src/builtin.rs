//! Built-in schema for the application chart
//!
//! Mirrors the documented parameters of a standard single-workload chart:
//! image, service, ingress and gateway routes, probes, autoscaling and the
//! pod-level knobs that are passed through to the workload.

use crate::node::{ConfigNode, Mapping};
use crate::schema::{FieldSpec, FieldType, Rule, SchemaMode, SchemaStore};

fn enum_of(values: &[&str]) -> FieldType {
    FieldType::Enum(values.iter().map(|v| v.to_string()).collect())
}

fn empty_list() -> ConfigNode {
    ConfigNode::Sequence(Vec::new())
}

fn empty_map() -> ConfigNode {
    ConfigNode::Mapping(Mapping::new())
}

fn http_get_probe() -> ConfigNode {
    let mut probe = ConfigNode::mapping();
    probe.set("httpGet.path", "/".into());
    probe.set("httpGet.port", "http".into());
    probe
}

fn example_ingress_hosts() -> ConfigNode {
    let mut path = ConfigNode::mapping();
    path.set("path", "/".into());
    path.set("pathType", "ImplementationSpecific".into());

    let mut host = ConfigNode::mapping();
    host.set("host", "chart-example.local".into());
    host.set("paths", ConfigNode::Sequence(vec![path]));

    ConfigNode::Sequence(vec![host])
}

fn example_parent_refs() -> ConfigNode {
    let mut parent = ConfigNode::mapping();
    parent.set("name", "gateway".into());
    parent.set("sectionName", "http".into());
    ConfigNode::Sequence(vec![parent])
}

fn example_route_rules() -> ConfigNode {
    let mut rule = ConfigNode::mapping();
    let mut matcher = ConfigNode::mapping();
    matcher.set("path.type", "PathPrefix".into());
    matcher.set("path.value", "/".into());
    rule.set("matches", ConfigNode::Sequence(vec![matcher]));
    ConfigNode::Sequence(vec![rule])
}

impl SchemaStore {
    /// Schema of the application chart, in strict mode
    pub fn builtin() -> Self {
        let mut s = SchemaStore::new(SchemaMode::Strict);

        s.define(
            "replicaCount",
            FieldSpec::new(FieldType::Integer)
                .default_value(1i64)
                .range(Some(0.0), None)
                .describe("Number of pod replicas when autoscaling is disabled"),
        );

        // Image
        s.define("image", FieldSpec::new(FieldType::Object))
            .define(
                "image.repository",
                FieldSpec::new(FieldType::String)
                    .required()
                    .describe("Container image repository"),
            )
            .define(
                "image.pullPolicy",
                FieldSpec::new(enum_of(&["Always", "IfNotPresent", "Never"]))
                    .default_value("IfNotPresent"),
            )
            .define(
                "image.tag",
                FieldSpec::new(FieldType::String)
                    .default_value("")
                    .describe("Image tag; empty falls back to the chart appVersion"),
            )
            .define("imagePullSecrets", FieldSpec::new(FieldType::Sequence).default_value(empty_list()))
            .define("imagePullSecrets[]", FieldSpec::new(FieldType::Object))
            .define("imagePullSecrets[].name", FieldSpec::new(FieldType::String).required());

        // Naming
        s.define("nameOverride", FieldSpec::new(FieldType::String).default_value(""))
            .define("fullnameOverride", FieldSpec::new(FieldType::String).default_value(""));

        // Service account
        s.define("serviceAccount", FieldSpec::new(FieldType::Object))
            .define(
                "serviceAccount.create",
                FieldSpec::new(FieldType::Boolean).default_value(true),
            )
            .define(
                "serviceAccount.automount",
                FieldSpec::new(FieldType::Boolean).default_value(true),
            )
            .define(
                "serviceAccount.annotations",
                FieldSpec::new(FieldType::Mapping).default_value(empty_map()),
            )
            .define(
                "serviceAccount.name",
                FieldSpec::new(FieldType::String)
                    .default_value("")
                    .describe("Name of the service account; empty generates one from the fullname"),
            );

        // Pod
        s.define("podAnnotations", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define("podLabels", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define("podSecurityContext", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define("securityContext", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define("resources", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define("nodeSelector", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define("tolerations", FieldSpec::new(FieldType::Sequence).default_value(empty_list()))
            .define("affinity", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define(
                "terminationGracePeriod",
                FieldSpec::new(FieldType::Duration)
                    .describe("Grace period before the pod is killed, e.g. 30s"),
            );

        // Service
        s.define("service", FieldSpec::new(FieldType::Object))
            .define(
                "service.type",
                FieldSpec::new(enum_of(&["ClusterIP", "NodePort", "LoadBalancer"]))
                    .default_value("ClusterIP"),
            )
            .define(
                "service.port",
                FieldSpec::new(FieldType::Integer)
                    .default_value(80i64)
                    .range(Some(1.0), Some(65535.0)),
            )
            .define(
                "service.ports",
                FieldSpec::new(FieldType::Sequence)
                    .default_value(empty_list())
                    .describe("Named ports; when empty the single service.port is used"),
            )
            .define("service.ports[]", FieldSpec::new(FieldType::Object))
            .define("service.ports[].name", FieldSpec::new(FieldType::String).required())
            .define(
                "service.ports[].port",
                FieldSpec::new(FieldType::Integer)
                    .required()
                    .range(Some(1.0), Some(65535.0)),
            )
            .define("service.ports[].targetPort", FieldSpec::new(FieldType::IntOrString))
            .define(
                "service.ports[].protocol",
                FieldSpec::new(enum_of(&["TCP", "UDP", "SCTP"])),
            );

        // Ingress
        s.define("ingress", FieldSpec::new(FieldType::Object))
            .define("ingress.enabled", FieldSpec::new(FieldType::Boolean).default_value(false))
            .define("ingress.className", FieldSpec::new(FieldType::String).default_value(""))
            .define("ingress.annotations", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define(
                "ingress.hosts",
                FieldSpec::new(FieldType::Sequence).default_value(example_ingress_hosts()),
            )
            .define("ingress.hosts[]", FieldSpec::new(FieldType::Object))
            .define("ingress.hosts[].host", FieldSpec::new(FieldType::String))
            .define("ingress.hosts[].paths", FieldSpec::new(FieldType::Sequence))
            .define("ingress.hosts[].paths[]", FieldSpec::new(FieldType::Object))
            .define("ingress.hosts[].paths[].path", FieldSpec::new(FieldType::String).required())
            .define(
                "ingress.hosts[].paths[].pathType",
                FieldSpec::new(enum_of(&["Exact", "Prefix", "ImplementationSpecific"])),
            )
            .define("ingress.tls", FieldSpec::new(FieldType::Sequence).default_value(empty_list()))
            .define("ingress.tls[]", FieldSpec::new(FieldType::Object))
            .define("ingress.tls[].secretName", FieldSpec::new(FieldType::String))
            .define("ingress.tls[].hosts", FieldSpec::new(FieldType::Sequence));

        // Gateway API route
        s.define("httpRoute", FieldSpec::new(FieldType::Object))
            .define("httpRoute.enabled", FieldSpec::new(FieldType::Boolean).default_value(false))
            .define("httpRoute.annotations", FieldSpec::new(FieldType::Mapping).default_value(empty_map()))
            .define(
                "httpRoute.parentRefs",
                FieldSpec::new(FieldType::Sequence).default_value(example_parent_refs()),
            )
            .define("httpRoute.parentRefs[]", FieldSpec::new(FieldType::Mapping))
            .define("httpRoute.parentRefs[].name", FieldSpec::new(FieldType::String).required())
            .define(
                "httpRoute.hostnames",
                FieldSpec::new(FieldType::Sequence).default_value(ConfigNode::Sequence(vec![
                    "chart-example.local".into(),
                ])),
            )
            .define("httpRoute.hostnames[]", FieldSpec::new(FieldType::String))
            .define(
                "httpRoute.rules",
                FieldSpec::new(FieldType::Sequence).default_value(example_route_rules()),
            )
            .define("httpRoute.rules[]", FieldSpec::new(FieldType::Mapping));

        // Probes: emitted only when non-empty
        s.define(
            "livenessProbe",
            FieldSpec::new(FieldType::Mapping).default_value(http_get_probe()),
        )
        .define(
            "readinessProbe",
            FieldSpec::new(FieldType::Mapping).default_value(http_get_probe()),
        )
        .define("startupProbe", FieldSpec::new(FieldType::Mapping));

        // Autoscaling
        s.define("autoscaling", FieldSpec::new(FieldType::Object))
            .define("autoscaling.enabled", FieldSpec::new(FieldType::Boolean).default_value(false))
            .define(
                "autoscaling.minReplicas",
                FieldSpec::new(FieldType::Integer)
                    .default_value(1i64)
                    .range(Some(1.0), None),
            )
            .define(
                "autoscaling.maxReplicas",
                FieldSpec::new(FieldType::Integer)
                    .default_value(100i64)
                    .range(Some(1.0), None),
            )
            .define(
                "autoscaling.targetCPUUtilizationPercentage",
                FieldSpec::new(FieldType::Integer)
                    .default_value(80i64)
                    .range(Some(1.0), None),
            )
            .define(
                "autoscaling.targetMemoryUtilizationPercentage",
                FieldSpec::new(FieldType::Integer).range(Some(1.0), None),
            );
        s.add_rule(Rule::Ordered {
            lower: "autoscaling.minReplicas".to_string(),
            upper: "autoscaling.maxReplicas".to_string(),
            when: Some("autoscaling.enabled".to_string()),
        });

        // Volumes
        s.define("volumes", FieldSpec::new(FieldType::Sequence).default_value(empty_list()))
            .define("volumes[]", FieldSpec::new(FieldType::Mapping))
            .define("volumes[].name", FieldSpec::new(FieldType::String).required())
            .define("volumeMounts", FieldSpec::new(FieldType::Sequence).default_value(empty_list()))
            .define("volumeMounts[]", FieldSpec::new(FieldType::Mapping))
            .define("volumeMounts[].name", FieldSpec::new(FieldType::String).required())
            .define("volumeMounts[].mountPath", FieldSpec::new(FieldType::String).required());

        // Environment
        s.define(
            "env",
            FieldSpec::new(FieldType::NamedList {
                key: "name".to_string(),
            })
            .default_value(empty_list())
            .describe("Environment variables; a mapping override upserts by name"),
        )
        .define("env[]", FieldSpec::new(FieldType::Object))
        .define("env[].name", FieldSpec::new(FieldType::String).required())
        .define("env[].value", FieldSpec::new(FieldType::Scalar))
        .define("env[].valueFrom", FieldSpec::new(FieldType::Mapping))
        .define("envFrom", FieldSpec::new(FieldType::Sequence).default_value(empty_list()))
        .define("envFrom[]", FieldSpec::new(FieldType::Object))
        .define("envFrom[].configMapRef", FieldSpec::new(FieldType::Mapping))
        .define("envFrom[].secretRef", FieldSpec::new(FieldType::Mapping))
        .define("envFrom[].prefix", FieldSpec::new(FieldType::String));

        // Init containers
        s.define("initContainers", FieldSpec::new(FieldType::Sequence).default_value(empty_list()))
            .define("initContainers[]", FieldSpec::new(FieldType::Mapping))
            .define("initContainers[].name", FieldSpec::new(FieldType::String).required())
            .define("initContainers[].image", FieldSpec::new(FieldType::String).required());

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Layer, LayerOrigin};

    #[test]
    fn test_builtin_defaults() {
        let defaults = SchemaStore::builtin().defaults_layer();

        assert_eq!(defaults.get("replicaCount").and_then(ConfigNode::as_i64), Some(1));
        assert_eq!(defaults.get("service.port").and_then(ConfigNode::as_i64), Some(80));
        assert_eq!(defaults.get("service.type").and_then(ConfigNode::as_str), Some("ClusterIP"));
        assert_eq!(defaults.get("autoscaling.enabled").and_then(ConfigNode::as_bool), Some(false));
        assert_eq!(defaults.get("ingress.enabled").and_then(ConfigNode::as_bool), Some(false));
        assert_eq!(defaults.get("httpRoute.enabled").and_then(ConfigNode::as_bool), Some(false));
        assert_eq!(
            defaults.get("livenessProbe.httpGet.path").and_then(ConfigNode::as_str),
            Some("/")
        );
        assert!(defaults.get("startupProbe").is_none());
        assert!(defaults.get("image.repository").is_none());
    }

    #[test]
    fn test_builtin_describes_documented_keys() {
        let store = SchemaStore::builtin();
        for path in [
            "replicaCount",
            "image.repository",
            "image.tag",
            "service.type",
            "service.port",
            "service.ports",
            "env",
            "envFrom",
            "initContainers",
            "livenessProbe",
            "readinessProbe",
            "startupProbe",
            "autoscaling.enabled",
            "ingress.enabled",
            "httpRoute.enabled",
        ] {
            assert!(store.describe(path).is_some(), "missing {path}");
        }
    }

    #[test]
    fn test_builtin_defaults_pass_validation_with_repository() {
        let store = SchemaStore::builtin();
        let mut root = store.defaults_layer().into_root();
        root.set("image.repository", "nginx".into());

        store.validate_resolved(&root).unwrap();
        let layer = Layer::new("check", LayerOrigin::Inline, root).unwrap();
        store.check_keys(&layer).unwrap();
    }

    #[test]
    fn test_builtin_json_schema_accepts_defaults() {
        let store = SchemaStore::builtin();
        let mut root = store.defaults_layer().into_root();
        root.set("image.repository", "nginx".into());

        let validator = jsonschema::validator_for(&store.to_json_schema()).unwrap();
        assert!(validator.is_valid(&root.to_json()));
    }
}
