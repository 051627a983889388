//! Service and container ports

use deckhand_core::{ConfigNode, ResolvedConfig};
use k8s_openapi::api::core::v1::{ContainerPort, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::error::{EngineError, Result};
use crate::project::to_i32;

/// IANA service name: at most 15 lowercase alphanumerics or '-', no
/// leading, trailing or doubled '-'
static PORT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,13}[a-z0-9])?$").expect("valid regex"));

const LEGACY_PORT_NAME: &str = "http";

fn is_valid_port_name(name: &str) -> bool {
    PORT_NAME.is_match(name) && !name.contains("--") && name.chars().any(|c| c.is_ascii_lowercase())
}

/// One exposed port
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub name: String,
    pub port: i32,
    pub target_port: IntOrString,
    pub protocol: String,
}

impl PortSpec {
    pub fn to_service_port(&self) -> ServicePort {
        ServicePort {
            name: Some(self.name.clone()),
            port: self.port,
            target_port: Some(self.target_port.clone()),
            protocol: Some(self.protocol.clone()),
            ..Default::default()
        }
    }

    /// The container side of this port: a named target port names the
    /// container port, a numeric one is the container port
    pub fn to_container_port(&self) -> ContainerPort {
        let (name, container_port) = match &self.target_port {
            IntOrString::Int(port) => (self.name.clone(), *port),
            IntOrString::String(name) => (name.clone(), self.port),
        };
        ContainerPort {
            name: Some(name),
            container_port,
            protocol: Some(self.protocol.clone()),
            ..Default::default()
        }
    }
}

/// Ports of the release, in input order
///
/// A non-empty `service.ports` gives one entry per element; otherwise the
/// single `service.port` is exposed as `http`.
pub fn service_ports(config: &ResolvedConfig) -> Result<Vec<PortSpec>> {
    let items = config
        .get("service.ports")
        .and_then(ConfigNode::as_sequence)
        .unwrap_or_default();

    if items.is_empty() {
        let port = config.get_i64("service.port").unwrap_or(80);
        return Ok(vec![PortSpec {
            name: LEGACY_PORT_NAME.to_string(),
            port: to_i32(port, "service.port")?,
            target_port: IntOrString::String(LEGACY_PORT_NAME.to_string()),
            protocol: "TCP".to_string(),
        }]);
    }

    let mut seen = HashSet::new();
    let mut ports = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        let path = format!("service.ports[{}]", i);

        let name = item
            .get("name")
            .and_then(ConfigNode::as_str)
            .ok_or_else(|| EngineError::render(format!("{}.name", path), "port name is required"))?;
        if !is_valid_port_name(name) {
            return Err(EngineError::render_with_help(
                format!("{}.name", path),
                format!("'{}' is not a valid port name", name),
                "use at most 15 lowercase letters, digits or '-'",
            ));
        }
        if !seen.insert(name) {
            return Err(EngineError::render(
                format!("{}.name", path),
                format!("duplicate port name '{}'", name),
            ));
        }

        let port = item
            .get("port")
            .and_then(ConfigNode::as_i64)
            .ok_or_else(|| EngineError::render(format!("{}.port", path), "port number is required"))?;
        let port = to_i32(port, &format!("{}.port", path))?;

        let target_port = match item.get("targetPort") {
            Some(ConfigNode::Integer(n)) => IntOrString::Int(to_i32(*n, &format!("{}.targetPort", path))?),
            Some(ConfigNode::String(s)) => IntOrString::String(s.clone()),
            _ => IntOrString::Int(port),
        };

        let protocol = item
            .get("protocol")
            .and_then(ConfigNode::as_str)
            .unwrap_or("TCP")
            .to_string();

        ports.push(PortSpec {
            name: name.to_string(),
            port,
            target_port,
            protocol,
        });
    }

    Ok(ports)
}

/// Container ports mirroring the service ports; ports that target the same
/// container port name appear once
pub fn container_ports(ports: &[PortSpec]) -> Vec<ContainerPort> {
    let mut seen = HashSet::new();
    ports
        .iter()
        .map(PortSpec::to_container_port)
        .filter(|p| seen.insert(p.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::{Layer, LayerOrigin, OverlayMerger, SchemaStore};

    fn resolve(yaml: &str) -> ResolvedConfig {
        let schema = SchemaStore::builtin();
        OverlayMerger::new(&schema)
            .merge(vec![
                Layer::from_yaml("values.yaml", LayerOrigin::Defaults, "image:\n  repository: nginx\n").unwrap(),
                Layer::from_yaml("release", LayerOrigin::Release, yaml).unwrap(),
            ])
            .unwrap()
    }

    #[test]
    fn test_legacy_single_port() {
        let ports = service_ports(&resolve("service:\n  port: 8080\n")).unwrap();

        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name, "http");
        assert_eq!(ports[0].port, 8080);
        assert_eq!(ports[0].target_port, IntOrString::String("http".to_string()));

        let container = container_ports(&ports);
        assert_eq!(container[0].container_port, 8080);
        assert_eq!(container[0].name.as_deref(), Some("http"));
    }

    #[test]
    fn test_multiple_ports_in_input_order() {
        let ports = service_ports(&resolve(
            r#"
service:
  ports:
    - {name: http, port: 80, targetPort: 8080}
    - {name: grpc, port: 9090, protocol: TCP}
    - {name: metrics, port: 9100, targetPort: prom}
"#,
        ))
        .unwrap();

        let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["http", "grpc", "metrics"]);
        assert_eq!(ports[0].target_port, IntOrString::Int(8080));
        assert_eq!(ports[1].target_port, IntOrString::Int(9090));

        let container = container_ports(&ports);
        assert_eq!(container[0].container_port, 8080);
        assert_eq!(container[2].name.as_deref(), Some("prom"));
        assert_eq!(container[2].container_port, 9100);
    }

    #[test]
    fn test_duplicate_port_names() {
        let err = service_ports(&resolve(
            "service:\n  ports:\n    - {name: http, port: 80}\n    - {name: http, port: 81}\n",
        ))
        .unwrap_err();

        assert!(matches!(err, EngineError::Render { .. }));
        assert_eq!(err.path(), Some("service.ports[1].name"));
    }

    #[test]
    fn test_invalid_port_name() {
        let err = service_ports(&resolve(
            "service:\n  ports:\n    - {name: Web_Port, port: 80}\n",
        ))
        .unwrap_err();
        assert_eq!(err.path(), Some("service.ports[0].name"));

        assert!(is_valid_port_name("http-alt"));
        assert!(!is_valid_port_name("a--b"));
        assert!(!is_valid_port_name("8080"));
        assert!(!is_valid_port_name("much-too-long-name"));
    }
}
