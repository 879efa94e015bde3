//! Mapping between bollard models and the runtime-independent types.

use std::collections::HashMap;

use bollard::{
    errors::Error as BollardError,
    query_parameters::{AttachContainerOptions, AttachContainerOptionsBuilder},
    models::{
        ContainerCreateBody, ContainerInspectResponse, ContainerSummary as DockerSummary,
        HostConfig, PortBinding as DockerPortBinding,
    },
};

use berth_core::{CreateRequest, RuntimeError};
use berth_model::{ContainerDetails, ContainerState, ContainerSummary, PortBinding};

/// Live stdio attachment that first replays output written before attaching.
pub(crate) fn attach_options() -> AttachContainerOptions {
    AttachContainerOptionsBuilder::new()
        .logs(true)
        .stream(true)
        .stdin(true)
        .stdout(true)
        .stderr(true)
        .build()
}

pub(crate) fn create_body(request: &CreateRequest) -> ContainerCreateBody {
    let mut port_bindings: HashMap<String, Option<Vec<DockerPortBinding>>> = HashMap::new();
    for p in &request.published {
        port_bindings
            .entry(p.container.clone())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(DockerPortBinding {
                host_ip: Some(p.host_ip.clone()),
                host_port: Some(p.host_port.to_string()),
            });
    }

    let host_config = HostConfig {
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        binds: (!request.binds.is_empty()).then(|| request.binds.clone()),
        ..HostConfig::default()
    };

    ContainerCreateBody {
        image: Some(request.image.clone()),
        labels: (!request.labels.is_empty()).then(|| request.labels.clone()),
        exposed_ports: (!request.exposed_ports.is_empty()).then(|| request.exposed_ports.clone()),
        attach_stdin: Some(request.interactive),
        attach_stdout: Some(request.interactive),
        attach_stderr: Some(request.interactive),
        open_stdin: Some(request.interactive),
        tty: Some(request.tty),
        host_config: Some(host_config),
        ..ContainerCreateBody::default()
    }
}

fn parse_state(raw: Option<String>) -> Option<ContainerState> {
    raw.and_then(|s| s.parse().ok())
}

pub(crate) fn summary(raw: DockerSummary) -> ContainerSummary {
    ContainerSummary {
        id: raw.id.unwrap_or_default(),
        names: raw.names.unwrap_or_default(),
        labels: raw.labels.unwrap_or_default(),
        state: parse_state(raw.state.as_ref().map(|s| s.to_string())),
        image: raw.image,
    }
}

pub(crate) fn details(raw: ContainerInspectResponse) -> ContainerDetails {
    let state = raw.state.as_ref();
    let ports = raw
        .network_settings
        .as_ref()
        .and_then(|n| n.ports.as_ref())
        .map(|map| {
            let mut out = Vec::new();
            for (key, bindings) in map {
                let Some(container_port) = key.split('/').next().and_then(|p| p.parse().ok())
                else {
                    continue;
                };
                for b in bindings.iter().flatten() {
                    if let Some(host_port) = b.host_port.as_deref().and_then(|p| p.parse().ok()) {
                        out.push(PortBinding {
                            container_port,
                            host_port,
                        });
                    }
                }
            }
            out.sort_by_key(|p| (p.container_port, p.host_port));
            out
        })
        .unwrap_or_default();

    ContainerDetails {
        id: raw.id.clone().unwrap_or_default(),
        name: raw.name.clone().unwrap_or_default(),
        state: parse_state(state.and_then(|s| s.status.as_ref()).map(|s| s.to_string())),
        running: state.and_then(|s| s.running).unwrap_or(false),
        exit_code: state.and_then(|s| s.exit_code),
        ports,
    }
}

/// Wrap a bollard failure with the operation and the object it targeted.
pub(crate) fn runtime_error(op: &'static str, target: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::not_found(target),
        BollardError::DockerResponseServerError {
            status_code: 409, ..
        } if op == "create" => RuntimeError::Conflict {
            target: target.to_string(),
        },
        other => RuntimeError::api(op, target, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::PublishedPort;
    use berth_model::{ImageRef, Mount};
    use bollard::models::{ContainerState as DockerState, ContainerStateStatusEnum, NetworkSettings};

    #[test]
    fn attach_replays_earlier_output() {
        let opts = attach_options();
        assert!(opts.logs && opts.stream);
        assert!(opts.stdin && opts.stdout && opts.stderr);
    }

    #[test]
    fn create_body_maps_ports_binds_and_stdio() {
        let mut req = CreateRequest::new("web", &ImageRef::new("nginx", "1.27"));
        req.exposed_ports = vec!["80/tcp".into()];
        req.published = vec![PublishedPort {
            container: "80/tcp".into(),
            host_ip: "0.0.0.0".into(),
            host_port: 8080,
        }];
        let mount = Mount::new("/srv/web", "/web");
        req.binds = vec![mount.bind_spec()];
        req.mounts = vec![mount];

        let body = create_body(&req);
        assert_eq!(body.image.as_deref(), Some("nginx:1.27"));
        assert_eq!(body.exposed_ports, Some(vec!["80/tcp".to_string()]));
        assert_eq!(body.tty, Some(true));
        assert_eq!(body.open_stdin, Some(true));
        assert!(body.labels.is_none());

        let host = body.host_config.unwrap();
        assert_eq!(host.binds, Some(vec!["/srv/web:/web".to_string()]));
        let bindings = host.port_bindings.unwrap();
        let b = bindings["80/tcp"].as_ref().unwrap();
        assert_eq!(b[0].host_ip.as_deref(), Some("0.0.0.0"));
        assert_eq!(b[0].host_port.as_deref(), Some("8080"));
    }

    #[test]
    fn details_reads_state_and_ports() {
        let mut ports = HashMap::new();
        ports.insert(
            "80/tcp".to_string(),
            Some(vec![DockerPortBinding {
                host_ip: Some("0.0.0.0".into()),
                host_port: Some("8080".into()),
            }]),
        );
        ports.insert("443/tcp".to_string(), None);

        let raw = ContainerInspectResponse {
            id: Some("abc".into()),
            name: Some("/web".into()),
            state: Some(DockerState {
                status: Some(ContainerStateStatusEnum::RUNNING),
                running: Some(true),
                exit_code: Some(0),
                ..DockerState::default()
            }),
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ..NetworkSettings::default()
            }),
            ..ContainerInspectResponse::default()
        };

        let d = details(raw);
        assert_eq!(d.id, "abc");
        assert_eq!(d.state, Some(ContainerState::Running));
        assert!(d.running);
        assert_eq!(
            d.ports,
            vec![PortBinding {
                container_port: 80,
                host_port: 8080
            }]
        );
    }

    #[test]
    fn summary_tolerates_missing_fields() {
        let s = summary(DockerSummary {
            id: Some("abc".into()),
            names: Some(vec!["/web".into()]),
            ..DockerSummary::default()
        });
        assert_eq!(s.display_name(), Some("web"));
        assert!(s.labels.is_empty());
        assert_eq!(s.state, None);
    }

    #[test]
    fn server_errors_map_to_kinds() {
        let missing = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "no such container".into(),
        };
        assert!(runtime_error("inspect", "abc", missing).is_not_found());

        let taken = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "name in use".into(),
        };
        assert!(matches!(
            runtime_error("create", "web", taken),
            RuntimeError::Conflict { .. }
        ));

        let other = BollardError::DockerResponseServerError {
            status_code: 500,
            message: "boom".into(),
        };
        assert!(matches!(
            runtime_error("start", "web", other),
            RuntimeError::Api { op: "start", .. }
        ));
    }
}
