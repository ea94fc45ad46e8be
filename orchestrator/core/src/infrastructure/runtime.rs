// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::runtime::{
    ContainerRuntime, ExecOutput, NetworkInfo, NetworkSpec, RemoveStatus, RuntimeError, StopStatus,
};
use crate::domain::service::ServiceDescriptor;
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, NetworkingConfig,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointIpamConfig, EndpointSettings, HostConfig, Ipam, IpamConfig, PortBinding};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use futures::StreamExt;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Seconds a container gets to exit after SIGTERM before it is killed.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Container runtime reached over the Docker-compatible API, which both
/// Docker and Podman's API socket serve.
pub struct DockerRuntime {
    docker: Docker,
}

fn status_code(error: &bollard::errors::Error) -> Option<u16> {
    match error {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn is_not_found(error: &bollard::errors::Error) -> bool {
    status_code(error) == Some(404)
}

impl DockerRuntime {
    pub fn new(socket_path: Option<String>) -> Result<Self, RuntimeError> {
        // Connect to the runtime (custom socket or auto-detect)
        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(&path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| RuntimeError::Connection(format!(
                "Failed to connect to container runtime at {}: {}\n\n\
                 Ensure the API socket is running:\n\
                 - Podman: systemctl --user start podman.socket\n\
                 - Docker: systemctl start docker",
                path, e
            )))?
        } else {
            Docker::connect_with_local_defaults()
                .map_err(|e| RuntimeError::Connection(format!(
                    "Failed to connect to container runtime: {}\n\n\
                     Set CONTAINER_SOCKET to the runtime's API socket, for example\n\
                     /run/user/$UID/podman/podman.sock",
                    e
                )))?
        };

        Ok(Self { docker })
    }

    /// Verify the runtime is accessible
    pub async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await
            .map_err(|e| RuntimeError::Connection(format!(
                "Cannot connect to container runtime: {}\n\n\
                 Verify with: podman info (or docker ps)",
                e
            )))?;
        Ok(())
    }

    async fn pull_if_missing(&self, service: &ServiceDescriptor) -> Result<(), RuntimeError> {
        let image = &service.image;
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!("Pulling image: {}", image);
        let options = Some(CreateImageOptions {
            from_image: image.clone(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                return Err(RuntimeError::StartFailed {
                    name: service.name.clone(),
                    message: format!(
                        "Failed to pull image {}: {}\n\n\
                         Common causes:\n\
                         - No connectivity to the image registry\n\
                         - Image name or tag is incorrect\n\
                         - Registry authentication required\n\n\
                         Try manually: podman pull {}",
                        image, e, image
                    ),
                });
            }
        }
        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    fn container_config(service: &ServiceDescriptor) -> Config<String> {
        let mut port_bindings = HashMap::new();
        let mut exposed_ports = HashMap::new();
        for port in &service.ports {
            let key = format!("{}/tcp", port.container);
            port_bindings.insert(
                key.clone(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(port.host.to_string()),
                }]),
            );
            exposed_ports.insert(key, HashMap::new());
        }

        let host_config = HostConfig {
            binds: Some(service.mounts.iter().map(|m| m.to_bind()).collect()),
            port_bindings: Some(port_bindings),
            network_mode: Some(service.network.clone()),
            ..Default::default()
        };

        let endpoint = EndpointSettings {
            ipam_config: service.address.map(|addr| EndpointIpamConfig {
                ipv4_address: Some(addr.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        Config {
            image: Some(service.image.clone()),
            env: Some(
                service
                    .environment
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            ),
            cmd: if service.command.is_empty() {
                None
            } else {
                Some(service.command.clone())
            },
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            networking_config: Some(NetworkingConfig {
                endpoints_config: HashMap::from([(service.network.clone(), endpoint)]),
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkInfo>, RuntimeError> {
        match self.docker.inspect_network(name, None::<InspectNetworkOptions<String>>).await {
            Ok(network) => {
                let subnets = network
                    .ipam
                    .and_then(|ipam| ipam.config)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|c| c.subnet)
                    .collect();
                Ok(Some(NetworkInfo {
                    name: network.name.unwrap_or_else(|| name.to_string()),
                    subnets,
                }))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(RuntimeError::NetworkFailed {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), RuntimeError> {
        let ipam = Ipam {
            config: spec.subnet.as_ref().map(|subnet| {
                vec![IpamConfig {
                    subnet: Some(subnet.clone()),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        };

        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: "bridge".to_string(),
            ipam,
            ..Default::default()
        };

        self.docker.create_network(options).await
            .map_err(|e| RuntimeError::NetworkFailed {
                name: spec.name.clone(),
                message: e.to_string(),
            })?;

        info!("Created network: {}", spec.name);
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<RemoveStatus, RuntimeError> {
        match self.docker.remove_network(name).await {
            Ok(()) => {
                info!("Removed network: {}", name);
                Ok(RemoveStatus::Removed)
            }
            Err(e) if is_not_found(&e) => Ok(RemoveStatus::Absent),
            Err(e) => Err(RuntimeError::NetworkFailed {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn run(&self, service: &ServiceDescriptor) -> Result<(), RuntimeError> {
        self.pull_if_missing(service).await?;

        // Replace any container left by an earlier run
        if let RemoveStatus::Removed = self.remove(&service.name).await? {
            debug!("Replaced existing container: {}", service.name);
        }

        let options = CreateContainerOptions {
            name: service.name.clone(),
            platform: None,
        };

        self.docker.create_container(Some(options), Self::container_config(service)).await
            .map_err(|e| RuntimeError::StartFailed {
                name: service.name.clone(),
                message: e.to_string(),
            })?;

        self.docker.start_container(&service.name, None::<StartContainerOptions<String>>).await
            .map_err(|e| RuntimeError::StartFailed {
                name: service.name.clone(),
                message: format!("Failed to start container: {}", e),
            })?;

        info!("Started container: {}", service.name);
        Ok(())
    }

    async fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, RuntimeError> {
        let execution_failed = |e: bollard::errors::Error| RuntimeError::ExecutionFailed {
            name: container.to_string(),
            message: e.to_string(),
        };

        let exec_config = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(command.to_vec()),
            ..Default::default()
        };

        let exec = self.docker.create_exec(container, exec_config).await
            .map_err(execution_failed)?;

        let start_opts = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let res = self.docker.start_exec(&exec.id, Some(start_opts)).await
            .map_err(execution_failed)?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = res {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        // Get exit code from exec
        let exec_inspect = self.docker.inspect_exec(&exec.id).await
            .map_err(execution_failed)?;

        Ok(ExecOutput {
            exit_code: exec_inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn stop(&self, container: &str) -> Result<StopStatus, RuntimeError> {
        let options = StopContainerOptions { t: STOP_TIMEOUT_SECS };
        match self.docker.stop_container(container, Some(options)).await {
            Ok(()) => {
                info!("Stopped container: {}", container);
                Ok(StopStatus::Stopped)
            }
            Err(e) if status_code(&e) == Some(304) => Ok(StopStatus::AlreadyStopped),
            Err(e) if is_not_found(&e) => Ok(StopStatus::Absent),
            Err(e) => Err(RuntimeError::TerminationFailed {
                name: container.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn remove(&self, container: &str) -> Result<RemoveStatus, RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(container, Some(options)).await {
            Ok(()) => {
                info!("Removed container: {}", container);
                Ok(RemoveStatus::Removed)
            }
            Err(e) if is_not_found(&e) => Ok(RemoveStatus::Absent),
            Err(e) => Err(RuntimeError::TerminationFailed {
                name: container.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn address(&self, container: &str, network: &str) -> Result<Option<Ipv4Addr>, RuntimeError> {
        let inspect = match self.docker.inspect_container(container, None::<InspectContainerOptions>).await {
            Ok(inspect) => inspect,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => {
                return Err(RuntimeError::InspectFailed {
                    name: container.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let address = inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .and_then(|mut networks| networks.remove(network))
            .and_then(|endpoint| endpoint.ip_address)
            .and_then(|ip| ip.parse::<Ipv4Addr>().ok());
        Ok(address)
    }

    async fn state(&self, container: &str) -> Result<Option<String>, RuntimeError> {
        match self.docker.inspect_container(container, None::<InspectContainerOptions>).await {
            Ok(inspect) => {
                let state = inspect
                    .state
                    .and_then(|s| s.status)
                    .unwrap_or(bollard::models::ContainerStateStatusEnum::DEAD);
                Ok(Some(format!("{:?}", state).to_lowercase()))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(RuntimeError::InspectFailed {
                name: container.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{Mount, PortMapping, Readiness, RestartPolicy, ServiceKind};
    use std::collections::BTreeMap;

    fn service() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "quay-registry".to_string(),
            kind: ServiceKind::Application,
            description: "Container registry".to_string(),
            image: "quay.io/projectquay/quay:v3.12.0".to_string(),
            network: "app-net".to_string(),
            address: Some(Ipv4Addr::new(10, 90, 0, 12)),
            ports: vec![PortMapping { host: 80, container: 8080 }],
            mounts: vec![Mount::read_write("/srv/quay/config", "/conf/stack")],
            environment: BTreeMap::from([("A".to_string(), "1".to_string())]),
            command: Vec::new(),
            depends_on: Vec::new(),
            restart: RestartPolicy::Always,
            auto_start: true,
            readiness: Readiness::SettleOnly,
            post_ready: Vec::new(),
        }
    }

    #[test]
    fn test_container_config_carries_network_address_and_ports() {
        let config = DockerRuntime::container_config(&service());

        let host = config.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("app-net"));
        assert_eq!(host.binds.unwrap(), vec!["/srv/quay/config:/conf/stack:Z".to_string()]);
        let binding = host.port_bindings.unwrap().remove("8080/tcp").unwrap().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("80"));

        let endpoint = config
            .networking_config
            .unwrap()
            .endpoints_config
            .remove("app-net")
            .unwrap();
        assert_eq!(
            endpoint.ipam_config.unwrap().ipv4_address.as_deref(),
            Some("10.90.0.12")
        );
        assert_eq!(config.env.unwrap(), vec!["A=1".to_string()]);
        assert!(config.cmd.is_none());
    }
}
