//! Local daemon backend.
//!
//! Images known to the local daemon are read either through the native API
//! (via `bollard`) or by shelling out to the CLI client. Which one is used is
//! decided by a single probe when the backend is constructed: if the daemon
//! is unreachable or speaks an older API version than the client, or if the
//! caller asked for it, the CLI client is used. Both paths produce the same
//! [`ImageMetadata`] and the same `save`-format archive.

use super::tarball::{extract_archive, root_from_extracted};
use super::{AcquireOptions, BackendPreference, Workdir};
use crate::error::AcquireError;
use crate::image::ImageMetadata;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// The capability chosen by the probe.
pub enum DaemonClient {
    Api(Docker),
    Cli(CliClient),
}

/// Shell-out client (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct CliClient {
    binary: String,
}

pub struct DaemonBackend {
    image: String,
    client: DaemonClient,
}

impl DaemonBackend {
    /// Probes the daemon and fixes the client for this acquisition.
    pub async fn connect(image: &str, options: &AcquireOptions) -> Self {
        Self::with_client(image, DaemonClient::probe(options).await)
    }

    pub fn with_client(image: &str, client: DaemonClient) -> Self {
        Self {
            image: image.to_string(),
            client,
        }
    }

    pub fn client(&self) -> &DaemonClient {
        &self.client
    }

    pub async fn acquire_metadata(&self) -> Result<ImageMetadata, AcquireError> {
        self.client.resolve_local_image(&self.image).await
    }

    pub async fn materialize_filesystem(
        &self,
        workdir: &Workdir,
        rootfs: &Path,
    ) -> Result<PathBuf, AcquireError> {
        let archive = workdir.path().join("image.tar");
        self.client.export_image(&self.image, &archive).await?;

        let extracted = extract_archive(workdir, &archive).await?;
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            debug!(error = %e, "Could not remove exported archive");
        }

        let rootfs = rootfs.to_path_buf();
        workdir
            .run_blocking(&self.image, move || root_from_extracted(&extracted, &rootfs))
            .await
    }
}

impl DaemonClient {
    /// Chooses between the native API and the CLI client.
    pub async fn probe(options: &AcquireOptions) -> Self {
        let cli = DaemonClient::Cli(CliClient::new(&options.client_binary));
        if options.backend == BackendPreference::Cli {
            debug!(binary = %options.client_binary, "Using CLI client by request");
            return cli;
        }

        let docker = match Docker::connect_with_local_defaults() {
            Ok(docker) => docker,
            Err(e) => {
                warn!(error = %e, "Could not connect to the Docker daemon, shelling out to local client");
                return cli;
            }
        };

        match docker.version().await {
            Ok(version) if api_version_compatible(version.api_version.as_deref()) => {
                debug!(api_version = ?version.api_version, "Using Docker API");
                DaemonClient::Api(docker)
            }
            Ok(version) => {
                info!(
                    api_version = ?version.api_version,
                    "Docker version incompatible with api, shelling out to local Docker client"
                );
                cli
            }
            Err(e) => {
                warn!(error = %e, "Docker version probe failed, shelling out to local client");
                cli
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DaemonClient::Api(_) => "daemon-api",
            DaemonClient::Cli(_) => "daemon-cli",
        }
    }

    /// Reads env, history (oldest first) and layer ids of a local image.
    pub async fn resolve_local_image(&self, id: &str) -> Result<ImageMetadata, AcquireError> {
        match self {
            DaemonClient::Api(docker) => {
                let inspect = docker
                    .inspect_image(id)
                    .await
                    .map_err(|e| AcquireError::daemon(id, e))?;
                let history = docker
                    .image_history(id)
                    .await
                    .map_err(|e| AcquireError::daemon(id, e))?;

                Ok(ImageMetadata {
                    env: inspect.config.and_then(|c| c.env).unwrap_or_default(),
                    history: history
                        .into_iter()
                        .rev()
                        .map(|item| item.created_by.trim().to_string())
                        .collect(),
                    layers: inspect.root_fs.and_then(|r| r.layers).unwrap_or_default(),
                    diagnostics: Vec::new(),
                })
            }
            DaemonClient::Cli(cli) => cli.resolve_local_image(id).await,
        }
    }

    /// Writes the image in `save` format to `dest`.
    pub async fn export_image(&self, id: &str, dest: &Path) -> Result<(), AcquireError> {
        match self {
            DaemonClient::Api(docker) => {
                let label = dest.display().to_string();
                let mut file = tokio::fs::File::create(dest)
                    .await
                    .map_err(|e| AcquireError::io(&label, e))?;
                let mut stream = std::pin::pin!(docker.export_image(id));
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| AcquireError::daemon(id, e))?;
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| AcquireError::io(&label, e))?;
                }
                file.flush().await.map_err(|e| AcquireError::io(&label, e))
            }
            DaemonClient::Cli(cli) => cli.export_image(id, dest).await,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CliInspect {
    #[serde(default)]
    config: Option<CliConfig>,
    #[serde(rename = "RootFS", default)]
    root_fs: Option<CliRootFs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CliConfig {
    #[serde(default)]
    env: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CliRootFs {
    #[serde(default)]
    layers: Option<Vec<String>>,
}

impl CliClient {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, AcquireError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %command, "Running client command");

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AcquireError::ClientCommand {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(AcquireError::ClientCommand {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    pub async fn resolve_local_image(&self, id: &str) -> Result<ImageMetadata, AcquireError> {
        let inspect = self.run(&["image", "inspect", id]).await?;
        let history = self
            .run(&["history", "--no-trunc", "--format", "{{.CreatedBy}}", id])
            .await?;

        let (env, layers) = parse_inspect_output(&inspect, id)?;
        Ok(ImageMetadata {
            env,
            history: parse_history_output(&String::from_utf8_lossy(&history)),
            layers,
            diagnostics: Vec::new(),
        })
    }

    pub async fn export_image(&self, id: &str, dest: &Path) -> Result<(), AcquireError> {
        let dest = dest.to_string_lossy();
        self.run(&["save", "-o", dest.as_ref(), id]).await.map(|_| ())
    }
}

/// Parses `image inspect` output into (env, layers).
pub fn parse_inspect_output(
    output: &[u8],
    id: &str,
) -> Result<(Vec<String>, Vec<String>), AcquireError> {
    let inspected: Vec<CliInspect> =
        serde_json::from_slice(output).map_err(|source| AcquireError::InvalidConfig {
            origin: format!("inspect output for {}", id),
            source,
        })?;
    let first = inspected
        .into_iter()
        .next()
        .ok_or_else(|| AcquireError::daemon(id, "image inspect returned no entries"))?;

    Ok((
        first.config.and_then(|c| c.env).unwrap_or_default(),
        first.root_fs.and_then(|r| r.layers).unwrap_or_default(),
    ))
}

/// Parses `history --format {{.CreatedBy}}` output. The client lists the
/// newest step first; the result is in build order.
pub fn parse_history_output(output: &str) -> Vec<String> {
    output.lines().rev().map(|line| line.trim().to_string()).collect()
}

/// Parses a `major.minor` API version string.
pub fn parse_api_version(version: &str) -> Option<(usize, usize)> {
    let (major, minor) = version.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// True when the server speaks at least the client's default API version.
pub fn api_version_compatible(server: Option<&str>) -> bool {
    let Some(server) = server.and_then(parse_api_version) else {
        return false;
    };
    server
        >= (
            API_DEFAULT_VERSION.major_version,
            API_DEFAULT_VERSION.minor_version,
        )
}
