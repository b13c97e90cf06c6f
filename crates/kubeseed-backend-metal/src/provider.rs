//! Bare-metal device backend
//!
//! Talks to the provider's device API over JSON HTTP. The provider manages
//! network plumbing itself, so network reconciliation resolves to synthetic
//! identifiers here, as it does for local virtualization; nodes become
//! reachable on their provider-assigned addresses.

use crate::api::{Device, DeviceCreateRequest, DeviceList, DeviceUpdateRequest};
use async_trait::async_trait;
use kubeseed_backend::{
    retry, BackendAdapter, BackendError, NetworkResourceSet, NodeDescription, NodeSpec,
    ProvenanceTag, ResourceKind, Result, RetryConfig,
};
use reqwest::StatusCode;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "https://api.equinix.com/metal/v1";

/// Connection settings, constructed at the process edge.
#[derive(Debug, Clone)]
pub struct MetalConfig {
    pub api_token: String,
    pub project_id: String,
    pub base_url: String,

    /// Device size, e.g. "c3.small.x86".
    pub plan: String,
}

impl MetalConfig {
    pub fn new(api_token: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            project_id: project_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            plan: "c3.small.x86".to_string(),
        }
    }
}

pub struct MetalBackend {
    config: MetalConfig,
    client: reqwest::Client,
    retry: RetryConfig,
}

/// Encode a provenance tag as the provider's flat tag strings.
fn tag_strings(tag: &ProvenanceTag) -> Vec<String> {
    vec![
        format!("provisioned-by:{}", tag.provisioned_by),
        format!("created-by:{}", tag.created_by),
    ]
}

fn carries_tag(device: &Device, tag: &ProvenanceTag) -> bool {
    tag_strings(tag).iter().all(|t| device.tags.contains(t))
}

fn classify_status(status: StatusCode, body: String) -> BackendError {
    if status == StatusCode::NOT_FOUND {
        BackendError::NotFound(body)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        BackendError::Transient(format!("{}: {}", status, body))
    } else {
        BackendError::Terminal(format!("{}: {}", status, body))
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transient(err.to_string())
}

impl MetalBackend {
    pub fn new(config: MetalConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            retry: RetryConfig::default(),
        }
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }

    async fn get_device(&self, id: &str) -> Result<Device> {
        let url = format!("{}/devices/{}", self.config.base_url, id);
        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.config.api_token)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check_response(response).await?;
        response.json::<Device>().await.map_err(transport)
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = format!(
            "{}/projects/{}/devices",
            self.config.base_url, self.config.project_id
        );
        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.config.api_token)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check_response(response).await?;
        let list = response.json::<DeviceList>().await.map_err(transport)?;
        Ok(list.devices)
    }
}

#[async_trait]
impl BackendAdapter for MetalBackend {
    fn name(&self) -> &str {
        "metal"
    }

    async fn create_node(&self, spec: &NodeSpec) -> Result<String> {
        let url = format!(
            "{}/projects/{}/devices",
            self.config.base_url, self.config.project_id
        );
        let body = DeviceCreateRequest {
            hostname: spec.hostname.clone(),
            plan: if spec.instance_class.is_empty() {
                self.config.plan.clone()
            } else {
                spec.instance_class.clone()
            },
            operating_system: spec.image.clone(),
            facility: spec.region.clone(),
            billing_cycle: "hourly".to_string(),
            tags: Vec::new(),
        };

        // Throttling on create is common enough to warrant the bounded
        // retry; validation errors surface immediately.
        let device = retry(&self.retry, || async {
            let response = self
                .client
                .post(&url)
                .header("X-Auth-Token", &self.config.api_token)
                .json(&body)
                .send()
                .await
                .map_err(transport)?;
            let response = Self::check_response(response).await?;
            response.json::<Device>().await.map_err(transport)
        })
        .await?;

        info!(id = %device.id, hostname = %spec.hostname, "device accepted");
        Ok(device.id)
    }

    async fn describe_node(&self, id: &str) -> Result<NodeDescription> {
        let device = self.get_device(id).await?;
        Ok(NodeDescription {
            private_address: device.private_ipv4().map(str::to_string),
            public_address: device.public_ipv4().map(str::to_string),
            private_dns_name: Some(device.hostname.clone()),
            ssh_user: Some("root".to_string()),
        })
    }

    async fn delete_node(&self, id: &str) -> Result<()> {
        let url = format!("{}/devices/{}", self.config.base_url, id);
        let response = self
            .client
            .delete(&url)
            .header("X-Auth-Token", &self.config.api_token)
            .send()
            .await
            .map_err(transport)?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn tag_resource(&self, id: &str, tag: &ProvenanceTag) -> Result<()> {
        let device = self.get_device(id).await?;
        let mut tags = device.tags;
        for t in tag_strings(tag) {
            if !tags.contains(&t) {
                tags.push(t);
            }
        }
        let url = format!("{}/devices/{}", self.config.base_url, id);
        let response = self
            .client
            .put(&url)
            .header("X-Auth-Token", &self.config.api_token)
            .json(&DeviceUpdateRequest { tags })
            .send()
            .await
            .map_err(transport)?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn disable_source_dest_check(&self, _id: &str) -> Result<()> {
        // Bare metal has no hypervisor-level address check.
        Ok(())
    }

    async fn find_resource_by_tag(
        &self,
        kind: ResourceKind,
        _tag: &ProvenanceTag,
        _graph: &NetworkResourceSet,
    ) -> Result<Option<String>> {
        Ok(Some(format!("provider-managed-{}", kind)))
    }

    async fn create_network_resource(
        &self,
        kind: ResourceKind,
        _graph: &NetworkResourceSet,
    ) -> Result<String> {
        Ok(format!("provider-managed-{}", kind))
    }

    async fn delete_network_resource(&self, _kind: ResourceKind, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn list_nodes_by_tag(&self, tag: &ProvenanceTag) -> Result<Vec<String>> {
        let devices = self.list_devices().await?;
        Ok(devices
            .into_iter()
            .filter(|d| d.is_live() && carries_tag(d, tag))
            .map(|d| d.id)
            .collect())
    }
}
