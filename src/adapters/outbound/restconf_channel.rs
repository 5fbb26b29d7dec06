//! RESTCONF Switch Channel
//!
//! Implements SwitchChannel on top of a network-management controller's
//! RESTCONF API (opendaylight-inventory model). Flows and groups are written
//! to the config datastore, counters are read from the operational datastore
//! and packet-outs go through the transmit-packet RPC.

use super::restconf_body::{FlowEnvelope, GroupEnvelope, NodeConnectorEnvelope, TransmitPacket};
use crate::domain::entities::{FlowRule, GroupRule, PacketPayload, PortCounterSample};
use crate::domain::errors::SouthboundError;
use crate::domain::ports::SwitchChannel;
use crate::domain::value_objects::{DatapathId, PortNo};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Connection settings for the management API.
#[derive(Debug, Clone)]
pub struct RestconfConfig {
    /// Base URL up to and including `/restconf`
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Per-request deadline; expiry is reported as [`SouthboundError::Timeout`]
    pub timeout: Duration,
}

impl Default for RestconfConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8181/restconf".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

pub struct RestconfSwitchChannel {
    config: RestconfConfig,
    client: reqwest::Client,
}

impl RestconfSwitchChannel {
    pub fn new(config: RestconfConfig) -> Result<Self, SouthboundError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SouthboundError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn node_path(&self, datastore: &str, dpid: DatapathId) -> String {
        format!(
            "{}/{}/opendaylight-inventory:nodes/node/{}",
            self.base(),
            datastore,
            dpid.node_name()
        )
    }

    fn flow_url(&self, dpid: DatapathId, rule: &FlowRule) -> String {
        format!(
            "{}/flow-node-inventory:table/{}/flow/{}",
            self.node_path("config", dpid),
            rule.table_id,
            rule.rule_id.wire_id()
        )
    }

    fn group_url(&self, dpid: DatapathId, group: &GroupRule) -> String {
        format!(
            "{}/flow-node-inventory:group/{}",
            self.node_path("config", dpid),
            group.group_id
        )
    }

    fn connector_url(&self, dpid: DatapathId, port: PortNo) -> String {
        format!(
            "{}/node-connector/{}:{}",
            self.node_path("operational", dpid),
            dpid.node_name(),
            port.connector_suffix()
        )
    }

    fn transmit_url(&self) -> String {
        format!("{}/operations/packet-processing:transmit-packet", self.base())
    }

    /// Send a request and turn non-2xx replies into `Rejected`.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, SouthboundError> {
        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SouthboundError::Rejected { status, body });
        }

        Ok(response)
    }
}

fn transport_error(e: reqwest::Error) -> SouthboundError {
    if e.is_timeout() {
        SouthboundError::Timeout
    } else {
        SouthboundError::Transport(e.to_string())
    }
}

#[async_trait]
impl SwitchChannel for RestconfSwitchChannel {
    async fn install_flow(&self, dpid: DatapathId, rule: &FlowRule) -> Result<(), SouthboundError> {
        let url = self.flow_url(dpid, rule);
        let body = FlowEnvelope::new(dpid, rule);
        self.send(Method::PUT, &url, Some(&body)).await?;
        tracing::debug!("restconf flow put: {}", url);
        Ok(())
    }

    async fn install_group(
        &self,
        dpid: DatapathId,
        group: &GroupRule,
    ) -> Result<(), SouthboundError> {
        let url = self.group_url(dpid, group);
        let body = GroupEnvelope::new(group);
        self.send(Method::PUT, &url, Some(&body)).await?;
        tracing::debug!("restconf group put: {}", url);
        Ok(())
    }

    async fn send_packet_out(
        &self,
        dpid: DatapathId,
        payload: PacketPayload,
        in_port: PortNo,
        out_port: PortNo,
    ) -> Result<(), SouthboundError> {
        let body = TransmitPacket::new(dpid, &payload, in_port, out_port);
        self.send(Method::POST, &self.transmit_url(), Some(&body))
            .await?;
        Ok(())
    }

    async fn query_port_counters(
        &self,
        dpid: DatapathId,
        port: PortNo,
    ) -> Result<PortCounterSample, SouthboundError> {
        let url = self.connector_url(dpid, port);
        let response = match self.send::<()>(Method::GET, &url, None).await {
            Err(SouthboundError::Rejected { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                return Err(SouthboundError::UnknownSwitch(dpid));
            }
            other => other?,
        };

        let doc: NodeConnectorEnvelope = response
            .json()
            .await
            .map_err(|e| SouthboundError::Decode(e.to_string()))?;
        let bytes_transmitted = doc.bytes_transmitted().map_err(SouthboundError::Decode)?;

        Ok(PortCounterSample {
            dpid,
            port,
            bytes_transmitted,
            timestamp: Instant::now(),
        })
    }
}
