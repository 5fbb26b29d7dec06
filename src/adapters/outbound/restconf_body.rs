//! RESTCONF wire bodies for the opendaylight-inventory model.
//!
//! Every scalar is written as a JSON string, and struct field order is the
//! order the management API documents. Absent match fields are omitted.

use crate::domain::entities::{Action, FlowMatch, FlowRule, GroupRule, GroupType, PacketPayload};
use crate::domain::value_objects::{DatapathId, PortNo};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct FlowEnvelope {
    flow: Vec<FlowBody>,
}

#[derive(Debug, Serialize)]
struct FlowBody {
    id: String,
    #[serde(rename = "match")]
    flow_match: MatchBody,
    instructions: Instructions,
    priority: String,
    #[serde(rename = "hard-timeout", skip_serializing_if = "Option::is_none")]
    hard_timeout: Option<String>,
    cookie: String,
    table_id: String,
}

#[derive(Debug, Default, Serialize)]
struct MatchBody {
    #[serde(rename = "in-port", skip_serializing_if = "Option::is_none")]
    in_port: Option<String>,
    #[serde(rename = "ethernet-match", skip_serializing_if = "Option::is_none")]
    ethernet_match: Option<EthernetMatch>,
    #[serde(rename = "ipv4-source", skip_serializing_if = "Option::is_none")]
    ipv4_source: Option<String>,
    #[serde(rename = "ipv4-destination", skip_serializing_if = "Option::is_none")]
    ipv4_destination: Option<String>,
}

#[derive(Debug, Serialize)]
struct EthernetMatch {
    #[serde(rename = "ethernet-type", skip_serializing_if = "Option::is_none")]
    ethernet_type: Option<EthernetType>,
    #[serde(rename = "ethernet-destination", skip_serializing_if = "Option::is_none")]
    ethernet_destination: Option<MacAddress>,
}

#[derive(Debug, Serialize)]
struct EthernetType {
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Serialize)]
struct MacAddress {
    address: String,
}

#[derive(Debug, Serialize)]
struct Instructions {
    instruction: Vec<Instruction>,
}

#[derive(Debug, Serialize)]
struct Instruction {
    order: String,
    #[serde(rename = "apply-actions")]
    apply_actions: ApplyActions,
}

#[derive(Debug, Serialize)]
struct ApplyActions {
    action: Vec<ActionBody>,
}

#[derive(Debug, Serialize)]
struct ActionBody {
    #[serde(flatten)]
    kind: ActionKind,
    order: String,
}

#[derive(Debug, Serialize)]
enum ActionKind {
    #[serde(rename = "output-action")]
    Output {
        #[serde(rename = "output-node-connector")]
        output_node_connector: String,
        #[serde(rename = "max-length", skip_serializing_if = "Option::is_none")]
        max_length: Option<String>,
    },
    #[serde(rename = "group-action")]
    Group {
        #[serde(rename = "group-id")]
        group_id: String,
    },
    #[serde(rename = "set-queue-action")]
    SetQueue {
        #[serde(rename = "queue-id")]
        queue_id: String,
    },
    #[serde(rename = "drop-action")]
    Drop {},
}

fn action_list(actions: &[Action]) -> Vec<ActionBody> {
    if actions.is_empty() {
        return vec![ActionBody {
            kind: ActionKind::Drop {},
            order: "0".to_string(),
        }];
    }
    actions
        .iter()
        .enumerate()
        .map(|(order, action)| ActionBody {
            kind: match *action {
                Action::Output(port) => ActionKind::Output {
                    output_node_connector: port.connector_suffix(),
                    // Send whole packets to the controller, never buffered
                    max_length: (port == PortNo::CONTROLLER).then(|| "65535".to_string()),
                },
                Action::Group(id) => ActionKind::Group {
                    group_id: id.to_string(),
                },
                Action::SetQueue(id) => ActionKind::SetQueue {
                    queue_id: id.to_string(),
                },
            },
            order: order.to_string(),
        })
        .collect()
}

fn match_body(dpid: DatapathId, m: &FlowMatch) -> MatchBody {
    let ethernet_match = if m.ether_type.is_some() || m.eth_dst.is_some() {
        Some(EthernetMatch {
            ethernet_type: m.ether_type.map(|t| EthernetType {
                ty: t.0.to_string(),
            }),
            ethernet_destination: m.eth_dst.map(|mac| MacAddress {
                address: mac.to_string(),
            }),
        })
    } else {
        None
    };

    MatchBody {
        in_port: m
            .in_port
            .map(|p| format!("{}:{}", dpid.node_name(), p.connector_suffix())),
        ethernet_match,
        ipv4_source: m.ipv4_src.map(|p| p.to_string()),
        ipv4_destination: m.ipv4_dst.map(|p| p.to_string()),
    }
}

impl FlowEnvelope {
    pub(crate) fn new(dpid: DatapathId, rule: &FlowRule) -> Self {
        Self {
            flow: vec![FlowBody {
                id: rule.rule_id.wire_id(),
                flow_match: match_body(dpid, &rule.flow_match),
                instructions: Instructions {
                    instruction: vec![Instruction {
                        order: "0".to_string(),
                        apply_actions: ApplyActions {
                            action: action_list(&rule.actions),
                        },
                    }],
                },
                priority: rule.priority.to_string(),
                hard_timeout: (rule.hard_timeout > 0).then(|| rule.hard_timeout.to_string()),
                cookie: rule.cookie.to_string(),
                table_id: rule.table_id.to_string(),
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct GroupEnvelope {
    group: Vec<GroupBody>,
}

#[derive(Debug, Serialize)]
struct GroupBody {
    #[serde(rename = "group-id")]
    group_id: String,
    #[serde(rename = "group-type")]
    group_type: String,
    buckets: Buckets,
}

#[derive(Debug, Serialize)]
struct Buckets {
    bucket: Vec<BucketBody>,
}

#[derive(Debug, Serialize)]
struct BucketBody {
    #[serde(rename = "bucket-id")]
    bucket_id: String,
    weight: String,
    watch_port: String,
    watch_group: String,
    action: Vec<ActionBody>,
}

impl GroupEnvelope {
    pub(crate) fn new(group: &GroupRule) -> Self {
        let group_type = match group.group_type {
            GroupType::Select => "group-select",
        };
        Self {
            group: vec![GroupBody {
                group_id: group.group_id.to_string(),
                group_type: group_type.to_string(),
                buckets: Buckets {
                    bucket: group
                        .buckets
                        .iter()
                        .enumerate()
                        .map(|(id, b)| BucketBody {
                            bucket_id: id.to_string(),
                            weight: b.weight.to_string(),
                            watch_port: b.watch_port.0.to_string(),
                            watch_group: b.watch_group.to_string(),
                            action: action_list(&b.actions),
                        })
                        .collect(),
                },
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Packet-out
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct TransmitPacket {
    input: TransmitInput,
}

#[derive(Debug, Serialize)]
struct TransmitInput {
    node: String,
    #[serde(rename = "node-connector-ref")]
    node_connector_ref: String,
    ingress: String,
    egress: String,
    #[serde(rename = "buffer-id", skip_serializing_if = "Option::is_none")]
    buffer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

fn node_ref(dpid: DatapathId) -> String {
    format!(
        "/opendaylight-inventory:nodes/opendaylight-inventory:node[opendaylight-inventory:id='{}']",
        dpid.node_name()
    )
}

fn connector_ref(dpid: DatapathId, port: PortNo) -> String {
    format!(
        "{}/opendaylight-inventory:node-connector[opendaylight-inventory:id='{}:{}']",
        node_ref(dpid),
        dpid.node_name(),
        port.connector_suffix()
    )
}

impl TransmitPacket {
    pub(crate) fn new(
        dpid: DatapathId,
        payload: &PacketPayload,
        in_port: PortNo,
        out_port: PortNo,
    ) -> Self {
        let (buffer_id, payload) = match payload {
            PacketPayload::Buffered(id) => (Some(id.to_string()), None),
            PacketPayload::Raw(data) => (None, Some(STANDARD.encode(data))),
        };
        let egress = connector_ref(dpid, out_port);
        Self {
            input: TransmitInput {
                node: node_ref(dpid),
                node_connector_ref: egress.clone(),
                ingress: connector_ref(dpid, in_port),
                egress,
                buffer_id,
                payload,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Port statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct NodeConnectorEnvelope {
    #[serde(rename = "node-connector", default)]
    node_connector: Vec<NodeConnector>,
}

#[derive(Debug, Deserialize)]
struct NodeConnector {
    #[serde(rename = "opendaylight-port-statistics:flow-capable-node-connector-statistics")]
    statistics: Option<PortStatistics>,
}

#[derive(Debug, Deserialize)]
struct PortStatistics {
    bytes: ByteCounters,
}

#[derive(Debug, Deserialize)]
struct ByteCounters {
    transmitted: Counter,
}

/// Counters arrive as numbers, or as strings from some releases.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Counter {
    Number(u64),
    Text(String),
}

impl NodeConnectorEnvelope {
    /// Transmitted bytes of the first connector in the document.
    pub(crate) fn bytes_transmitted(&self) -> Result<u64, String> {
        let stats = self
            .node_connector
            .first()
            .ok_or_else(|| "no node-connector in response".to_string())?
            .statistics
            .as_ref()
            .ok_or_else(|| "node-connector has no port statistics".to_string())?;
        match &stats.bytes.transmitted {
            Counter::Number(n) => Ok(*n),
            Counter::Text(s) => s
                .parse()
                .map_err(|_| format!("invalid transmitted counter {:?}", s)),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::entities::Ipv4Prefix;
    use crate::domain::services::{FlowBuilder, MultipathPolicy};
    use crate::domain::value_objects::{EtherType, MacAddr};
    use bytes::Bytes;
    use serde_json::json;
    use std::net::Ipv4Addr;

    #[test]
    fn test_provisioned_flow_body_is_exact() {
        let rule = FlowBuilder::ipv4_route(
            0,
            1,
            101,
            Ipv4Prefix::host(Ipv4Addr::new(10, 0, 0, 3)),
            Ipv4Prefix::host(Ipv4Addr::new(10, 0, 0, 1)),
            PortNo(1),
            1,
        );
        let body = serde_json::to_string(&FlowEnvelope::new(DatapathId(2), &rule)).unwrap();
        assert_eq!(
            body,
            concat!(
                r#"{"flow":[{"id":"1","match":{"ethernet-match":{"ethernet-type":{"type":"2048"}},"#,
                r#""ipv4-source":"10.0.0.3/32","ipv4-destination":"10.0.0.1/32"},"#,
                r#""instructions":{"instruction":[{"order":"0","apply-actions":{"action":"#,
                r#"[{"output-action":{"output-node-connector":"1"},"order":"0"}]}}]},"#,
                r#""priority":"101","cookie":"1","table_id":"0"}]}"#
            )
        );
    }

    #[test]
    fn test_unicast_flow_body() {
        let rule = FlowBuilder::unicast(
            PortNo(1),
            MacAddr::new(0, 0, 0, 0, 0, 2),
            EtherType::IPV4,
            PortNo(3),
        );
        let body = serde_json::to_value(FlowEnvelope::new(DatapathId(4), &rule)).unwrap();
        let flow = &body["flow"][0];
        assert_eq!(flow["id"], json!("reactive-unicast-1-000000000002-0800"));
        assert_eq!(flow["match"]["in-port"], json!("openflow:4:1"));
        assert_eq!(
            flow["match"]["ethernet-match"]["ethernet-destination"]["address"],
            json!("00:00:00:00:00:02")
        );
        assert!(flow["match"].get("ipv4-source").is_none());
    }

    #[test]
    fn test_table_miss_and_drop_bodies() {
        let miss = serde_json::to_value(FlowEnvelope::new(DatapathId(1), &FlowBuilder::table_miss()))
            .unwrap();
        assert_eq!(miss["flow"][0]["match"], json!({}));
        assert_eq!(
            miss["flow"][0]["instructions"]["instruction"][0]["apply-actions"]["action"][0],
            json!({"output-action": {"output-node-connector": "CONTROLLER", "max-length": "65535"}, "order": "0"})
        );

        let drop = serde_json::to_value(FlowEnvelope::new(
            DatapathId(1),
            &FlowBuilder::ipv6_suppress(),
        ))
        .unwrap();
        assert_eq!(
            drop["flow"][0]["instructions"]["instruction"][0]["apply-actions"]["action"][0],
            json!({"drop-action": {}, "order": "0"})
        );
    }

    #[test]
    fn test_group_body() {
        let group = FlowBuilder::group(&MultipathPolicy::default());
        let body = serde_json::to_value(GroupEnvelope::new(&group)).unwrap();
        let g = &body["group"][0];
        assert_eq!(g["group-id"], json!("50"));
        assert_eq!(g["group-type"], json!("group-select"));
        let bucket = &g["buckets"]["bucket"][1];
        assert_eq!(bucket["weight"], json!("50"));
        assert_eq!(bucket["watch_port"], json!("4294967295"));
        assert_eq!(
            bucket["action"],
            json!([
                {"set-queue-action": {"queue-id": "0"}, "order": "0"},
                {"output-action": {"output-node-connector": "3"}, "order": "1"}
            ])
        );
    }

    #[test]
    fn test_transmit_packet_raw_and_buffered() {
        let raw = serde_json::to_value(TransmitPacket::new(
            DatapathId(1),
            &PacketPayload::Raw(Bytes::from_static(b"hi")),
            PortNo::CONTROLLER,
            PortNo::FLOOD,
        ))
        .unwrap();
        assert_eq!(raw["input"]["payload"], json!("aGk="));
        assert!(raw["input"].get("buffer-id").is_none());
        assert!(raw["input"]["egress"]
            .as_str()
            .unwrap()
            .ends_with("[opendaylight-inventory:id='openflow:1:FLOOD']"));

        let buffered = serde_json::to_value(TransmitPacket::new(
            DatapathId(1),
            &PacketPayload::Buffered(9),
            PortNo(1),
            PortNo(2),
        ))
        .unwrap();
        assert_eq!(buffered["input"]["buffer-id"], json!("9"));
        assert!(buffered["input"].get("payload").is_none());
    }

    #[test]
    fn test_counter_parsing() {
        let doc: NodeConnectorEnvelope = serde_json::from_value(json!({
            "node-connector": [{
                "id": "openflow:2:1",
                "opendaylight-port-statistics:flow-capable-node-connector-statistics": {
                    "bytes": {"transmitted": 1050, "received": 7}
                }
            }]
        }))
        .unwrap();
        assert_eq!(doc.bytes_transmitted(), Ok(1050));

        let text: NodeConnectorEnvelope = serde_json::from_value(json!({
            "node-connector": [{
                "opendaylight-port-statistics:flow-capable-node-connector-statistics": {
                    "bytes": {"transmitted": "42"}
                }
            }]
        }))
        .unwrap();
        assert_eq!(text.bytes_transmitted(), Ok(42));

        let empty: NodeConnectorEnvelope = serde_json::from_value(json!({})).unwrap();
        assert!(empty.bytes_transmitted().is_err());
    }
}
