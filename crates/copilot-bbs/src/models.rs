//! BBS wire types.
//!
//! Hand-written `prost` messages covering the subset of the BBS protobuf
//! schema that Copilot reads. Field tags follow the BBS `.proto` files, so
//! unknown fields sent by a newer BBS are skipped on decode.

use crate::error::BbsError;

/// Lifecycle stage of an actual LRP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActualLrpState {
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}

impl ActualLrpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclaimed => "UNCLAIMED",
            Self::Claimed => "CLAIMED",
            Self::Running => "RUNNING",
            Self::Crashed => "CRASHED",
        }
    }

    /// Parse the BBS string form. Unknown states yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNCLAIMED" => Some(Self::Unclaimed),
            "CLAIMED" => Some(Self::Claimed),
            "RUNNING" => Some(Self::Running),
            "CRASHED" => Some(Self::Crashed),
            _ => None,
        }
    }
}

// ── Actual LRPs ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PortMapping {
    #[prost(uint32, tag = "1")]
    pub container_port: u32,
    #[prost(uint32, tag = "2")]
    pub host_port: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActualLrpKey {
    #[prost(string, tag = "1")]
    pub process_guid: String,
    #[prost(int32, tag = "2")]
    pub index: i32,
    #[prost(string, tag = "3")]
    pub domain: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActualLrpInstanceKey {
    #[prost(string, tag = "1")]
    pub instance_guid: String,
    #[prost(string, tag = "2")]
    pub cell_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActualLrpNetInfo {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(message, repeated, tag = "2")]
    pub ports: Vec<PortMapping>,
    #[prost(string, tag = "3")]
    pub instance_address: String,
}

impl ActualLrpNetInfo {
    /// Host port mapped to `container_port`, or 0 when the instance exposes
    /// no such port. When several mappings match, the last one wins.
    pub fn host_port_for(&self, container_port: u32) -> u32 {
        self.ports
            .iter()
            .filter(|p| p.container_port == container_port)
            .last()
            .map(|p| p.host_port)
            .unwrap_or(0)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActualLrp {
    #[prost(message, optional, tag = "1")]
    pub actual_lrp_key: Option<ActualLrpKey>,
    #[prost(message, optional, tag = "2")]
    pub actual_lrp_instance_key: Option<ActualLrpInstanceKey>,
    #[prost(message, optional, tag = "3")]
    pub actual_lrp_net_info: Option<ActualLrpNetInfo>,
    #[prost(int32, tag = "4")]
    pub crash_count: i32,
    #[prost(string, tag = "5")]
    pub crash_reason: String,
    #[prost(string, tag = "6")]
    pub state: String,
    #[prost(string, tag = "7")]
    pub placement_error: String,
    #[prost(int64, tag = "8")]
    pub since: i64,
}

impl ActualLrp {
    pub fn process_guid(&self) -> &str {
        self.actual_lrp_key
            .as_ref()
            .map(|k| k.process_guid.as_str())
            .unwrap_or_default()
    }

    pub fn lrp_state(&self) -> Option<ActualLrpState> {
        ActualLrpState::parse(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.lrp_state() == Some(ActualLrpState::Running)
    }

    pub fn address(&self) -> &str {
        self.actual_lrp_net_info
            .as_ref()
            .map(|n| n.address.as_str())
            .unwrap_or_default()
    }

    pub fn host_port_for(&self, container_port: u32) -> u32 {
        self.actual_lrp_net_info
            .as_ref()
            .map(|n| n.host_port_for(container_port))
            .unwrap_or(0)
    }
}

/// One placement slot: the instance plus an optional evacuating copy.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActualLrpGroup {
    #[prost(message, optional, tag = "1")]
    pub instance: Option<ActualLrp>,
    #[prost(message, optional, tag = "2")]
    pub evacuating: Option<ActualLrp>,
}

// ── Requests / responses ──────────────────────────────────────────

/// Error envelope carried inside BBS responses.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(int32, tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl From<Error> for BbsError {
    fn from(err: Error) -> Self {
        BbsError::Remote {
            kind: err.r#type,
            message: err.message,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActualLrpGroupsRequest {
    #[prost(string, tag = "1")]
    pub domain: String,
    #[prost(string, tag = "2")]
    pub cell_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActualLrpGroupsResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<Error>,
    #[prost(message, repeated, tag = "2")]
    pub actual_lrp_groups: Vec<ActualLrpGroup>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CellsRequest {
    #[prost(string, repeated, tag = "1")]
    pub cell_ids: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CellPresence {
    #[prost(string, tag = "1")]
    pub cell_id: String,
    #[prost(string, tag = "2")]
    pub rep_address: String,
    #[prost(string, tag = "3")]
    pub zone: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CellsResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<Error>,
    #[prost(message, repeated, tag = "2")]
    pub cells: Vec<CellPresence>,
}

/// Filter for listing actual LRP groups. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActualLrpFilter {
    pub domain: String,
    pub cell_id: String,
}

impl From<ActualLrpFilter> for ActualLrpGroupsRequest {
    fn from(filter: ActualLrpFilter) -> Self {
        Self {
            domain: filter.domain,
            cell_id: filter.cell_id,
        }
    }
}
