use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::routing_table::ModificationTag;

/// What should be running: process identity, exposed container ports, and
/// the hostnames bound to each port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredLrp {
    pub process_guid: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub routes: BTreeMap<u16, Vec<String>>,
    #[serde(default)]
    pub log_guid: String,
    #[serde(default)]
    pub modification_tag: ModificationTag,
}

/// What is running: one instance's host, externally-mapped ports, and
/// lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLrp {
    pub process_guid: String,
    #[serde(default)]
    pub instance_guid: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub state: ActualLrpState,
    #[serde(default)]
    pub evacuating: bool,
    #[serde(default)]
    pub modification_tag: ModificationTag,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActualLrpState {
    #[default]
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}
