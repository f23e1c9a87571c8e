//! Shared fakes and builders for unit tests.

mod fakes;

pub use fakes::*;

use std::collections::BTreeMap;

use crate::routing_table::Endpoint;
use crate::routing_table::ModificationTag;
use crate::routing_table::Routes;
use crate::routing_table::RoutingKey;
use crate::scheduler::ActualLrp;
use crate::scheduler::ActualLrpState;
use crate::scheduler::DesiredLrp;
use crate::scheduler::PortMapping;

pub fn modification_tag(
    epoch: &str,
    index: u32,
) -> ModificationTag {
    ModificationTag {
        epoch: epoch.to_string(),
        index,
    }
}

pub fn routing_key(
    process_guid: &str,
    container_port: u16,
) -> RoutingKey {
    RoutingKey {
        process_guid: process_guid.to_string(),
        container_port,
    }
}

pub fn routes(
    hostnames: &[&str],
    log_guid: &str,
) -> Routes {
    Routes {
        hostnames: hostnames.iter().map(|hostname| hostname.to_string()).collect(),
        log_guid: log_guid.to_string(),
        modification_tag: ModificationTag::default(),
    }
}

pub fn tagged_routes(
    hostnames: &[&str],
    log_guid: &str,
    tag: ModificationTag,
) -> Routes {
    Routes {
        modification_tag: tag,
        ..routes(hostnames, log_guid)
    }
}

pub fn endpoint(
    instance_guid: &str,
    host: &str,
    port: u16,
    container_port: u16,
) -> Endpoint {
    Endpoint {
        instance_guid: instance_guid.to_string(),
        host: host.to_string(),
        port,
        container_port,
        evacuating: false,
        modification_tag: ModificationTag::default(),
    }
}

pub fn desired_lrp(
    process_guid: &str,
    ports: &[u16],
    port_routes: &[(u16, &[&str])],
    log_guid: &str,
) -> DesiredLrp {
    let routes: BTreeMap<u16, Vec<String>> = port_routes
        .iter()
        .map(|(port, hostnames)| (*port, hostnames.iter().map(|hostname| hostname.to_string()).collect()))
        .collect();

    DesiredLrp {
        process_guid: process_guid.to_string(),
        ports: ports.to_vec(),
        routes,
        log_guid: log_guid.to_string(),
        modification_tag: ModificationTag::default(),
    }
}

pub fn actual_lrp(
    process_guid: &str,
    instance_guid: &str,
    address: &str,
    port_mappings: &[(u16, u16)],
    state: ActualLrpState,
) -> ActualLrp {
    let ports = port_mappings
        .iter()
        .map(|&(host_port, container_port)| PortMapping {
            container_port,
            host_port,
        })
        .collect();

    ActualLrp {
        process_guid: process_guid.to_string(),
        instance_guid: instance_guid.to_string(),
        address: address.to_string(),
        ports,
        state,
        evacuating: false,
        modification_tag: ModificationTag::default(),
    }
}
