use std::collections::HashMap;

use crate::scheduler::ActualLrp;
use crate::scheduler::ActualLrpState;
use crate::scheduler::DesiredLrp;

use super::Endpoint;
use super::Routes;
use super::RoutingKey;

/// Indexes a desired-LRP snapshot by routing key.
///
/// Hostnames bound to a port the record does not expose in `ports` are
/// dropped.
pub fn routes_by_routing_key(desireds: &[DesiredLrp]) -> HashMap<RoutingKey, Routes> {
    let mut routes = HashMap::new();

    for desired in desireds {
        for (key, key_routes) in routes_from_desired(desired) {
            routes.insert(key, key_routes);
        }
    }
    routes
}

/// Indexes an actual-LRP snapshot by routing key. Instances not in the
/// RUNNING state are not routable and are skipped.
pub fn endpoints_by_routing_key(actuals: &[ActualLrp]) -> HashMap<RoutingKey, Vec<Endpoint>> {
    let mut endpoints: HashMap<RoutingKey, Vec<Endpoint>> = HashMap::new();

    for actual in actuals {
        for (key, endpoint) in endpoints_from_actual(actual) {
            endpoints.entry(key).or_default().push(endpoint);
        }
    }
    endpoints
}

/// The (key, Routes) pairs carried by one desired-LRP record.
pub fn routes_from_desired(desired: &DesiredLrp) -> Vec<(RoutingKey, Routes)> {
    desired
        .routes
        .iter()
        .filter(|(port, _)| desired.ports.contains(port))
        .map(|(&port, hostnames)| {
            let key = RoutingKey {
                process_guid: desired.process_guid.clone(),
                container_port: port,
            };
            let routes = Routes {
                hostnames: hostnames.clone(),
                log_guid: desired.log_guid.clone(),
                modification_tag: desired.modification_tag.clone(),
            };
            (key, routes)
        })
        .collect()
}

/// The routing keys carried by one desired-LRP record.
pub fn routing_keys_from_desired(desired: &DesiredLrp) -> Vec<RoutingKey> {
    desired
        .routes
        .keys()
        .filter(|port| desired.ports.contains(port))
        .map(|&port| RoutingKey {
            process_guid: desired.process_guid.clone(),
            container_port: port,
        })
        .collect()
}

/// The (key, Endpoint) pairs carried by one actual-LRP record, one per port
/// mapping. Empty unless the instance is RUNNING.
pub fn endpoints_from_actual(actual: &ActualLrp) -> Vec<(RoutingKey, Endpoint)> {
    if actual.state != ActualLrpState::Running {
        return Vec::new();
    }

    actual
        .ports
        .iter()
        .map(|mapping| {
            let key = RoutingKey {
                process_guid: actual.process_guid.clone(),
                container_port: mapping.container_port,
            };
            let endpoint = Endpoint {
                instance_guid: actual.instance_guid.clone(),
                host: actual.address.clone(),
                port: mapping.host_port,
                container_port: mapping.container_port,
                evacuating: actual.evacuating,
                modification_tag: actual.modification_tag.clone(),
            };
            (key, endpoint)
        })
        .collect()
}
