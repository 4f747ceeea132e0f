//! Hostname → backends join.
//!
//! Runs in two passes. The instance pass folds the BBS's actual LRP groups
//! into backends keyed by Diego process GUID. The join pass walks every route
//! mapping and resolves it through the route and process-association
//! repositories, collecting backends under the route's hostname. References
//! that no longer resolve are skipped rather than reported.

use std::collections::HashMap;

use tracing::debug;

use copilot_bbs::ActualLrpGroup;
use copilot_state::{CF_APP_PORT, DiegoProcessGuid, Hostname, Repositories};

use crate::proto::{Backend, BackendSet};

/// Running instances, grouped by the Diego process they belong to.
///
/// Each running instance contributes exactly one backend; the host port is
/// the one mapped to [`CF_APP_PORT`], or 0 when the instance maps no such
/// port.
pub fn backends_by_process(groups: &[ActualLrpGroup]) -> HashMap<DiegoProcessGuid, Vec<Backend>> {
    let mut by_process: HashMap<DiegoProcessGuid, Vec<Backend>> = HashMap::new();

    for group in groups {
        let Some(instance) = group.instance.as_ref() else {
            debug!("skipping actual LRP group without an instance");
            continue;
        };
        if !instance.is_running() {
            debug!(
                process_guid = %instance.process_guid(),
                state = %instance.state,
                "skipping instance that is not running"
            );
            continue;
        }

        by_process
            .entry(instance.process_guid().to_string())
            .or_default()
            .push(Backend {
                address: instance.address().to_string(),
                port: instance.host_port_for(CF_APP_PORT),
            });
    }

    by_process
}

/// Resolve every route mapping to the backends serving its hostname.
///
/// A hostname appears only if at least one of its Diego processes has a
/// running instance. Each repository is read once and its lock released
/// before the next read.
pub fn backends_by_hostname(
    repos: &Repositories,
    by_process: &HashMap<DiegoProcessGuid, Vec<Backend>>,
) -> HashMap<Hostname, BackendSet> {
    let mut by_hostname: HashMap<Hostname, BackendSet> = HashMap::new();

    for (_, mapping) in repos.route_mappings.list() {
        let Some(route) = repos.routes.get(&mapping.route_guid) else {
            debug!(route_guid = %mapping.route_guid, "mapping references unknown route");
            continue;
        };
        let Some(association) = repos.process_associations.get(&mapping.capi_process_guid) else {
            debug!(
                capi_process_guid = %mapping.capi_process_guid,
                "mapping references process without an association"
            );
            continue;
        };

        for diego_guid in &association.diego_process_guids {
            let Some(backends) = by_process.get(diego_guid) else {
                continue;
            };
            by_hostname
                .entry(route.host.clone())
                .or_default()
                .backends
                .extend(backends.iter().cloned());
        }
    }

    by_hostname
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use copilot_bbs::{ActualLrp, ActualLrpKey, ActualLrpNetInfo, PortMapping};
    use copilot_state::{ProcessAssociation, Route, RouteMapping};

    fn group(guid: &str, state: &str, address: &str, ports: &[(u32, u32)]) -> ActualLrpGroup {
        ActualLrpGroup {
            instance: Some(ActualLrp {
                actual_lrp_key: Some(ActualLrpKey {
                    process_guid: guid.to_string(),
                    index: 0,
                    domain: "cf-apps".to_string(),
                }),
                actual_lrp_net_info: Some(ActualLrpNetInfo {
                    address: address.to_string(),
                    ports: ports
                        .iter()
                        .map(|&(container_port, host_port)| PortMapping { container_port, host_port })
                        .collect(),
                    ..Default::default()
                }),
                state: state.to_string(),
                ..Default::default()
            }),
            evacuating: None,
        }
    }

    fn backend(address: &str, port: u32) -> Backend {
        Backend { address: address.to_string(), port }
    }

    fn seeded() -> Repositories {
        let repos = Repositories::in_memory();
        repos.routes.upsert(Route::new("r-a", "some-url"));
        repos.route_mappings.map(RouteMapping::new("r-a", "p-a"));
        repos.process_associations.upsert(ProcessAssociation::new("p-a", ["d-a"]));
        repos
    }

    #[test]
    fn instance_pass_groups_running_instances() {
        let groups = vec![
            group("d-a", "RUNNING", "10.10.1.5", &[(8080, 61005)]),
            group("d-a", "RUNNING", "10.10.1.7", &[(8080, 61007)]),
            group("d-b", "RUNNING", "10.10.1.6", &[(2222, 61016), (8080, 61006)]),
        ];

        let by_process = backends_by_process(&groups);

        assert_eq!(
            by_process["d-a"],
            vec![backend("10.10.1.5", 61005), backend("10.10.1.7", 61007)]
        );
        assert_eq!(by_process["d-b"], vec![backend("10.10.1.6", 61006)]);
    }

    #[test]
    fn instance_pass_skips_non_running_and_empty_groups() {
        let groups = vec![
            group("d-a", "CLAIMED", "10.10.1.5", &[(8080, 61005)]),
            group("d-b", "CRASHED", "10.10.1.6", &[(8080, 61006)]),
            group("d-c", "UNCLAIMED", "", &[]),
            ActualLrpGroup { instance: None, evacuating: None },
        ];

        assert!(backends_by_process(&groups).is_empty());
    }

    #[test]
    fn instance_without_app_port_gets_port_zero() {
        let groups = vec![group("d-a", "RUNNING", "10.10.1.5", &[(2222, 61006)])];
        assert_eq!(backends_by_process(&groups)["d-a"], vec![backend("10.10.1.5", 0)]);
    }

    #[test]
    fn single_mapping_resolves_to_backend() {
        let repos = seeded();
        let by_process = backends_by_process(&[group("d-a", "RUNNING", "10.10.1.5", &[(8080, 61005)])]);

        let result = backends_by_hostname(&repos, &by_process);

        assert_eq!(result.len(), 1);
        assert_eq!(result["some-url"].backends, vec![backend("10.10.1.5", 61005)]);
    }

    #[test]
    fn two_processes_on_one_route_merge_backends() {
        let repos = seeded();
        repos.route_mappings.map(RouteMapping::new("r-a", "p-b"));
        repos.process_associations.upsert(ProcessAssociation::new("p-b", ["d-b"]));
        let by_process = backends_by_process(&[
            group("d-a", "RUNNING", "10.10.1.5", &[(8080, 61005)]),
            group("d-b", "RUNNING", "10.10.1.6", &[(8080, 61006)]),
        ]);

        let result = backends_by_hostname(&repos, &by_process);

        let got: HashSet<Backend> = result["some-url"].backends.iter().cloned().collect();
        let want: HashSet<Backend> =
            [backend("10.10.1.5", 61005), backend("10.10.1.6", 61006)].into_iter().collect();
        assert_eq!(got, want);
    }

    #[test]
    fn association_with_several_diego_processes() {
        let repos = seeded();
        repos.process_associations.upsert(ProcessAssociation::new("p-a", ["d-a", "d-new"]));
        let by_process = backends_by_process(&[
            group("d-a", "RUNNING", "10.10.1.5", &[(8080, 61005)]),
            group("d-new", "RUNNING", "10.10.1.8", &[(8080, 61008)]),
        ]);

        let result = backends_by_hostname(&repos, &by_process);

        assert_eq!(result["some-url"].backends.len(), 2);
    }

    #[test]
    fn mapping_to_unknown_route_contributes_nothing() {
        let repos = seeded();
        repos.route_mappings.map(RouteMapping::new("r-gone", "p-a"));
        let by_process = backends_by_process(&[group("d-a", "RUNNING", "10.10.1.5", &[(8080, 61005)])]);

        let result = backends_by_hostname(&repos, &by_process);

        assert_eq!(result.len(), 1);
        assert_eq!(result["some-url"].backends.len(), 1);
    }

    #[test]
    fn mapping_to_unassociated_process_contributes_nothing() {
        let repos = Repositories::in_memory();
        repos.routes.upsert(Route::new("r-a", "some-url"));
        repos.route_mappings.map(RouteMapping::new("r-a", "p-missing"));
        let by_process = backends_by_process(&[group("d-a", "RUNNING", "10.10.1.5", &[(8080, 61005)])]);

        assert!(backends_by_hostname(&repos, &by_process).is_empty());
    }

    #[test]
    fn deleted_route_drops_hostname() {
        let repos = seeded();
        let by_process = backends_by_process(&[group("d-a", "RUNNING", "10.10.1.5", &[(8080, 61005)])]);
        assert!(backends_by_hostname(&repos, &by_process).contains_key("some-url"));

        repos.routes.delete("r-a");

        assert!(backends_by_hostname(&repos, &by_process).is_empty());
    }

    #[test]
    fn hostname_without_running_instances_is_absent() {
        let repos = seeded();
        let by_process = backends_by_process(&[group("d-a", "CRASHED", "10.10.1.5", &[(8080, 61005)])]);

        assert!(backends_by_hostname(&repos, &by_process).is_empty());
    }
}
