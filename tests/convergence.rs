use std::time::Duration;

use dv_netsim::network::AdvertiseScope;
use dv_netsim::protocol::{CostEntry, InterfaceCosts};
use dv_netsim::{Cost, Packet, Simulation, SimulationConfig, UpdatePolicy};

/// H1 - R1 - R2 - R3 - H3, every link costs 1.
const LINE: &str = r#"{
    "routers": [
        { "name": "R1", "neighbors": [
            { "name": "H1", "interfaces": { "0": 1 } },
            { "name": "R2", "interfaces": { "1": 1 } }
        ] },
        { "name": "R2", "neighbors": [
            { "name": "R1", "interfaces": { "0": 1 } },
            { "name": "R3", "interfaces": { "1": 1 } }
        ] },
        { "name": "R3", "neighbors": [
            { "name": "R2", "interfaces": { "0": 1 } },
            { "name": "H3", "interfaces": { "1": 1 } }
        ] }
    ],
    "hosts": [ { "address": "H1" }, { "address": "H3" } ],
    "links": [
        { "a": { "node": "H1" }, "b": { "node": "R1", "interface": 0 } },
        { "a": { "node": "R1", "interface": 1 }, "b": { "node": "R2", "interface": 0 } },
        { "a": { "node": "R2", "interface": 1 }, "b": { "node": "R3", "interface": 0 } },
        { "a": { "node": "R3", "interface": 1 }, "b": { "node": "H3" } }
    ],
    "traffic": [ { "from": "H1", "to": "H3", "payload": "across" } ]
}"#;

/// Triangle with one host per router; the direct R1-R3 link costs 10.
const TRIANGLE: &str = r#"{
    "routers": [
        { "name": "R1", "neighbors": [
            { "name": "H1", "interfaces": { "0": 1 } },
            { "name": "R2", "interfaces": { "1": 1 } },
            { "name": "R3", "interfaces": { "2": 10 } }
        ] },
        { "name": "R2", "neighbors": [
            { "name": "R1", "interfaces": { "0": 1 } },
            { "name": "R3", "interfaces": { "1": 1 } },
            { "name": "H2", "interfaces": { "2": 1 } }
        ] },
        { "name": "R3", "neighbors": [
            { "name": "R1", "interfaces": { "0": 10 } },
            { "name": "R2", "interfaces": { "1": 1 } },
            { "name": "H3", "interfaces": { "2": 1 } }
        ] }
    ],
    "hosts": [ { "address": "H1" }, { "address": "H2" }, { "address": "H3" } ],
    "links": [
        { "a": { "node": "H1" }, "b": { "node": "R1", "interface": 0 } },
        { "a": { "node": "H2" }, "b": { "node": "R2", "interface": 2 } },
        { "a": { "node": "H3" }, "b": { "node": "R3", "interface": 2 } },
        { "a": { "node": "R1", "interface": 1 }, "b": { "node": "R2", "interface": 0 } },
        { "a": { "node": "R2", "interface": 1 }, "b": { "node": "R3", "interface": 1 } },
        { "a": { "node": "R1", "interface": 2 }, "b": { "node": "R3", "interface": 0 } }
    ],
    "traffic": [ { "from": "H1", "to": "H3", "payload": "ping" } ]
}"#;

fn build(json: &str, edit: impl FnOnce(&mut SimulationConfig)) -> Simulation {
    let mut config = SimulationConfig::from_json(json).unwrap();
    edit(&mut config);
    Simulation::from_config(&config).unwrap()
}

fn settled(json: &str, edit: impl FnOnce(&mut SimulationConfig)) -> Simulation {
    let mut sim = build(json, edit);
    sim.start();
    assert!(sim.settle(100).unwrap() < 100, "network never went idle");
    sim
}

#[test]
fn echo_only_updates_leave_far_host_unknown() {
    let sim = settled(LINE, |_| {});

    let r1 = sim.router("R1").unwrap().table();
    assert_eq!(r1.cost_of("R3", "R1"), Cost::Known(2));
    assert!(!r1.known_destinations().iter().any(|d| d.as_str() == "H3"));

    let r3 = sim.router("R3").unwrap().table();
    assert_eq!(r3.cost_of("H1", "R3"), Cost::Known(3));
}

#[test]
fn flooding_reaches_every_router() {
    let sim = settled(LINE, |c| c.advertise_scope = AdvertiseScope::AllExceptArrival);

    let r1 = sim.router("R1").unwrap().table();
    assert_eq!(r1.cost_of("H3", "R1"), Cost::Known(3));
    assert_eq!(r1.best_route("H3"), Some(1));
}

#[test]
fn data_crosses_the_line_and_is_acknowledged() {
    let mut sim = settled(LINE, |c| c.advertise_scope = AdvertiseScope::AllExceptArrival);
    assert_eq!(sim.send_scheduled(), 1);
    sim.settle(100).unwrap();

    assert_eq!(
        sim.host("H3").unwrap().received(),
        [Packet::data("H3", "H1", "across")]
    );
    assert_eq!(
        sim.host("H1").unwrap().received(),
        [Packet::data("H1", "H3", "ACK:H1")]
    );
    let forwarded: u64 = sim.routers().iter().map(|r| r.stats().forwarded).sum();
    assert_eq!(forwarded, 6);
}

#[test]
fn unroutable_data_is_dropped() {
    let mut sim = settled(LINE, |_| {});
    // R1 never hears about H3 with echo-only updates
    assert_eq!(sim.send_scheduled(), 1);
    sim.settle(100).unwrap();

    assert!(sim.host("H3").unwrap().received().is_empty());
    assert_eq!(sim.router("R1").unwrap().stats().dropped, 1);
}

#[test]
fn compatible_policy_keeps_direct_cost_but_forwards_cheaply() {
    let sim = settled(TRIANGLE, |_| {});

    let r1 = sim.router("R1").unwrap().table();
    assert_eq!(r1.own_vector().min_cost("R3"), Cost::Known(10));
    assert_eq!(r1.cost_of("H2", "R1"), Cost::Known(2));
    assert_eq!(r1.cost_of("H3", "R1"), Cost::Known(11));
    assert_eq!(r1.best_route("R3"), Some(1));
}

#[test]
fn apply_cheaper_policy_adds_cheaper_path_to_neighbor() {
    let sim = settled(TRIANGLE, |c| c.update_policy = UpdatePolicy::ApplyCheaper);

    let r1 = sim.router("R1").unwrap().table();
    assert_eq!(
        r1.own_vector().entry("R3"),
        Some(CostEntry { interface: 1, cost: 2 })
    );
    // the physical R1-R3 link is still listed and advertised
    assert_eq!(
        r1.own_vector().get("R3"),
        Some(&InterfaceCosts::from([(1, 2), (2, 10)]))
    );
    assert!(r1.serialize().contains("R3:2:10;"));
    let r3 = sim.router("R3").unwrap().table();
    assert_eq!(
        r3.own_vector().get("R1"),
        Some(&InterfaceCosts::from([(0, 10), (1, 2)]))
    );
}

#[test]
fn triangle_delivers_in_both_directions() {
    let mut sim = settled(TRIANGLE, |_| {});
    assert_eq!(sim.send_scheduled(), 1);
    sim.send("H3", "H2", "pong").unwrap();
    sim.settle(100).unwrap();

    let h3 = sim.host("H3").unwrap().received();
    assert!(h3.contains(&Packet::data("H3", "H1", "ping")));
    assert!(h3.contains(&Packet::data("H3", "H2", "ACK:H3")));
    let h2 = sim.host("H2").unwrap().received();
    assert_eq!(h2, [Packet::data("H2", "H3", "pong")]);
    assert_eq!(
        sim.host("H1").unwrap().received(),
        [Packet::data("H1", "H3", "ACK:H1")]
    );
}

#[test]
fn bounded_queues_still_converge() {
    let sim = settled(TRIANGLE, |c| c.queue_capacity = 2);
    let r2 = sim.router("R2").unwrap().table();
    assert_eq!(r2.cost_of("H1", "R2"), Cost::Known(2));
    assert_eq!(r2.cost_of("H3", "R2"), Cost::Known(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tasks_mode_converges_and_delivers() {
    let mut sim = build(TRIANGLE, |c| {
        c.poll_interval_ms = 1;
        c.traffic[0].delay_ms = 100;
    });
    sim.start();
    let sim = sim.run_for(Duration::from_millis(400)).await.unwrap();

    // learning order depends on scheduling, so only reachability is fixed
    let r1 = sim.router("R1").unwrap().table();
    assert!(r1.cost_of("H2", "R1").is_known());
    assert_eq!(
        sim.host("H3").unwrap().received(),
        [Packet::data("H3", "H1", "ping")]
    );
    assert_eq!(
        sim.host("H1").unwrap().received(),
        [Packet::data("H1", "H3", "ACK:H1")]
    );
}

#[test]
fn bundled_demo_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/triangle.json");
    let config = SimulationConfig::load(path).unwrap();
    let mut sim = Simulation::from_config(&config).unwrap();
    sim.start();
    sim.settle(100).unwrap();
    assert_eq!(sim.send_scheduled(), 2);
    sim.settle(100).unwrap();
    assert_eq!(sim.host("H1").unwrap().received().len(), 2);
}
