//! Rotate on three nodes, four elements (§8 scenario S1): every element
//! starts on node 0 and, under `RotateLB` every phase, visits node 1 then
//! node 2 before returning home.

use vt_rt::lb::config::Config;
use vt_rt::testkit;

#[derive(Clone)]
struct Elem;

#[test]
fn rotate_cycles_every_element_through_all_nodes() {
    let mut cluster = testkit::bare_cluster(3, 2);

    let mut proxy = 0;
    for node in 0..cluster.num_nodes() {
        proxy = cluster
            .node_mut(node)
            .construct_collection("elems", 4, false, |_| 0, |_| Elem);
    }

    let config = Config::parse("% 1 RotateLB").unwrap();

    cluster.next_phase(&config).unwrap();
    for local_id in 0..4 {
        assert!(cluster.node(1).collections().resident(proxy, local_id));
    }

    cluster.next_phase(&config).unwrap();
    for local_id in 0..4 {
        assert!(cluster.node(2).collections().resident(proxy, local_id));
    }

    cluster.next_phase(&config).unwrap();
    for local_id in 0..4 {
        assert!(cluster.node(0).collections().resident(proxy, local_id));
    }
}
