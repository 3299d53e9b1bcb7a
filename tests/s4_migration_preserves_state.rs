//! Migration preserves state (§8 scenario S4): an element receives five
//! messages, migrates to another node, then receives five more — the final
//! state reflects all ten increments regardless of where each one was
//! delivered.

use vt_rt::testkit;
use vt_rt::types::ObjId;

#[derive(Clone, Debug, PartialEq)]
struct Counter {
    k: u64,
}

#[test]
fn counter_survives_migration_and_keeps_counting() {
    let mut cluster = testkit::harness(2, |transport, _| {
        let mut node = vt_rt::Node::new(transport, 2);
        node.register_member("inc", |_, element, _| {
            let counter = element.downcast_mut::<Counter>().expect("inc always targets a Counter");
            counter.k += 1;
        })
        .unwrap();
        node
    });

    let proxy = cluster.node_mut(0).construct_collection("counters", 1, false, |_| 0, |_| Counter { k: 0 });
    cluster.node_mut(1).construct_collection::<Counter, _, _>("counters", 0, true, |_| 1, |_| unreachable!());

    let obj = ObjId::new(0, proxy, 0);
    // Re-registering "inc" is idempotent (same name, same shape) and just
    // hands back the id assigned inside the harness closure above.
    let handler_id = cluster.node_mut(0).register_member("inc", |_, _, _| {}).unwrap();

    for _ in 0..5 {
        cluster.node_mut(0).send_to_element(obj, handler_id, Box::new(()), None).unwrap();
    }
    assert_eq!(cluster.node(0).collections().get::<Counter>(proxy, 0), Some(&Counter { k: 5 }));

    cluster.migrate(obj, 0, 1).unwrap();

    for _ in 0..5 {
        cluster.node_mut(0).send_to_element(obj, handler_id, Box::new(()), None).unwrap();
    }
    cluster.run_until_quiescent(None).unwrap();

    assert!(!cluster.node(0).collections().resident(proxy, 0));
    assert_eq!(cluster.node(1).collections().get::<Counter>(proxy, 0), Some(&Counter { k: 10 }));
}
