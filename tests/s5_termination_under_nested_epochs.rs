//! Termination under nested epochs (§8 scenario S5): a child epoch must be
//! detected as terminated strictly before its parent — opening the child
//! holds the parent open, and closing the child is what lets the parent go
//! quiet.

use vt_rt::testkit;

#[test]
fn child_epoch_terminates_before_its_parent() {
    let mut cluster = testkit::bare_cluster(1, 2);
    let handler_id = cluster.node_mut(0).register_plain("noop", |_, _| {}).unwrap();

    let parent = cluster.new_user_epoch();
    let child = cluster.declare_child_epoch(parent);

    assert!(!cluster.detect_termination(parent), "opening a child holds the parent open");
    assert!(!cluster.detect_termination(child));

    for _ in 0..10 {
        cluster.node_mut(0).send(0, handler_id, Box::new(()), Some(child)).unwrap();
    }
    assert!(!cluster.detect_termination(child), "all ten sends are still in flight");

    cluster.run_until_quiescent(Some(child)).unwrap();
    assert!(cluster.detect_termination(child));
    assert!(!cluster.detect_termination(parent), "closing the child hasn't happened yet");

    cluster.close_child_epoch(child);
    assert!(cluster.detect_termination(parent));
}
