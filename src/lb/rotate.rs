//! RotateLB (§4.9.1): the baseline strategy, no optimization, used for
//! test coverage of the migration pipeline itself.

use std::collections::BTreeMap;

use log::debug;

use super::{LbError, LbStrategy, LbView};
use crate::types::{NodeId, ObjId};

#[derive(Debug, Default)]
pub struct RotateLB {
    /// §9 open question: `RotateLB::rotateObjHan` in the source iterates a
    /// count but performs no action; its intent is undocumented. Left as a
    /// no-op here rather than guessed at — see `rotate_obj_han`.
    _reserved: (),
}

impl RotateLB {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliberately a no-op (§9 open question, decided not to guess).
    pub fn rotate_obj_han(&self, count: u32) {
        for _ in 0..count {}
    }
}

impl LbStrategy for RotateLB {
    fn name(&self) -> &'static str {
        "RotateLB"
    }

    fn input_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), LbError> {
        if let Some(key) = params.keys().next() {
            return Err(LbError::UnknownConfigKey {
                strategy: "RotateLB",
                key: key.clone(),
            });
        }
        Ok(())
    }

    fn run_lb(&mut self, view: &LbView) -> Vec<(ObjId, NodeId)> {
        let next_node = if view.self_node + 1 > view.num_nodes - 1 {
            0
        } else {
            view.self_node + 1
        };
        view.local_elements
            .iter()
            .map(|&(obj, _)| {
                debug!("RotateLB: migrating {obj} from {} to {next_node}", view.self_node);
                (obj, next_node)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(self_node: NodeId, num_nodes: NodeId, ids: &[u64]) -> LbView {
        LbView {
            phase: 0,
            self_node,
            num_nodes,
            local_elements: ids.iter().map(|&i| (ObjId::new(0, 0, i), 1.0)).collect(),
            current_host: Default::default(),
            total_load: ids.len() as f64,
            avg_load: 1.0,
            comm_edges: Default::default(),
            global_loads: Default::default(),
        }
    }

    #[test]
    fn rotates_forward() {
        let mut lb = RotateLB::new();
        let transfers = lb.run_lb(&view(0, 3, &[1, 2, 3, 4]));
        assert!(transfers.iter().all(|(_, dest)| *dest == 1));
    }

    #[test]
    fn wraps_at_last_node() {
        let mut lb = RotateLB::new();
        let transfers = lb.run_lb(&view(2, 3, &[1]));
        assert_eq!(transfers, vec![(ObjId::new(0, 0, 1), 0)]);
    }
}
