//! Deterministic topological ordering of the instance graph.
//!
//! Depth-first post-order traversal with three-colour marking. For every
//! wiring edge `consumer → provider` whose target is a known instance, the
//! provider precedes the consumer in the output. Wiring targets that are not
//! registered instances are treated as externally supplied leaves and
//! ignored.
//!
//! Instances are visited in registration order and wiring entries in
//! insertion order, so the output is byte-identical across runs for the same
//! input — the engine's central determinism property.

use std::collections::HashMap;
use std::sync::Arc;

use lattice_core::error::{GraphError, GraphResult};
use lattice_core::plugin::PluginInstance;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Computes the start order over `instances`.
///
/// Runs in `O(N + E)` over instances and wiring edges. A back-edge to an
/// on-stack node is a cycle; the diagnostic carries the full ancestor path
/// `a0 -> a1 -> … -> a0`.
pub fn resolve_order(instances: &[Arc<PluginInstance>]) -> GraphResult<Vec<String>> {
    let index: HashMap<&str, &Arc<PluginInstance>> =
        instances.iter().map(|i| (i.id(), i)).collect();
    let mut marks: HashMap<&str, Mark> =
        instances.iter().map(|i| (i.id(), Mark::Unvisited)).collect();
    let mut order: Vec<String> = Vec::with_capacity(instances.len());
    let mut path: Vec<&str> = Vec::new();

    for instance in instances {
        visit(instance.id(), &index, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    id: &'a str,
    index: &HashMap<&'a str, &'a Arc<PluginInstance>>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> GraphResult<()> {
    match marks[id] {
        Mark::Done => return Ok(()),
        Mark::OnStack => {
            // Back-edge: the ancestor path from the first occurrence of
            // `id` down to the current node closes the cycle.
            let start = path.iter().position(|n| *n == id).unwrap_or(0);
            let mut cycle: Vec<&str> = path[start..].to_vec();
            cycle.push(id);
            return Err(GraphError::CyclicDependency {
                path: cycle.join(" -> "),
            });
        }
        Mark::Unvisited => {}
    }

    marks.insert(id, Mark::OnStack);
    path.push(id);

    let instance = index[id];
    for target in instance.wiring().targets() {
        // Unknown targets are externally supplied services, not edges.
        if index.contains_key(target) {
            visit(target, index, marks, path, order)?;
        }
    }

    path.pop();
    marks.insert(id, Mark::Done);
    order.push(id.to_string());
    Ok(())
}
