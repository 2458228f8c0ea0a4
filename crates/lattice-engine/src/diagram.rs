//! Mermaid rendering of the instance graph.
//!
//! Informational only — emitted by dry runs so operators can inspect the
//! wiring before anything starts. One node per instance labelled
//! `id (type_id) [mode]`: hexagons for worker instances, rectangles for main
//! instances. One edge per wiring entry, labelled with the requirement name.
//! Wiring targets that are not registered instances all point at a single
//! `missing` sink node.

use std::collections::HashMap;
use std::sync::Arc;

use lattice_core::plugin::{ExecutionMode, PluginInstance};

const MISSING_NODE: &str = "missing";

/// Renders the instance graph as a Mermaid `graph TD` diagram.
pub fn render(instances: &[Arc<PluginInstance>]) -> String {
    let keys: HashMap<&str, String> = instances
        .iter()
        .enumerate()
        .map(|(idx, inst)| (inst.id(), format!("n{idx}")))
        .collect();

    let mut out = String::from("graph TD\n");
    for instance in instances {
        let key = &keys[instance.id()];
        let label = format!(
            "{} ({}) [{}]",
            instance.id(),
            instance.type_id(),
            instance.mode()
        );
        match instance.mode() {
            ExecutionMode::Worker => {
                out.push_str(&format!("    {key}{{{{\"{label}\"}}}}\n"));
            }
            ExecutionMode::Main => {
                out.push_str(&format!("    {key}[\"{label}\"]\n"));
            }
        }
    }

    let has_missing = instances
        .iter()
        .flat_map(|i| i.wiring().targets())
        .any(|t| !keys.contains_key(t));
    if has_missing {
        out.push_str(&format!("    {MISSING_NODE}((\"{MISSING_NODE}\"))\n"));
    }

    for instance in instances {
        let from = &keys[instance.id()];
        for (requirement, target) in instance.wiring().iter() {
            let to = keys
                .get(target)
                .map(String::as_str)
                .unwrap_or(MISSING_NODE);
            out.push_str(&format!("    {from} -->|{requirement}| {to}\n"));
        }
    }
    out
}
