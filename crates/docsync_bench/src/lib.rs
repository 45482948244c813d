//! Shared fixtures for DocSync benchmarks.

use docsync_protocol::DocumentContent;
use rand::Rng;
use serde_json::json;

/// Builds drawing content with `elements` random shapes.
pub fn scene(elements: usize) -> DocumentContent {
    let mut rng = rand::thread_rng();
    let shapes: Vec<_> = (0..elements)
        .map(|i| {
            json!({
                "id": format!("shape-{i}"),
                "type": "rectangle",
                "x": rng.gen_range(0..2000),
                "y": rng.gen_range(0..2000),
                "width": rng.gen_range(10..400),
                "height": rng.gen_range(10..400),
            })
        })
        .collect();
    match DocumentContent::from_value(json!({ "elements": shapes, "appState": {} })) {
        Ok(content) => content,
        Err(_) => DocumentContent::blank(),
    }
}
