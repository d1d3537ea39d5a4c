//! FFmpeg `-filter_complex` serialization of a [`PipelineDescription`].
//!
//! Only syntax lives here. Every coordinate comes from the pipeline as an
//! explicit integer, so the graph never relies on `iw`/`ih` arithmetic.

use crate::pipeline::{PanelOp, PipelineDescription};

/// Label of the reassembled video stream, for `-map [v]`.
pub const OUTPUT_LABEL: &str = "v";

/// `transpose` direction for a 90° counter-clockwise turn.
const TRANSPOSE_CCW: u8 = 2;

/// A serialized filter graph and the label of its output pad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraph {
    pub graph: String,
    pub output_label: String,
}

impl FilterGraph {
    /// Argument for `-map`.
    pub fn map_arg(&self) -> String {
        format!("[{}]", self.output_label)
    }
}

/// Crop filter (`crop=w:h:x:y`).
pub fn filter_crop(width: u32, height: u32, x: u32, y: u32) -> String {
    format!("crop={}:{}:{}:{}", width, height, x, y)
}

/// Rotate 90° counter-clockwise.
pub fn filter_rotate_ccw() -> String {
    format!("transpose={}", TRANSPOSE_CCW)
}

/// Side-by-side concatenation of `inputs` streams.
pub fn filter_hstack(inputs: usize) -> String {
    format!("hstack=inputs={}", inputs)
}

/// Serialize the pipeline into one `-filter_complex` string.
///
/// Layout: split the source once per panel, run each panel's chain, then
/// hstack the panels in concatenation order into `[v]`.
pub fn to_filter_graph(pipeline: &PipelineDescription) -> FilterGraph {
    let mut parts = Vec::with_capacity(pipeline.panels.len() + 2);

    let split_labels: String = pipeline
        .panels
        .iter()
        .map(|chain| format!("[s{}]", chain.index))
        .collect();
    parts.push(format!("[0:v]split={}{}", pipeline.panels.len(), split_labels));

    for chain in &pipeline.panels {
        let filters: Vec<String> = chain
            .ops
            .iter()
            .map(|op| match *op {
                PanelOp::CropSource(rect) => filter_crop(rect.width, rect.height, rect.x, rect.y),
                PanelOp::RotateCcw90 => filter_rotate_ccw(),
                PanelOp::CropBezel {
                    left_px,
                    width,
                    height,
                    ..
                } => filter_crop(width, height, left_px, 0),
            })
            .collect();
        parts.push(format!(
            "[s{idx}]{chain}[p{idx}]",
            idx = chain.index,
            chain = filters.join(",")
        ));
    }

    let stack_inputs: String = pipeline
        .concat
        .iter()
        .map(|index| format!("[p{}]", index))
        .collect();
    parts.push(format!(
        "{}{}[{}]",
        stack_inputs,
        filter_hstack(pipeline.concat.len()),
        OUTPUT_LABEL
    ));

    FilterGraph {
        graph: parts.join(";"),
        output_label: OUTPUT_LABEL.to_string(),
    }
}
