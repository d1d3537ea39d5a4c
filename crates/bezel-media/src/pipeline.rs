//! Engine-agnostic description of the bezel-removal pipeline.
//!
//! A [`PipelineDescription`] lists, per panel, the operations that turn a
//! region of the source into a cropped portrait panel, followed by one
//! left-to-right concatenation. Serializing it for a particular engine is
//! the job of [`crate::filters`].

use bezel_models::{Dimensions, LayoutPlan, OutputSpec, Rect};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One operation applied to a panel stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PanelOp {
    /// Cut the panel's region out of the source frame
    CropSource(Rect),
    /// Rotate 90° counter-clockwise
    RotateCcw90,
    /// Remove the bezels; `width`/`height` are the resulting size
    CropBezel {
        left_px: u32,
        right_px: u32,
        width: u32,
        height: u32,
    },
}

/// Ordered operations producing one panel stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelChain {
    pub index: usize,
    pub ops: Vec<PanelOp>,
}

impl PanelChain {
    /// Walk the ops and return the panel's final size.
    pub fn output_size(&self, source: Dimensions) -> Dimensions {
        self.ops.iter().fold(source, |size, op| match op {
            PanelOp::CropSource(rect) => Dimensions::new(rect.width, rect.height),
            PanelOp::RotateCcw90 => Dimensions::new(size.height, size.width),
            PanelOp::CropBezel { left_px, right_px, .. } => Dimensions::new(
                size.width.saturating_sub(*left_px).saturating_sub(*right_px),
                size.height,
            ),
        })
    }
}

/// Full processing graph for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDescription {
    pub source: PathBuf,
    pub source_size: Dimensions,
    pub panels: Vec<PanelChain>,
    /// Panel indices in concatenation order (left to right)
    pub concat: Vec<usize>,
    pub output: OutputSpec,
}

impl PipelineDescription {
    /// Build the pipeline for a planned layout.
    ///
    /// Each panel becomes crop source, then rotate when the plan asks for
    /// it, then crop bezel. The bezel crop is emitted even when both bezels
    /// are zero so every chain has the same shape.
    pub fn build(source: impl AsRef<Path>, plan: &LayoutPlan) -> Self {
        let mut panels: Vec<PanelChain> = plan
            .panels
            .iter()
            .map(|panel| {
                let mut ops = Vec::with_capacity(3);
                ops.push(PanelOp::CropSource(panel.source_rect));
                if panel.rotate_90_ccw {
                    ops.push(PanelOp::RotateCcw90);
                }
                let oriented = panel.oriented_size();
                ops.push(PanelOp::CropBezel {
                    left_px: panel.crop_after_rotate.left_px,
                    right_px: panel.crop_after_rotate.right_px,
                    width: panel.cropped_width(),
                    height: oriented.height,
                });
                PanelChain {
                    index: panel.index,
                    ops,
                }
            })
            .collect();
        panels.sort_by_key(|chain| chain.index);

        let concat = panels.iter().map(|chain| chain.index).collect();

        Self {
            source: source.as_ref().to_path_buf(),
            source_size: plan.source,
            panels,
            concat,
            output: plan.output,
        }
    }

    /// Sizes of each panel stream and of the concatenated canvas.
    ///
    /// The canvas is the panels placed side by side: widths add up and
    /// heights must agree (the larger one is reported otherwise).
    pub fn simulate(&self) -> (Vec<Dimensions>, Dimensions) {
        let sizes: Vec<Dimensions> = self
            .panels
            .iter()
            .map(|chain| chain.output_size(self.source_size))
            .collect();

        let canvas = self
            .concat
            .iter()
            .filter_map(|index| self.panels.iter().position(|c| c.index == *index))
            .map(|pos| sizes[pos])
            .fold(Dimensions::new(0, 0), |acc, size| {
                Dimensions::new(acc.width + size.width, acc.height.max(size.height))
            });

        (sizes, canvas)
    }

    /// Whether the ops actually produce the planned output canvas.
    pub fn is_consistent(&self) -> bool {
        let (sizes, canvas) = self.simulate();
        let same_height = sizes.iter().all(|s| s.height == self.output.height);
        same_height && canvas == self.output.dimensions()
    }
}
