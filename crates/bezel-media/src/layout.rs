//! Panel layout and bezel geometry.
//!
//! Infers how the four portrait panels are packed into the captured frame
//! and computes, per panel, the source crop, the optional rotation and the
//! bezel crop. Pure functions only; nothing here touches the filesystem or
//! the engine.

use bezel_models::{
    Axis, BezelConfig, BezelCrop, Dimensions, GeometryError, LayoutPlan, Orientation, OutputSpec,
    PanelPlan, Rect, PANEL_COUNT,
};

/// Compute the panel plan for a source frame.
///
/// Wide frames (width >= height) hold four vertical strips side by side.
/// Tall frames hold four horizontal bands, each turned 90° counter-clockwise
/// into portrait. In both cases the bezels are cut from the left (top bezel)
/// and right (bottom bezel) of the final portrait panel.
///
/// Fractional panels are refused rather than rounded: a one-pixel drift
/// would misalign every seam on the wall.
pub fn plan(dimensions: Dimensions, bezels: BezelConfig) -> Result<LayoutPlan, GeometryError> {
    if dimensions.width == 0 || dimensions.height == 0 {
        return Err(GeometryError::EmptyFrame);
    }

    let panels = PANEL_COUNT as u32;
    let orientation = dimensions.orientation();

    // Both axes must divide exactly, the split axis is reported first.
    let (split_axis, split_value, other_axis, other_value) = match orientation {
        Orientation::Wide => (Axis::Width, dimensions.width, Axis::Height, dimensions.height),
        Orientation::Tall => (Axis::Height, dimensions.height, Axis::Width, dimensions.width),
    };
    for (axis, value) in [(split_axis, split_value), (other_axis, other_value)] {
        if value % panels != 0 {
            return Err(GeometryError::NotDivisible {
                axis,
                value,
                panels: PANEL_COUNT,
            });
        }
    }
    let slice = split_value / panels;

    // Post-rotation size of one panel.
    let (panel_width, panel_height) = match orientation {
        Orientation::Wide => (slice, dimensions.height),
        Orientation::Tall => (slice, dimensions.width),
    };

    if bezels.total() >= u64::from(panel_width) {
        return Err(GeometryError::BezelTooWide {
            top: bezels.top_bezel_px,
            bottom: bezels.bottom_bezel_px,
            panel_width,
        });
    }

    let crop = BezelCrop {
        left_px: bezels.top_bezel_px,
        right_px: bezels.bottom_bezel_px,
    };

    let panel_plans: [PanelPlan; PANEL_COUNT] = std::array::from_fn(|index| {
        let offset = index as u32 * slice;
        let source_rect = match orientation {
            Orientation::Wide => Rect::new(offset, 0, slice, dimensions.height),
            Orientation::Tall => Rect::new(0, offset, dimensions.width, slice),
        };
        PanelPlan {
            index,
            source_rect,
            rotate_90_ccw: orientation == Orientation::Tall,
            crop_after_rotate: crop,
        }
    });

    // Bezel total is below panel_width, so this cannot underflow.
    let cropped_width = panel_width - bezels.top_bezel_px - bezels.bottom_bezel_px;

    let plan = LayoutPlan {
        orientation,
        source: dimensions,
        bezels,
        panel_width,
        panel_height,
        panels: panel_plans,
        output: OutputSpec {
            width: cropped_width * panels,
            height: panel_height,
        },
    };

    debug_assert!(tiles_frame(&plan), "panel rectangles must tile the source frame");
    Ok(plan)
}

/// Whether the panels' source rectangles cover the frame exactly once.
pub fn tiles_frame(plan: &LayoutPlan) -> bool {
    let frame_area = u64::from(plan.source.width) * u64::from(plan.source.height);

    let inside = plan
        .panels
        .iter()
        .all(|p| p.source_rect.fits_within(plan.source) && p.source_rect.area() > 0);
    if !inside {
        return false;
    }

    let disjoint = plan.panels.iter().enumerate().all(|(i, a)| {
        plan.panels[i + 1..]
            .iter()
            .all(|b| !a.source_rect.overlaps(&b.source_rect))
    });

    // Disjoint rectangles inside the frame whose areas sum to the frame's
    // area cover every pixel.
    let covered: u64 = plan.panels.iter().map(|p| p.source_rect.area()).sum();
    disjoint && covered == frame_area
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_wall_capture() {
        let plan = plan(Dimensions::new(8640, 3840), BezelConfig::new(16, 21)).unwrap();

        assert_eq!(plan.orientation, Orientation::Wide);
        assert_eq!(plan.panel_width, 2160);
        assert_eq!(plan.panel_height, 3840);
        assert_eq!(plan.output, OutputSpec { width: 8492, height: 3840 });

        for (i, panel) in plan.panels.iter().enumerate() {
            assert_eq!(panel.index, i);
            assert!(!panel.rotate_90_ccw);
            assert_eq!(panel.source_rect, Rect::new(i as u32 * 2160, 0, 2160, 3840));
            assert_eq!(panel.crop_after_rotate, BezelCrop { left_px: 16, right_px: 21 });
            assert_eq!(panel.cropped_width(), 2123);
        }
    }

    #[test]
    fn test_tall_wall_capture() {
        let plan = plan(Dimensions::new(3840, 8640), BezelConfig::new(16, 21)).unwrap();

        assert_eq!(plan.orientation, Orientation::Tall);
        assert_eq!(plan.panel_width, 2160);
        assert_eq!(plan.panel_height, 3840);
        assert_eq!(plan.output, OutputSpec { width: 8492, height: 3840 });

        for (i, panel) in plan.panels.iter().enumerate() {
            assert!(panel.rotate_90_ccw);
            assert_eq!(panel.source_rect, Rect::new(0, i as u32 * 2160, 3840, 2160));
            assert_eq!(panel.oriented_size(), Dimensions::new(2160, 3840));
            // Bezels are expressed in the rotated frame, same as the wide case
            assert_eq!(panel.crop_after_rotate, BezelCrop { left_px: 16, right_px: 21 });
        }
    }

    #[test]
    fn test_square_frame_is_wide() {
        let plan = plan(Dimensions::new(400, 400), BezelConfig::new(0, 0)).unwrap();
        assert_eq!(plan.orientation, Orientation::Wide);
        assert_eq!(plan.output, OutputSpec { width: 400, height: 400 });
    }

    #[test]
    fn test_wide_output_formula() {
        for (w, h, top, bottom) in [(1920, 1080, 0, 0), (4000, 900, 10, 3), (8640, 3840, 100, 0)] {
            let plan = plan(Dimensions::new(w, h), BezelConfig::new(top, bottom)).unwrap();
            assert_eq!(plan.output.width, 4 * (w / 4 - top - bottom));
            assert_eq!(plan.output.height, h);
            assert!(plan.panels.iter().all(|p| p.source_rect.width == w / 4));
        }
    }

    #[test]
    fn test_tall_output_formula() {
        for (w, h, top, bottom) in [(1080, 1920, 0, 0), (900, 4000, 7, 9), (3840, 8640, 0, 100)] {
            let plan = plan(Dimensions::new(w, h), BezelConfig::new(top, bottom)).unwrap();
            assert_eq!(plan.output.width, 4 * (h / 4 - top - bottom));
            assert_eq!(plan.output.height, w);
            assert!(plan.panels.iter().all(|p| p.rotate_90_ccw));
        }
    }

    #[test]
    fn test_panels_tile_the_frame() {
        for dims in [
            Dimensions::new(8640, 3840),
            Dimensions::new(3840, 8640),
            Dimensions::new(8, 4),
            Dimensions::new(4, 8),
        ] {
            let plan = plan(dims, BezelConfig::new(0, 0)).unwrap();
            assert!(tiles_frame(&plan), "{} should tile", dims);
        }
    }

    #[test]
    fn test_tiling_detects_gap_and_overlap() {
        let mut plan = plan(Dimensions::new(8640, 3840), BezelConfig::default()).unwrap();
        plan.panels[1].source_rect.x += 1;
        assert!(!tiles_frame(&plan));

        plan.panels[1].source_rect.x -= 2;
        assert!(!tiles_frame(&plan));
    }

    #[test]
    fn test_rejects_indivisible_width() {
        let err = plan(Dimensions::new(8642, 3840), BezelConfig::default()).unwrap_err();
        assert_eq!(
            err,
            GeometryError::NotDivisible { axis: Axis::Width, value: 8642, panels: 4 }
        );
    }

    #[test]
    fn test_rejects_indivisible_height() {
        let err = plan(Dimensions::new(3840, 8642), BezelConfig::default()).unwrap_err();
        assert!(matches!(err, GeometryError::NotDivisible { axis: Axis::Height, .. }));
    }

    #[test]
    fn test_rejects_indivisible_cross_axis() {
        for (dims, axis, value) in [
            (Dimensions::new(8640, 3842), Axis::Height, 3842),
            (Dimensions::new(8640, 3841), Axis::Height, 3841),
            (Dimensions::new(3841, 8640), Axis::Width, 3841),
            (Dimensions::new(3842, 8640), Axis::Width, 3842),
        ] {
            assert_eq!(
                plan(dims, BezelConfig::default()),
                Err(GeometryError::NotDivisible { axis, value, panels: 4 }),
                "{} should be refused",
                dims
            );
        }
    }

    #[test]
    fn test_rejects_bezels_covering_panel() {
        let err = plan(Dimensions::new(8640, 3840), BezelConfig::new(2000, 160)).unwrap_err();
        assert_eq!(
            err,
            GeometryError::BezelTooWide { top: 2000, bottom: 160, panel_width: 2160 }
        );

        // One pixel left is still a valid panel
        let plan = plan(Dimensions::new(8640, 3840), BezelConfig::new(2000, 159)).unwrap();
        assert_eq!(plan.output.width, 4);
    }

    #[test]
    fn test_rejects_huge_bezels_without_overflow() {
        let err = plan(Dimensions::new(8640, 3840), BezelConfig::new(u32::MAX, u32::MAX));
        assert!(matches!(err, Err(GeometryError::BezelTooWide { .. })));
    }

    #[test]
    fn test_rejects_empty_frame() {
        assert_eq!(
            plan(Dimensions::new(0, 3840), BezelConfig::default()),
            Err(GeometryError::EmptyFrame)
        );
    }

    #[test]
    fn test_zero_bezels_pass_through() {
        let plan = plan(Dimensions::new(8640, 3840), BezelConfig::new(0, 0)).unwrap();
        assert_eq!(plan.output, OutputSpec { width: 8640, height: 3840 });
    }
}
