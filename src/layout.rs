// 📏 Layout Engine - score → position on the timeline
//
// Scores live in [0, 1]; offsets live in viewport-relative units (vh on the
// web page, percent-of-rows in the terminal). Near-collisions between pins are
// resolved with a greedy left/right stagger over the sorted offsets.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

use crate::db::Entity;

/// Score used when an entity has none (or it is NaN)
pub const MIDPOINT: f64 = 0.5;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Total height of the page, in viewport units
    pub page_height: f64,

    /// Gap above score 0, in viewport units
    pub top_margin: f64,

    /// Gap below score 1, in viewport units
    pub bottom_margin: f64,

    /// Neighbours closer than this (viewport units) get staggered
    pub proximity_threshold: f64,

    /// Lateral stagger size, in pixels (columns in the terminal)
    pub stagger_magnitude: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_height: 200.0,
            top_margin: 15.0,
            bottom_margin: 15.0,
            proximity_threshold: 2.0,
            stagger_magnitude: 10.0,
        }
    }
}

impl LayoutConfig {
    pub fn usable_range(&self) -> f64 {
        self.page_height - self.top_margin - self.bottom_margin
    }

    pub fn validate(&self) -> Result<()> {
        let values = [
            ("page_height", self.page_height),
            ("top_margin", self.top_margin),
            ("bottom_margin", self.bottom_margin),
            ("proximity_threshold", self.proximity_threshold),
            ("stagger_magnitude", self.stagger_magnitude),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                bail!("layout.{} must be a non-negative number, got {}", name, value);
            }
        }
        if self.usable_range() < 0.0 {
            bail!(
                "layout margins ({} + {}) exceed page height {}",
                self.top_margin,
                self.bottom_margin,
                self.page_height
            );
        }
        Ok(())
    }

    /// Offset of a stored score on this page
    pub fn offset_for(&self, score: Option<f64>) -> f64 {
        compute_position(effective_score(score), self.top_margin, self.usable_range())
    }
}

/// Pixel size of the surface the layout is drawn on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Viewport-relative units → absolute pixels
    pub fn vh_to_px(&self, vh: f64) -> f64 {
        vh * self.height / 100.0
    }
}

// ============================================================================
// POSITIONING
// ============================================================================

/// Score actually used for layout: missing/NaN → midpoint, else clamped to [0, 1]
pub fn effective_score(score: Option<f64>) -> f64 {
    match score {
        Some(s) if !s.is_nan() => s.clamp(0.0, 1.0),
        _ => MIDPOINT,
    }
}

/// Linear interpolation along the usable range. Total over all f64 input.
pub fn compute_position(score: f64, top_margin: f64, usable_range: f64) -> f64 {
    top_margin + effective_score(Some(score)) * usable_range
}

/// Entity with its place on the timeline. Recomputed every render, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedEntity {
    #[serde(flatten)]
    pub entity: Entity,

    /// Offset from the top of the page, viewport units
    pub offset_vh: f64,

    /// Horizontal nudge away from the axis (negative = left)
    pub stagger_px: f64,
}

impl PositionedEntity {
    pub fn id(&self) -> &str {
        &self.entity.id
    }

    pub fn y_px(&self, viewport: &Viewport) -> f64 {
        viewport.vh_to_px(self.offset_vh)
    }
}

/// Stable ascending order of offsets. Ties keep input order.
fn sorted_offsets(entities: &[Entity], config: &LayoutConfig) -> Vec<(usize, f64)> {
    let mut offsets: Vec<(usize, f64)> = entities
        .iter()
        .enumerate()
        .map(|(i, e)| (i, config.offset_for(e.score)))
        .collect();
    offsets.sort_by(|a, b| a.1.total_cmp(&b.1));
    offsets
}

/// Stagger per input index, walking neighbours in sorted order.
///
/// Only the immediately preceding neighbour is looked at, so three or more
/// pins inside one threshold window can still overlap.
fn staggers(entities: &[Entity], config: &LayoutConfig) -> Vec<f64> {
    let mut result = vec![0.0; entities.len()];
    let mut toggle = -1.0;
    let mut previous: Option<f64> = None;

    for (index, offset) in sorted_offsets(entities, config) {
        let close = previous.is_some_and(|prev| offset - prev < config.proximity_threshold);

        if close {
            toggle = -toggle;
            result[index] = toggle * config.stagger_magnitude;
        } else {
            toggle = -1.0;
            result[index] = 0.0;
        }

        previous = Some(offset);
    }

    result
}

/// Lateral stagger for every entity id
pub fn resolve_collisions(entities: &[Entity], config: &LayoutConfig) -> HashMap<String, f64> {
    entities
        .iter()
        .zip(staggers(entities, config))
        .map(|(e, stagger)| (e.id.clone(), stagger))
        .collect()
}

/// Position every entity, keeping input order
pub fn layout_entities(entities: &[Entity], config: &LayoutConfig) -> Vec<PositionedEntity> {
    let positioned: Vec<PositionedEntity> = entities
        .iter()
        .zip(staggers(entities, config))
        .map(|(e, stagger_px)| PositionedEntity {
            entity: e.clone(),
            offset_vh: config.offset_for(e.score),
            stagger_px,
        })
        .collect();

    trace!(count = positioned.len(), "layout recomputed");
    positioned
}

/// Same as [`layout_entities`] but ordered top to bottom
pub fn layout_sorted(entities: &[Entity], config: &LayoutConfig) -> Vec<PositionedEntity> {
    let mut positioned = layout_entities(entities, config);
    positioned.sort_by(|a, b| a.offset_vh.total_cmp(&b.offset_vh));
    positioned
}

// ============================================================================
// HIT TEST
// ============================================================================

/// Entity whose pin is vertically closest to the pointer, if within `threshold_px`.
/// Ties go to whichever comes first in list order.
pub fn hit_test<'a>(
    pointer_y: f64,
    positioned: &'a [PositionedEntity],
    viewport: &Viewport,
    threshold_px: f64,
) -> Option<&'a str> {
    let mut best: Option<(&'a str, f64)> = None;

    for p in positioned {
        let distance = (p.y_px(viewport) - pointer_y).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((p.id(), distance)),
        }
    }

    best.filter(|(_, distance)| *distance <= threshold_px)
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entity(id: &str, score: Option<f64>) -> Entity {
        Entity {
            id: id.to_string(),
            name: id.to_uppercase(),
            score,
            count: 1,
            reason: String::new(),
            image_url: String::new(),
        }
    }

    #[test]
    fn test_position_endpoints() {
        let config = LayoutConfig::default();
        assert_eq!(config.usable_range(), 170.0);
        assert_eq!(compute_position(0.0, 15.0, 170.0), 15.0);
        assert_eq!(compute_position(1.0, 15.0, 170.0), 185.0);
        assert_eq!(compute_position(0.5, 15.0, 170.0), 100.0);
    }

    #[test]
    fn test_effective_score_defaults_and_clamps() {
        assert_eq!(effective_score(None), 0.5);
        assert_eq!(effective_score(Some(f64::NAN)), 0.5);
        assert_eq!(effective_score(Some(-3.0)), 0.0);
        assert_eq!(effective_score(Some(7.0)), 1.0);
        assert_eq!(effective_score(Some(f64::INFINITY)), 1.0);
        assert_eq!(effective_score(Some(0.25)), 0.25);
    }

    #[test]
    fn test_close_pair_is_staggered() {
        let config = LayoutConfig::default();
        // 0.50 → 100vh, 0.505 → 100.85vh
        let entities = vec![entity("a", Some(0.5)), entity("b", Some(0.505))];

        let staggers = resolve_collisions(&entities, &config);

        assert_eq!(staggers["a"], 0.0);
        assert_eq!(staggers["b"], 10.0);
    }

    #[test]
    fn test_distant_pair_is_not_staggered() {
        let config = LayoutConfig::default();
        let entities = vec![entity("a", Some(0.2)), entity("b", Some(0.8))];

        let staggers = resolve_collisions(&entities, &config);

        assert_eq!(staggers["a"], 0.0);
        assert_eq!(staggers["b"], 0.0);
    }

    #[test]
    fn test_pair_exactly_threshold_apart_is_not_staggered() {
        let config = LayoutConfig {
            page_height: 10.0,
            top_margin: 0.0,
            bottom_margin: 0.0,
            proximity_threshold: 5.0,
            stagger_magnitude: 10.0,
        };
        // 0.0 → 0vh, 0.5 → 5vh: gap equals the threshold
        let entities = vec![entity("a", Some(0.0)), entity("b", Some(0.5))];
        let staggers = resolve_collisions(&entities, &config);
        assert_eq!(staggers["b"], 0.0);

        // 0.25 → 2.5vh: just inside
        let entities = vec![entity("a", Some(0.0)), entity("b", Some(0.25))];
        let staggers = resolve_collisions(&entities, &config);
        assert_eq!(staggers["b"], 10.0);
    }

    #[test]
    fn test_chain_alternates_sides() {
        let config = LayoutConfig::default();
        // Each step is 1.7vh, every neighbour is within the 2vh threshold
        let entities = vec![
            entity("d", Some(0.53)),
            entity("a", Some(0.50)),
            entity("c", Some(0.52)),
            entity("b", Some(0.51)),
        ];

        let staggers = resolve_collisions(&entities, &config);

        assert_eq!(staggers["a"], 0.0);
        assert_eq!(staggers["b"], 10.0);
        assert_eq!(staggers["c"], -10.0);
        assert_eq!(staggers["d"], 10.0);
    }

    #[test]
    fn test_toggle_resets_after_gap() {
        let config = LayoutConfig::default();
        let entities = vec![
            entity("a", Some(0.10)),
            entity("b", Some(0.105)),
            entity("c", Some(0.60)),
            entity("d", Some(0.605)),
        ];

        let staggers = resolve_collisions(&entities, &config);

        assert_eq!(staggers["b"], 10.0);
        assert_eq!(staggers["c"], 0.0);
        assert_eq!(staggers["d"], 10.0);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let config = LayoutConfig::default();
        let entities = vec![entity("first", Some(0.3)), entity("second", Some(0.3))];

        let staggers = resolve_collisions(&entities, &config);

        assert_eq!(staggers["first"], 0.0);
        assert_eq!(staggers["second"], 10.0);
    }

    #[test]
    fn test_missing_scores_collide_at_midpoint() {
        let config = LayoutConfig::default();
        let entities = vec![entity("a", None), entity("b", Some(f64::NAN))];

        let positioned = layout_entities(&entities, &config);

        assert_eq!(positioned[0].offset_vh, 100.0);
        assert_eq!(positioned[1].offset_vh, 100.0);
        assert_eq!(positioned[1].stagger_px, 10.0);
    }

    #[test]
    fn test_layout_keeps_input_order() {
        let config = LayoutConfig::default();
        let entities = vec![entity("low", Some(0.9)), entity("high", Some(0.1))];

        let positioned = layout_entities(&entities, &config);
        assert_eq!(positioned[0].id(), "low");

        let sorted = layout_sorted(&entities, &config);
        assert_eq!(sorted[0].id(), "high");
    }

    #[test]
    fn test_hit_test_nearest_within_threshold() {
        let config = LayoutConfig::default();
        let viewport = Viewport::new(1280.0, 1000.0);
        // offsets 100vh → 1000px, 185vh → 1850px
        let positioned = layout_entities(
            &[entity("mid", Some(0.5)), entity("bottom", Some(1.0))],
            &config,
        );

        assert_eq!(hit_test(1010.0, &positioned, &viewport, 40.0), Some("mid"));
        assert_eq!(hit_test(1830.0, &positioned, &viewport, 40.0), Some("bottom"));
        assert_eq!(hit_test(1400.0, &positioned, &viewport, 40.0), None);
    }

    #[test]
    fn test_hit_test_tie_goes_to_list_order() {
        let config = LayoutConfig::default();
        let viewport = Viewport::new(1280.0, 1000.0);
        let positioned = layout_entities(
            &[entity("later", Some(0.5)), entity("earlier", Some(0.5))],
            &config,
        );

        assert_eq!(hit_test(1000.0, &positioned, &viewport, 5.0), Some("later"));
    }

    #[test]
    fn test_hit_test_empty() {
        let viewport = Viewport::new(100.0, 100.0);
        assert_eq!(hit_test(50.0, &[], &viewport, 1000.0), None);
    }

    #[test]
    fn test_validate_rejects_bad_margins() {
        let config = LayoutConfig {
            top_margin: 150.0,
            bottom_margin: 60.0,
            ..LayoutConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(LayoutConfig::default().validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_position_is_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(compute_position(lo, 15.0, 170.0) <= compute_position(hi, 15.0, 170.0));
        }

        #[test]
        fn prop_position_stays_on_timeline(score in proptest::num::f64::ANY) {
            let offset = compute_position(score, 15.0, 170.0);
            prop_assert!((15.0..=185.0).contains(&offset));
        }

        #[test]
        fn prop_collisions_are_deterministic(scores in proptest::collection::vec(0.0f64..=1.0, 0..40)) {
            let config = LayoutConfig::default();
            let entities: Vec<Entity> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| entity(&format!("e{}", i), Some(*s)))
                .collect();

            prop_assert_eq!(
                resolve_collisions(&entities, &config),
                resolve_collisions(&entities, &config)
            );
        }
    }
}
