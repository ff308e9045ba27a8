// 👆 Hover Tracking - which entity is "active" under the pointer
//
// Recomputed on every pointer move. Frozen while the vote modal is open or
// while the pointer sits over the detail panel to the right of the axis.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::layout::{hit_test, PositionedEntity, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoverConfig {
    /// Max vertical pointer-to-pin distance that still counts as hovering
    pub threshold_px: f64,

    /// Pointer further right of the axis than this is over the detail panel
    pub panel_band_px: f64,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            threshold_px: 48.0,
            panel_band_px: 120.0,
        }
    }
}

impl HoverConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("threshold_px", self.threshold_px),
            ("panel_band_px", self.panel_band_px),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("hover.{} must be a non-negative number, got {}", name, value);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HoverTracker {
    config: HoverConfig,
    active: Option<String>,
    modal_open: bool,
}

impl HoverTracker {
    pub fn new(config: HoverConfig) -> Self {
        Self {
            config,
            active: None,
            modal_open: false,
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_modal_open(&self) -> bool {
        self.modal_open
    }

    /// Whether a pointer at `x` may change the hover right now
    pub fn is_frozen_at(&self, x: f64, axis_x: f64) -> bool {
        self.modal_open || x > axis_x + self.config.panel_band_px
    }

    /// Pointer moved to (x, y). Returns the active entity afterwards.
    pub fn pointer_moved(
        &mut self,
        x: f64,
        y: f64,
        axis_x: f64,
        positioned: &[PositionedEntity],
        viewport: &Viewport,
    ) -> Option<&str> {
        if !self.is_frozen_at(x, axis_x) {
            self.active =
                hit_test(y, positioned, viewport, self.config.threshold_px).map(str::to_string);
        }
        self.active()
    }

    /// Pointer left the surface. The modal keeps its entity.
    pub fn pointer_left(&mut self) {
        if !self.modal_open {
            self.active = None;
        }
    }

    /// Open the vote modal for the active entity, if any
    pub fn open_modal(&mut self) -> Option<&str> {
        if self.active.is_some() {
            self.modal_open = true;
        }
        self.active()
    }

    pub fn close_modal(&mut self) {
        self.modal_open = false;
    }

    /// Force the active entity (keyboard navigation)
    pub fn set_active(&mut self, id: Option<String>) {
        if !self.modal_open {
            self.active = id;
        }
    }

    /// Drop the active entity if it vanished from a refreshed list
    pub fn retain(&mut self, positioned: &[PositionedEntity]) {
        let still_there = self
            .active
            .as_deref()
            .is_some_and(|id| positioned.iter().any(|p| p.id() == id));

        if !still_there {
            self.active = None;
            self.modal_open = false;
        }
    }

    /// Step to the next pin below the active one (in top-to-bottom order)
    pub fn select_next(&mut self, sorted: &[PositionedEntity]) {
        self.step(sorted, 1);
    }

    /// Step to the previous pin above the active one
    pub fn select_previous(&mut self, sorted: &[PositionedEntity]) {
        self.step(sorted, -1);
    }

    fn step(&mut self, sorted: &[PositionedEntity], direction: isize) {
        if self.modal_open || sorted.is_empty() {
            return;
        }

        let len = sorted.len() as isize;
        let current = self
            .active
            .as_deref()
            .and_then(|id| sorted.iter().position(|p| p.id() == id));

        let next = match current {
            Some(i) => (i as isize + direction).rem_euclid(len),
            None if direction > 0 => 0,
            None => len - 1,
        };

        self.active = Some(sorted[next as usize].id().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Entity;
    use crate::layout::{layout_entities, layout_sorted, LayoutConfig};

    fn positioned(scores: &[(&str, f64)]) -> Vec<PositionedEntity> {
        let entities: Vec<Entity> = scores
            .iter()
            .map(|(id, score)| Entity {
                id: id.to_string(),
                name: id.to_string(),
                score: Some(*score),
                count: 1,
                reason: String::new(),
                image_url: String::new(),
            })
            .collect();
        layout_entities(&entities, &LayoutConfig::default())
    }

    fn viewport() -> Viewport {
        Viewport::new(1200.0, 1000.0)
    }

    const AXIS: f64 = 600.0;

    #[test]
    fn test_pointer_move_activates_nearest() {
        let pins = positioned(&[("top", 0.0), ("bottom", 1.0)]);
        let mut tracker = HoverTracker::new(HoverConfig::default());

        // top pin at 15vh → 150px
        assert_eq!(tracker.pointer_moved(AXIS, 160.0, AXIS, &pins, &viewport()), Some("top"));
        // nothing within 48px
        assert_eq!(tracker.pointer_moved(AXIS, 600.0, AXIS, &pins, &viewport()), None);
    }

    #[test]
    fn test_panel_band_freezes_hover() {
        let pins = positioned(&[("top", 0.0), ("bottom", 1.0)]);
        let mut tracker = HoverTracker::new(HoverConfig::default());

        tracker.pointer_moved(AXIS, 150.0, AXIS, &pins, &viewport());
        // moving onto the detail panel, far from any pin vertically
        let active = tracker.pointer_moved(AXIS + 300.0, 900.0, AXIS, &pins, &viewport());

        assert_eq!(active, Some("top"));
    }

    #[test]
    fn test_modal_freezes_hover_and_leave() {
        let pins = positioned(&[("top", 0.0), ("bottom", 1.0)]);
        let mut tracker = HoverTracker::new(HoverConfig::default());

        tracker.pointer_moved(AXIS, 150.0, AXIS, &pins, &viewport());
        assert_eq!(tracker.open_modal(), Some("top"));

        tracker.pointer_moved(AXIS, 1850.0, AXIS, &pins, &viewport());
        tracker.pointer_left();
        assert_eq!(tracker.active(), Some("top"));

        tracker.close_modal();
        tracker.pointer_left();
        assert_eq!(tracker.active(), None);
    }

    #[test]
    fn test_validate_rejects_negative_distances() {
        assert!(HoverConfig::default().validate().is_ok());
        let bad = HoverConfig {
            threshold_px: -1.0,
            ..HoverConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = HoverConfig {
            panel_band_px: f64::NAN,
            ..HoverConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_modal_needs_active_entity() {
        let mut tracker = HoverTracker::new(HoverConfig::default());
        assert_eq!(tracker.open_modal(), None);
        assert!(!tracker.is_modal_open());
    }

    #[test]
    fn test_retain_drops_stale_entity() {
        let pins = positioned(&[("top", 0.0)]);
        let mut tracker = HoverTracker::new(HoverConfig::default());
        tracker.set_active(Some("gone".to_string()));

        tracker.retain(&pins);

        assert_eq!(tracker.active(), None);
    }

    #[test]
    fn test_keyboard_navigation_wraps() {
        let entities: Vec<Entity> = positioned(&[("b", 0.6), ("a", 0.1), ("c", 0.9)])
            .into_iter()
            .map(|p| p.entity)
            .collect();
        let sorted = layout_sorted(&entities, &LayoutConfig::default());
        let mut tracker = HoverTracker::new(HoverConfig::default());

        tracker.select_next(&sorted);
        assert_eq!(tracker.active(), Some("a"));
        tracker.select_next(&sorted);
        assert_eq!(tracker.active(), Some("b"));
        tracker.select_previous(&sorted);
        tracker.select_previous(&sorted);
        assert_eq!(tracker.active(), Some("c"));
    }
}
