//! Collapse/expand height transition for a fence.
//!
//! The engine owns the collapsed flag, the cached expanded height, and the
//! min/max height constraints the window must honour. Time is passed in by the
//! caller so the animation is driven by whatever timer the host uses.

use std::time::{Duration, Instant};

/// Maximum window height used as "no upper bound".
pub const UNBOUNDED_HEIGHT: i32 = 16_777_215;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapseConfig {
    pub collapsed_height: i32,
    pub min_expanded_height: i32,
    pub fallback_expanded_height: i32,
    pub duration: Duration,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            collapsed_height: 32,
            min_expanded_height: 64,
            fallback_expanded_height: 200,
            duration: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightConstraints {
    pub min: i32,
    pub max: i32,
}

impl HeightConstraints {
    const LIFTED: Self = Self { min: 0, max: UNBOUNDED_HEIGHT };
}

/// One animation step the host should apply to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub height: i32,
    pub finished: bool,
}

/// Ease-out cubic (fast start, decelerates).
fn ease_out(t: f64) -> f64 {
    let t1 = t - 1.0;
    (t1 * t1).mul_add(t1, 1.0)
}

#[derive(Debug, Clone, Copy)]
struct HeightAnimation {
    from: i32,
    to: i32,
    started: Instant,
    duration: Duration,
}

impl HeightAnimation {
    fn frame(&self, now: Instant) -> Frame {
        let elapsed = now.saturating_duration_since(self.started);
        if self.duration.is_zero() || elapsed >= self.duration {
            return Frame { height: self.to, finished: true };
        }
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        let span = f64::from(self.to - self.from);
        let height = f64::from(self.from) + span * ease_out(t);
        Frame { height: height.round() as i32, finished: false }
    }
}

#[derive(Debug, Clone)]
pub struct CollapseEngine {
    config: CollapseConfig,
    collapsed: bool,
    expanded_height: i32,
    content_visible: bool,
    constraints: HeightConstraints,
    animation: Option<HeightAnimation>,
}

impl CollapseEngine {
    /// An expanded fence.
    pub fn new(config: CollapseConfig, expanded_height: i32) -> Self {
        let mut engine = Self {
            config,
            collapsed: false,
            expanded_height,
            content_visible: true,
            constraints: HeightConstraints::LIFTED,
            animation: None,
        };
        engine.constraints = engine.settled_constraints();
        engine
    }

    /// Rebuild the state a fence was saved in, without animating.
    pub fn restored(config: CollapseConfig, collapsed: bool, expanded_height: i32) -> Self {
        let mut engine = Self::new(config, expanded_height);
        engine.collapsed = collapsed;
        engine.content_visible = !collapsed;
        engine.constraints = engine.settled_constraints();
        engine
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn expanded_height(&self) -> i32 {
        self.expanded_height
    }

    pub fn content_visible(&self) -> bool {
        self.content_visible
    }

    pub fn constraints(&self) -> HeightConstraints {
        self.constraints
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    pub fn collapsed_height(&self) -> i32 {
        self.config.collapsed_height
    }

    /// Height the fence has once it is at rest in its current state.
    pub fn resting_height(&self) -> i32 {
        if self.collapsed {
            self.config.collapsed_height
        } else {
            self.usable_expanded_height(self.expanded_height)
        }
    }

    fn usable_expanded_height(&self, height: i32) -> i32 {
        if height < self.config.min_expanded_height {
            self.config.fallback_expanded_height
        } else {
            height
        }
    }

    fn settled_constraints(&self) -> HeightConstraints {
        if self.collapsed {
            HeightConstraints { min: self.config.collapsed_height, max: self.config.collapsed_height }
        } else {
            HeightConstraints { min: self.config.min_expanded_height, max: UNBOUNDED_HEIGHT }
        }
    }

    /// Start collapsing. Returns `false` when already collapsed.
    pub fn collapse(&mut self, current_height: i32, now: Instant) -> bool {
        if self.collapsed {
            return false;
        }
        self.collapsed = true;
        self.expanded_height = self.usable_expanded_height(current_height);
        self.content_visible = false;
        self.start(current_height, self.config.collapsed_height, now);
        true
    }

    /// Start expanding. Returns `false` when already expanded.
    pub fn expand(&mut self, current_height: i32, now: Instant) -> bool {
        if !self.collapsed {
            return false;
        }
        self.collapsed = false;
        self.expanded_height = self.usable_expanded_height(self.expanded_height);
        self.content_visible = true;
        self.start(current_height, self.expanded_height, now);
        true
    }

    pub fn toggle(&mut self, current_height: i32, now: Instant) {
        if self.collapsed {
            self.expand(current_height, now);
        } else {
            self.collapse(current_height, now);
        }
    }

    fn start(&mut self, from: i32, to: i32, now: Instant) {
        self.constraints = HeightConstraints::LIFTED;
        self.animation = Some(HeightAnimation { from, to, started: now, duration: self.config.duration });
    }

    /// Advance the running animation. Final constraints are applied on the
    /// frame that finishes it.
    pub fn sample(&mut self, now: Instant) -> Option<Frame> {
        let frame = self.animation?.frame(now);
        if frame.finished {
            self.animation = None;
            self.constraints = self.settled_constraints();
        }
        Some(frame)
    }

    /// Track user resizes so un-collapsing returns to the latest height.
    pub fn note_resized(&mut self, height: i32) {
        if !self.collapsed && self.animation.is_none() {
            self.expanded_height = height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finish(engine: &mut CollapseEngine, start: Instant) -> Frame {
        engine.sample(start + Duration::from_millis(200)).expect("animation running")
    }

    #[test]
    fn test_collapse_then_expand_returns_to_original_height() {
        let mut engine = CollapseEngine::new(CollapseConfig::default(), 200);
        let t0 = Instant::now();

        assert!(engine.collapse(200, t0));
        assert!(!engine.content_visible());
        assert_eq!(engine.expanded_height(), 200);
        assert_eq!(engine.constraints(), HeightConstraints { min: 0, max: UNBOUNDED_HEIGHT });

        let frame = finish(&mut engine, t0);
        assert_eq!(frame, Frame { height: 32, finished: true });
        assert_eq!(engine.constraints(), HeightConstraints { min: 32, max: 32 });

        let t1 = t0 + Duration::from_secs(1);
        assert!(engine.expand(32, t1));
        assert!(engine.content_visible());
        let frame = finish(&mut engine, t1);
        assert_eq!(frame.height, 200);
        assert_eq!(engine.constraints().min, 64);
        assert!(!engine.is_animating());
    }

    #[test]
    fn test_repeated_collapse_is_noop() {
        let mut engine = CollapseEngine::new(CollapseConfig::default(), 200);
        let t0 = Instant::now();
        assert!(engine.collapse(200, t0));
        finish(&mut engine, t0);
        assert!(!engine.collapse(32, t0));
        assert!(engine.sample(t0).is_none());
        assert_eq!(engine.expanded_height(), 200);

        assert!(engine.expand(32, t0));
        finish(&mut engine, t0);
        assert!(!engine.expand(200, t0));
    }

    #[test]
    fn test_small_height_falls_back() {
        let mut engine = CollapseEngine::new(CollapseConfig::default(), 50);
        let t0 = Instant::now();
        engine.collapse(50, t0);
        assert_eq!(engine.expanded_height(), 200);
    }

    #[test]
    fn test_mid_animation_is_eased() {
        let mut engine = CollapseEngine::new(CollapseConfig::default(), 232);
        let t0 = Instant::now();
        engine.collapse(232, t0);
        let frame = engine.sample(t0 + Duration::from_millis(100)).expect("running");
        assert!(!frame.finished);
        // ease-out covers 87.5% of the distance at the halfway point
        assert_eq!(frame.height, 57);
    }

    #[test]
    fn test_restored_collapsed_state() {
        let engine = CollapseEngine::restored(CollapseConfig::default(), true, 300);
        assert!(engine.is_collapsed());
        assert!(!engine.content_visible());
        assert_eq!(engine.resting_height(), 32);
        assert_eq!(engine.constraints(), HeightConstraints { min: 32, max: 32 });
    }

    #[test]
    fn test_resize_updates_cache_only_when_expanded() {
        let mut engine = CollapseEngine::new(CollapseConfig::default(), 200);
        engine.note_resized(260);
        assert_eq!(engine.expanded_height(), 260);
        let t0 = Instant::now();
        engine.collapse(260, t0);
        finish(&mut engine, t0);
        engine.note_resized(32);
        assert_eq!(engine.expanded_height(), 260);
    }
}
