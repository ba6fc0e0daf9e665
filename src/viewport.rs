//! Which frame the viewer shows.
//!
//! `ViewportIndex` is the pure clamp over the mirror window. `ScrollState`
//! turns held arrow keys into a velocity that ramps up one frame per tick,
//! and `Viewport` ties both to the window the mirror reports on refresh.

use crate::store::{FrameId, Window};

/// Fastest scroll speed in frames per tick.
pub const MAX_VELOCITY: i64 = 4;

/// Frames moved per wheel notch.
pub const WHEEL_STEP: i64 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportIndex {
    window: Option<Window>,
}

impl ViewportIndex {
    pub fn new(window: Option<Window>) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// `requested` pulled into `[min, max]`; `None` while the mirror is empty.
    pub fn clamp(&self, requested: i64) -> Option<FrameId> {
        let w = self.window?;
        let clamped = i128::from(requested).clamp(i128::from(w.min), i128::from(w.max));
        Some(clamped as FrameId)
    }

    pub fn advance(&self, current: FrameId, velocity: i64) -> Option<FrameId> {
        let target = i128::from(current) + i128::from(velocity);
        self.clamp(target.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Back,
    Forward,
}

impl Direction {
    fn sign(self) -> i64 {
        match self {
            Self::Back => -1,
            Self::Forward => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollState {
    held: Option<Direction>,
    velocity: i64,
}

impl ScrollState {
    pub fn press(&mut self, direction: Direction) {
        self.held = Some(direction);
    }

    pub fn release(&mut self) {
        self.held = None;
    }

    pub fn velocity(&self) -> i64 {
        self.velocity
    }

    /// Advances the ramp by one tick and returns the new velocity.
    pub fn tick(&mut self) -> i64 {
        self.velocity = match self.held {
            Some(dir) => (self.velocity + dir.sign()).clamp(-MAX_VELOCITY, MAX_VELOCITY),
            None => 0,
        };
        self.velocity
    }
}

/// Current frame of the viewer. With `follow` set, every refresh jumps to the
/// newest frame until the user scrolls.
#[derive(Debug, Clone, Default)]
pub struct Viewport {
    index: ViewportIndex,
    current: Option<FrameId>,
    scroll: ScrollState,
    follow: bool,
}

impl Viewport {
    pub fn new(follow: bool) -> Self {
        Self {
            follow,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<FrameId> {
        self.current
    }

    pub fn index(&self) -> &ViewportIndex {
        &self.index
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    pub fn set_follow(&mut self, follow: bool) {
        self.follow = follow;
        if follow {
            self.current = self.index.window().map(|w| w.max);
        }
    }

    /// Takes the mirror's latest window and re-clamps the current frame.
    pub fn refresh(&mut self, window: Option<Window>) -> Option<FrameId> {
        self.index = ViewportIndex::new(window);
        self.current = match (self.follow, self.current, window) {
            (_, _, None) => None,
            (true, _, Some(w)) => Some(w.max),
            (false, None, Some(w)) => Some(w.min),
            (false, Some(id), Some(_)) => self.index.advance(id, 0),
        };
        self.current
    }

    pub fn scroll(&mut self) -> &mut ScrollState {
        &mut self.scroll
    }

    /// One render tick: applies the scroll velocity.
    pub fn tick(&mut self) -> Option<FrameId> {
        let velocity = self.scroll.tick();
        if velocity != 0 {
            self.step(velocity);
        }
        self.current
    }

    /// Mouse wheel: `up` moves toward newer frames.
    pub fn wheel(&mut self, up: bool) -> Option<FrameId> {
        self.step(if up { WHEEL_STEP } else { -WHEEL_STEP });
        self.current
    }

    fn step(&mut self, delta: i64) {
        self.follow = false;
        if let Some(id) = self.current {
            self.current = self.index.advance(id, delta);
        }
    }
}
