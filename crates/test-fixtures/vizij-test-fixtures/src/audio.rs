use std::cell::Cell;
use std::rc::Rc;

use vizij_avatar_core::{AudioSource, AvatarError};

/// Fills every buffer with one sample value (RMS = |level|).
#[derive(Debug, Clone)]
pub struct ConstantAudio {
    level: Rc<Cell<f32>>,
    closed: Rc<Cell<u32>>,
}

impl ConstantAudio {
    pub fn new(level: f32) -> Self {
        Self {
            level: Rc::new(Cell::new(level)),
            closed: Rc::new(Cell::new(0)),
        }
    }

    /// Change the level seen by every clone of this source.
    pub fn set_level(&self, level: f32) {
        self.level.set(level);
    }

    /// How many times `close` ran across clones.
    pub fn closed(&self) -> u32 {
        self.closed.get()
    }
}

impl AudioSource for ConstantAudio {
    fn read_time_domain(&mut self, out: &mut [f32]) -> Result<(), AvatarError> {
        out.fill(self.level.get());
        Ok(())
    }

    fn close(&mut self) {
        self.closed.set(self.closed.get() + 1);
    }
}

/// Source whose reads always fail.
#[derive(Debug, Clone, Default)]
pub struct FailingAudio {
    closed: Rc<Cell<u32>>,
}

impl FailingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closed(&self) -> u32 {
        self.closed.get()
    }
}

impl AudioSource for FailingAudio {
    fn read_time_domain(&mut self, _out: &mut [f32]) -> Result<(), AvatarError> {
        Err(AvatarError::audio("analyser disconnected"))
    }

    fn close(&mut self) {
        self.closed.set(self.closed.get() + 1);
    }
}
