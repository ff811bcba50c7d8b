//! Audio analysis source and its scoped acquisition guard.

use crate::error::AvatarError;

/// Pull-based time-domain audio analysis source (e.g. an analyser node tap).
pub trait AudioSource {
    /// Fill `out` with the most recent samples in `[-1, 1]`.
    fn read_time_domain(&mut self, out: &mut [f32]) -> Result<(), AvatarError>;

    /// Release the underlying analysis resources. Called exactly once.
    fn close(&mut self) {}
}

/// Owns an attached [`AudioSource`]; dropping the tap closes the source.
pub struct AudioTap {
    source: Box<dyn AudioSource>,
}

impl AudioTap {
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self { source }
    }

    pub fn read(&mut self, out: &mut [f32]) -> Result<(), AvatarError> {
        self.source.read_time_domain(out)
    }
}

impl Drop for AudioTap {
    fn drop(&mut self) {
        self.source.close();
        tracing::debug!("audio tap closed");
    }
}

impl std::fmt::Debug for AudioTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTap").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Probe {
        closed: Rc<Cell<u32>>,
    }

    impl AudioSource for Probe {
        fn read_time_domain(&mut self, out: &mut [f32]) -> Result<(), AvatarError> {
            out.fill(0.5);
            Ok(())
        }
        fn close(&mut self) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    #[test]
    fn dropping_tap_closes_source_once() {
        let closed = Rc::new(Cell::new(0));
        let mut tap = AudioTap::new(Box::new(Probe {
            closed: closed.clone(),
        }));
        let mut buf = [0.0; 4];
        tap.read(&mut buf).unwrap();
        assert_eq!(buf, [0.5; 4]);
        drop(tap);
        assert_eq!(closed.get(), 1);
    }
}
