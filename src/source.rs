use std::collections::VecDeque;

use crate::frame::Frame;
use crate::Result;

/// A stream of frames
pub trait FrameSource {
    /// Next frame, None at the end of the stream
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Total number of frames when known up front
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

/// Frames held in memory
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: VecDeque<Frame>,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        VecSource {
            frames: frames.into(),
        }
    }
}

impl FrameSource for VecSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }
}
