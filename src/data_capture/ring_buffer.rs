use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::Frame;

/// Fixed-capacity history of the most recent frames of one camera.
///
/// `append` and `snapshot` are serialised by a single mutex so a snapshot
/// never observes a half-applied eviction. The lock is held only for the
/// push/pop or the copy itself.
#[derive(Debug)]
pub struct FrameRingBuffer {
    capacity: usize,
    frames: Mutex<VecDeque<Frame>>,
}

impl FrameRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Stores `frame`, evicting the oldest frame when full.
    pub fn append(&self, frame: Frame) {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        if frames.len() == self.capacity {
            frames.pop_front();
        }
        frames.push_back(frame);
    }

    /// Returns the buffered frames, oldest first.
    pub fn snapshot(&self) -> Vec<Frame> {
        let frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        frames.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn frame(tag: u8) -> Frame {
        Frame::from_rgb(1, 1, vec![tag, tag, tag], Utc::now()).unwrap()
    }

    fn tags(frames: &[Frame]) -> Vec<u8> {
        frames.iter().map(|f| f.data()[0]).collect()
    }

    #[test]
    fn empty_buffer_snapshots_to_nothing() {
        let buffer = FrameRingBuffer::new(4);
        assert!(buffer.snapshot().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn snapshot_holds_last_capacity_frames_in_order() {
        for capacity in [1usize, 3, 10] {
            for appended in 0u8..25 {
                let buffer = FrameRingBuffer::new(capacity);
                for tag in 0..appended {
                    buffer.append(frame(tag));
                }
                let snapshot = buffer.snapshot();
                let kept = (appended as usize).min(capacity);
                assert_eq!(snapshot.len(), kept);
                let expected: Vec<u8> = (appended - kept as u8..appended).collect();
                assert_eq!(tags(&snapshot), expected);
            }
        }
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let buffer = FrameRingBuffer::new(0);
        buffer.append(frame(1));
        buffer.append(frame(2));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(tags(&buffer.snapshot()), vec![2]);
    }

    #[test]
    fn concurrent_snapshots_stay_ordered() {
        let buffer = Arc::new(FrameRingBuffer::new(16));
        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for round in 0..2000u32 {
                    buffer.append(frame((round % 256) as u8));
                }
            })
        };

        for _ in 0..200 {
            let snapshot = tags(&buffer.snapshot());
            for pair in snapshot.windows(2) {
                assert_eq!(pair[1], pair[0].wrapping_add(1));
            }
        }
        writer.join().unwrap();
        assert_eq!(buffer.len(), 16);
    }
}
