//! Bounded audio ingest queue
//!
//! Producers never wait: when the queue is full the oldest frame is dropped
//! and counted.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

use voice_orchestrator_core::AudioFrame;

/// Drop-oldest frame queue with a single consumer
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<AudioFrame>>,
    capacity: usize,
    notify: Notify,
    /// Dropped since the last `take_dropped`
    dropped: AtomicU64,
    dropped_total: AtomicU64,
    closed: AtomicBool,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a frame; returns false once the queue is closed
    pub fn push(&self, frame: AudioFrame) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        {
            let mut frames = self.frames.lock();
            if frames.len() >= self.capacity {
                frames.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.dropped_total.fetch_add(1, Ordering::Relaxed);
            }
            frames.push_back(frame);
        }

        self.notify.notify_one();
        true
    }

    /// Next frame in arrival order; `None` once closed and drained
    pub async fn pop(&self) -> Option<AudioFrame> {
        loop {
            if let Some(frame) = self.frames.lock().pop_front() {
                return Some(frame);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn try_pop(&self) -> Option<AudioFrame> {
        self.frames.lock().pop_front()
    }

    /// Frames dropped since the previous call
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reject further pushes and wake the consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use voice_orchestrator_core::SampleRate;

    fn frame(seq: u64) -> AudioFrame {
        AudioFrame::silence(SampleRate::Hz16000, 10, seq)
    }

    #[test]
    fn test_drop_oldest() {
        let queue = FrameQueue::new(3);
        for seq in 0..5 {
            assert!(queue.push(frame(seq)));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.take_dropped(), 2);
        assert_eq!(queue.take_dropped(), 0);
        assert_eq!(queue.dropped_total(), 2);

        let order: Vec<u64> = std::iter::from_fn(|| queue.try_pop())
            .map(|f| f.sequence)
            .collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(FrameQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await.map(|f| f.sequence) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(frame(9));

        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(9));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = FrameQueue::new(4);
        queue.push(frame(1));
        queue.close();

        assert!(!queue.push(frame(2)));
        assert_eq!(queue.pop().await.map(|f| f.sequence), Some(1));
        assert!(queue.pop().await.is_none());
    }
}
