//! Sample hand-off between the sampler and the render loop

use crate::types::Sample;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

/// Producer side of the sample queue, held by the sampler
pub type SampleSender = Sender<Sample>;

/// Ordered, unbounded queue of samples
///
/// Pushing never blocks. The consumer drains whatever is queued without
/// waiting for new items. The queue lives as long as the session, so a
/// sampler never observes a closed queue while the application runs.
#[derive(Debug, Clone)]
pub struct SampleQueue {
    sender: Sender<Sample>,
    receiver: Receiver<Sample>,
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// A producer handle for one run
    pub fn sender(&self) -> SampleSender {
        self.sender.clone()
    }

    /// Take one sample if available
    pub fn try_recv(&self) -> Option<Sample> {
        match self.receiver.try_recv() {
            Ok(sample) => Some(sample),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take every sample queued right now, in push order
    pub fn drain(&self) -> Vec<Sample> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let queue = SampleQueue::new();
        let tx = queue.sender();
        for i in 0..5 {
            tx.send(Sample::new(i as f64, i as f64 * 10.0)).unwrap();
        }
        assert_eq!(queue.len(), 5);

        let drained = queue.drain();
        let times: Vec<f64> = drained.iter().map(|s| s.elapsed).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_push_from_thread() {
        let queue = SampleQueue::new();
        let tx = queue.sender();
        std::thread::spawn(move || {
            for i in 0..100 {
                tx.send(Sample::new(i as f64, 0.0)).unwrap();
            }
        })
        .join()
        .unwrap();

        assert_eq!(queue.drain().len(), 100);
        assert!(queue.try_recv().is_none());
    }
}
