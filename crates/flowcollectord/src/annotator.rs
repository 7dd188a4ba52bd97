//! Flow annotation stage.
//!
//! For every input a pool of workers takes flows off the rendezvous channel,
//! aligns their timestamps to the aggregation grid, adds them to the global
//! counters, optionally asks the [`Augmenter`] for routing data and forwards
//! them to the shared output.

use crate::augment::Augmenter;
use crate::error::{CollectorError, Result};
use crate::handoff::{self, Shutdown};
use crate::stats::GlobalStats;
use crossbeam_channel::{Receiver, Sender};
use sonic_flow_types::Flow;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Aligns `timestamp` down to a multiple of `interval`.
///
/// Uses the Euclidean remainder so the result never exceeds `timestamp`,
/// negative timestamps included. A non-positive `interval` leaves the
/// timestamp unchanged; alignments below `i64::MIN` saturate.
pub fn align_timestamp(timestamp: i64, interval: i64) -> i64 {
    if interval <= 0 {
        return timestamp;
    }
    timestamp.saturating_sub(timestamp.rem_euclid(interval))
}

/// Per-flow annotation shared by all workers.
pub struct Annotation {
    aggregation: i64,
    augmenter: Option<Arc<dyn Augmenter>>,
    stats: Arc<GlobalStats>,
}

impl Annotation {
    /// # Errors
    ///
    /// Returns [`CollectorError::Config`] if `aggregation` is not positive.
    pub fn new(
        aggregation: i64,
        augmenter: Option<Arc<dyn Augmenter>>,
        stats: Arc<GlobalStats>,
    ) -> Result<Self> {
        if aggregation <= 0 {
            return Err(CollectorError::Config(format!(
                "aggregation interval must be positive, got {}",
                aggregation
            )));
        }
        Ok(Self {
            aggregation,
            augmenter,
            stats,
        })
    }

    pub fn annotate(&self, flow: &mut Flow) {
        flow.timestamp = align_timestamp(flow.timestamp, self.aggregation);
        self.stats.record_flow_volume(flow.bytes, flow.packets);
        if let Some(augmenter) = &self.augmenter {
            augmenter.augment(flow);
        }
    }
}

pub struct Annotator {
    workers: Vec<JoinHandle<()>>,
}

impl Annotator {
    /// Starts `workers` threads for each of `inputs`, all feeding `output`.
    pub fn start(
        inputs: Vec<Receiver<Flow>>,
        output: Sender<Flow>,
        workers: usize,
        annotation: Arc<Annotation>,
        shutdown: Shutdown,
    ) -> io::Result<Self> {
        let mut handles = Vec::with_capacity(inputs.len() * workers);

        for (input_id, input) in inputs.into_iter().enumerate() {
            for worker_id in 0..workers {
                let input = input.clone();
                let output = output.clone();
                let annotation = Arc::clone(&annotation);
                let shutdown = shutdown.clone();
                let handle = thread::Builder::new()
                    .name(format!("annotator-{}-{}", input_id, worker_id))
                    .spawn(move || annotate_worker(&input, &output, &annotation, &shutdown))?;
                handles.push(handle);
            }
        }

        info!(
            workers = handles.len(),
            aggregation_secs = annotation.aggregation,
            augment = annotation.augmenter.is_some(),
            "Annotation stage started"
        );

        Ok(Self { workers: handles })
    }

    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                error!("Annotator thread panicked");
            }
        }
    }
}

fn annotate_worker(
    input: &Receiver<Flow>,
    output: &Sender<Flow>,
    annotation: &Annotation,
    shutdown: &Shutdown,
) {
    while let Some(mut flow) = handoff::recv(input, shutdown) {
        annotation.annotate(&mut flow);
        if !handoff::send(output, flow, shutdown) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_flow_types::AddressFamily;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAs {
        calls: AtomicUsize,
    }

    impl Augmenter for FixedAs {
        fn augment(&self, flow: &mut Flow) {
            self.calls.fetch_add(1, Ordering::Relaxed);
            flow.src_as = 65001;
            flow.dst_as = 65002;
        }
    }

    fn flow(timestamp: i64, bytes: u64, packets: u64) -> Flow {
        let mut flow = Flow::new(Ipv4Addr::new(192, 0, 2, 1), timestamp, AddressFamily::V4);
        flow.bytes = bytes;
        flow.packets = packets;
        flow
    }

    #[test]
    fn test_align_timestamp() {
        assert_eq!(align_timestamp(1_700_000_123, 60), 1_700_000_100);
        assert_eq!(align_timestamp(120, 60), 120);
        assert_eq!(align_timestamp(0, 60), 0);
        assert_eq!(align_timestamp(59, 60), 0);
        assert_eq!(align_timestamp(-1, 60), -60);
        assert_eq!(align_timestamp(7, 1), 7);
    }

    #[test]
    fn test_align_properties() {
        for p in [1i64, 7, 60, 300, 3600] {
            for t in [-10_000i64, -61, -60, -1, 0, 1, 59, 60, 61, 1_700_000_123, i64::MAX] {
                let a = align_timestamp(t, p);
                assert_eq!(align_timestamp(a, p), a);
                assert!(a <= t);
                assert!(t - a < p);
            }
        }
    }

    #[test]
    fn test_align_degenerate_inputs() {
        assert_eq!(align_timestamp(125, 0), 125);
        assert_eq!(align_timestamp(125, -60), 125);

        let floor = align_timestamp(i64::MIN + 5, 60);
        assert_eq!(floor, i64::MIN);
        assert_eq!(align_timestamp(i64::MIN, 60), i64::MIN);
    }

    #[test]
    fn test_annotation_rejects_non_positive_interval() {
        let stats = Arc::new(GlobalStats::new());
        assert!(matches!(
            Annotation::new(0, None, Arc::clone(&stats)),
            Err(CollectorError::Config(_))
        ));
        assert!(Annotation::new(-60, None, stats).is_err());
    }

    #[test]
    fn test_annotate_without_augmenter() {
        let stats = Arc::new(GlobalStats::new());
        let annotation = Annotation::new(60, None, Arc::clone(&stats)).unwrap();

        let mut f = flow(125, 1500, 3);
        f.src_as = 9;
        annotation.annotate(&mut f);

        assert_eq!(f.timestamp, 120);
        assert_eq!(f.src_as, 9);
        let snap = stats.snapshot();
        assert_eq!(snap.flow_bytes, 1500);
        assert_eq!(snap.flow_packets, 3);
    }

    #[test]
    fn test_pipeline_with_mock_augmenter() {
        let stats = Arc::new(GlobalStats::new());
        let augmenter = Arc::new(FixedAs {
            calls: AtomicUsize::new(0),
        });
        let annotation = Arc::new(Annotation::new(
            60,
            Some(Arc::clone(&augmenter) as Arc<dyn Augmenter>),
            Arc::clone(&stats),
        )
        .unwrap());
        let shutdown = Shutdown::new();

        let (in_a, rx_a) = handoff::channel();
        let (in_b, rx_b) = handoff::channel();
        let (out_tx, out_rx) = handoff::channel();

        let annotator = Annotator::start(vec![rx_a, rx_b], out_tx, 2, annotation, shutdown.clone())
            .unwrap();

        let received = std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..50 {
                    assert!(handoff::send(&in_a, flow(1000 + i, 100, 1), &shutdown));
                }
            });
            s.spawn(|| {
                for i in 0..50 {
                    assert!(handoff::send(&in_b, flow(2000 + i, 10, 2), &shutdown));
                }
            });

            (0..100)
                .map(|_| handoff::recv(&out_rx, &shutdown).unwrap())
                .collect::<Vec<_>>()
        });

        shutdown.trigger();
        annotator.join();

        assert_eq!(received.len(), 100);
        for f in &received {
            assert_eq!(f.timestamp % 60, 0);
            assert_eq!(f.src_as, 65001);
            assert_eq!(f.dst_as, 65002);
        }
        assert_eq!(augmenter.calls.load(Ordering::Relaxed), 100);

        let snap = stats.snapshot();
        assert_eq!(snap.flow_bytes, 50 * 100 + 50 * 10);
        assert_eq!(snap.flow_packets, 50 + 50 * 2);
    }
}
