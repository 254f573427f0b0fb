use super::*;
use std::sync::Arc;
use std::time::Instant;

fn frame(ms: u64) -> PendingFrame {
    PendingFrame {
        pixels: vec![0; 4],
        pts: Duration::from_millis(ms),
        size: SurfaceSize::new(1, 1),
    }
}

#[test]
fn take_all_preserves_fifo_order() {
    let q = FrameQueue::new();
    for ms in [0, 33, 66] {
        q.push(frame(ms));
    }
    let pts: Vec<_> = q.take_all().into_iter().map(|f| f.pts.as_millis()).collect();
    assert_eq!(pts, vec![0, 33, 66]);
    assert!(q.is_empty());
}

#[test]
fn wait_returns_on_timeout_and_on_stop() {
    let q = FrameQueue::new();
    let stop = AtomicBool::new(false);
    let t0 = Instant::now();
    assert!(!q.wait_for_frames(Duration::from_millis(20), &stop));
    assert!(t0.elapsed() >= Duration::from_millis(15));

    stop.store(true, Ordering::Release);
    let t0 = Instant::now();
    assert!(!q.wait_for_frames(Duration::from_secs(5), &stop));
    assert!(t0.elapsed() < Duration::from_secs(1));
}

#[test]
fn push_wakes_a_waiting_worker() {
    let q = Arc::new(FrameQueue::new());
    let stop = Arc::new(AtomicBool::new(false));
    let worker = {
        let (q, stop) = (Arc::clone(&q), Arc::clone(&stop));
        std::thread::spawn(move || q.wait_for_frames(Duration::from_secs(5), &stop))
    };
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(q.push(frame(0)), 1);
    assert!(worker.join().unwrap());
}
