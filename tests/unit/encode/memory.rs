use super::*;
use crate::foundation::core::{Fps, SurfaceSize};

fn settings() -> VideoOutputSettings {
    VideoOutputSettings::new(SurfaceSize::new(2, 2), Fps::new(30, 1).unwrap(), 10, 30)
}

fn frame(enc: &dyn VideoEncoder) -> PixelBuffer {
    enc.pixel_buffer_pool()
        .and_then(|p| p.acquire())
        .unwrap_or_else(|| PixelBuffer::ad_hoc(16))
}

#[test]
fn records_timestamps_and_rejects_regressions() {
    let backend = MemoryBackend::new();
    let mut enc = backend.open(Path::new("a.mp4"), &settings()).unwrap();
    for ms in [0, 33, 66] {
        let buf = frame(enc.as_ref());
        enc.append(buf, Duration::from_millis(ms)).unwrap();
    }
    let buf = frame(enc.as_ref());
    assert!(enc.append(buf, Duration::from_millis(66)).is_err());
    assert!(enc.append(PixelBuffer::ad_hoc(3), Duration::from_millis(99)).is_err());
    enc.mark_input_finished();
    assert_eq!(enc.finish(), EncoderStatus::Completed);

    let rec = backend.last_recording().unwrap();
    assert_eq!(rec.path, PathBuf::from("a.mp4"));
    assert_eq!(rec.timestamps.len(), 3);
    assert_eq!(rec.rejected, 2);
    assert!(rec.input_finished);
    assert_eq!(rec.status, Some(EncoderStatus::Completed));
}

#[test]
fn scripted_readiness_and_failures() {
    let backend = MemoryBackend::new()
        .with_readiness(vec![false, true])
        .failing_append_at(1)
        .finishing_with(EncoderStatus::Failed("disk full".into()));
    let mut enc = backend.open(Path::new("b.mp4"), &settings()).unwrap();
    assert!(!enc.is_ready_for_more_data());
    assert!(enc.is_ready_for_more_data());
    assert!(!enc.is_ready_for_more_data());

    enc.append(PixelBuffer::ad_hoc(16), Duration::ZERO).unwrap();
    assert!(enc.append(PixelBuffer::ad_hoc(16), Duration::from_millis(1)).is_err());
    enc.append(PixelBuffer::ad_hoc(16), Duration::from_millis(2)).unwrap();
    assert_eq!(enc.finish(), EncoderStatus::Failed("disk full".into()));
}

#[test]
fn open_failure_is_reported() {
    let backend = MemoryBackend::new().failing_open("no space");
    let err = backend.open(Path::new("c.mp4"), &settings()).err().expect("open should fail");
    assert!(err.to_string().contains("no space"));
    assert!(backend.recordings().is_empty());
}

#[test]
fn single_buffer_pool_falls_back_to_ad_hoc() {
    let backend = MemoryBackend::new();
    let mut enc = backend
        .open(Path::new("d.mp4"), &settings().with_pool_capacity(1))
        .unwrap();
    let pool = enc.pixel_buffer_pool().unwrap();

    let first = pool.acquire_or_ad_hoc();
    let second = pool.acquire_or_ad_hoc();
    assert!(first.is_pooled());
    assert!(!second.is_pooled());
    assert_eq!(second.len(), 16);
    assert_eq!(pool.stats().exhausted, 1);

    enc.append(first, Duration::ZERO).unwrap();
    enc.append(second, Duration::from_millis(33)).unwrap();
    assert!(pool.acquire_or_ad_hoc().is_pooled());

    let rec = backend.last_recording().unwrap();
    assert_eq!(rec.settings.pool_capacity, 1);
    assert_eq!(rec.ad_hoc_frames, 1);
}
