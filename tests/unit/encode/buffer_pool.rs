use super::*;

#[test]
fn pool_reuses_returned_buffers() {
    let pool = PixelBufferPool::new(16, 2);
    let a = pool.acquire().unwrap();
    assert_eq!(a.len(), 16);
    pool.recycle(a);
    let _b = pool.acquire().unwrap();

    let st = pool.stats();
    assert_eq!(st.alloc_buffers, 1);
    assert_eq!(st.outstanding, 1);
    assert_eq!(st.retained_buffers, 0);
}

#[test]
fn pool_honors_capacity() {
    let pool = PixelBufferPool::new(8, 2);
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    assert!(pool.acquire().is_none());
    assert_eq!(pool.stats().exhausted, 1);

    pool.recycle(a);
    assert!(pool.acquire().is_some());
    pool.recycle(b);
    assert_eq!(pool.stats().retained_bytes, 8);
}

#[test]
fn ad_hoc_buffers_are_not_retained() {
    let pool = PixelBufferPool::new(8, 2);
    let adhoc = PixelBuffer::ad_hoc(8);
    assert!(!adhoc.is_pooled());
    pool.recycle(adhoc);
    let st = pool.stats();
    assert_eq!(st.retained_buffers, 0);
    assert_eq!(st.dropped_on_release, 1);
}
