use super::*;

#[test]
fn second_dispatch_is_dropped_until_complete() {
    let queue = CommandQueue::new();
    let tx = queue.sender();
    let other = tx.clone();

    assert!(tx.dispatch(Action::TakeScreenshot));
    assert!(!other.dispatch(Action::StartRecording));
    assert!(other.is_busy());

    assert_eq!(queue.take(), Some(Action::TakeScreenshot));
    assert_eq!(queue.take(), None);
    // Still applying: the guard holds.
    assert!(!tx.dispatch(Action::StopRecording));

    queue.complete();
    assert!(!tx.is_busy());
    assert!(other.dispatch(Action::SetLayerVisibility {
        layer: 2,
        visibility: Visibility::Visible,
    }));
    assert!(matches!(
        queue.take(),
        Some(Action::SetLayerVisibility { layer: 2, .. })
    ));
}

#[test]
fn senders_work_across_threads() {
    let queue = CommandQueue::new();
    let tx = queue.sender();
    let accepted: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tx = tx.clone();
                s.spawn(move || {
                    tx.dispatch(Action::LoadStaticTexture {
                        layer: 0,
                        name: format!("img{i}.png"),
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum()
    });
    assert_eq!(accepted, 1);
    assert!(queue.take().is_some());
}
