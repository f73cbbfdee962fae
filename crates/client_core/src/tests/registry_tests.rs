use super::*;

fn registry() -> SubscriptionRegistry {
    SubscriptionRegistry::new(Connection::new("ws://bus.test/core"))
}

fn frame(topic: &str) -> String {
    format!(r#"{{"type":"{topic}","data":{{}}}}"#)
}

fn recorder(
    log: &Arc<Mutex<Vec<String>>>,
    label: &'static str,
) -> impl FnMut(&Envelope) -> anyhow::Result<()> + Send + 'static {
    let log = Arc::clone(log);
    move |envelope| {
        log.lock()
            .expect("log")
            .push(format!("{label}:{}", envelope.topic()));
        Ok(())
    }
}

#[test]
fn matching_subscriptions_fire_in_registration_order() {
    let registry = registry();
    let log = Arc::new(Mutex::new(Vec::new()));
    registry
        .subscribe(&TopicPatterns::any(), recorder(&log, "all"))
        .expect("subscribe");
    registry
        .subscribe(&TopicPatterns::include(["^speak$"]), recorder(&log, "speak"))
        .expect("subscribe");
    registry
        .subscribe(&TopicPatterns::include(["^recognizer_loop"]), recorder(&log, "loop"))
        .expect("subscribe");

    registry.connection().deliver(&frame("speak"));
    registry.connection().deliver(&frame("recognizer_loop:wakeword"));

    assert_eq!(
        *log.lock().expect("log"),
        vec![
            "all:speak",
            "speak:speak",
            "all:recognizer_loop:wakeword",
            "loop:recognizer_loop:wakeword",
        ]
    );
}

#[test]
fn invalid_pattern_registers_nothing() {
    let registry = registry();
    let err = registry
        .subscribe(&TopicPatterns::include(["(unclosed"]), |_| Ok(()))
        .unwrap_err();

    assert!(matches!(err, BusError::InvalidPattern { .. }));
    assert!(registry.is_empty());
    assert_eq!(registry.connection().listener_count(), 0);
}

#[test]
fn one_raw_listener_is_shared_and_released_with_the_last_subscription() {
    let registry = registry();
    let first = registry
        .subscribe(&TopicPatterns::any(), |_| Ok(()))
        .expect("subscribe");
    let second = registry
        .subscribe(&TopicPatterns::any(), |_| Ok(()))
        .expect("subscribe");
    assert_eq!(registry.connection().listener_count(), 1);

    assert!(registry.unsubscribe(first));
    assert_eq!(registry.connection().listener_count(), 1);
    assert!(registry.unsubscribe(second));
    assert_eq!(registry.connection().listener_count(), 0);
    assert!(!registry.unsubscribe(second));

    registry
        .subscribe(&TopicPatterns::any(), |_| Ok(()))
        .expect("resubscribe");
    assert_eq!(registry.connection().listener_count(), 1);
}

#[test]
fn malformed_frame_is_dropped_without_stopping_later_frames() {
    let registry = registry();
    let log = Arc::new(Mutex::new(Vec::new()));
    registry
        .subscribe(&TopicPatterns::any(), recorder(&log, "all"))
        .expect("subscribe");

    assert_eq!(registry.dispatch_frame("{not json"), 0);
    assert_eq!(registry.dispatch_frame(r#"{"data":{}}"#), 0);
    assert_eq!(registry.dispatch_frame(&frame("speak")), 1);

    assert_eq!(*log.lock().expect("log"), vec!["all:speak"]);
}

#[test]
fn failing_and_panicking_callbacks_do_not_block_siblings() {
    let registry = registry();
    let log = Arc::new(Mutex::new(Vec::new()));
    registry
        .subscribe(&TopicPatterns::any(), |_| Err(anyhow::anyhow!("boom")))
        .expect("subscribe");
    registry
        .subscribe(&TopicPatterns::any(), |_| panic!("callback panic"))
        .expect("subscribe");
    registry
        .subscribe(&TopicPatterns::any(), recorder(&log, "after"))
        .expect("subscribe");

    assert_eq!(registry.dispatch_frame(&frame("speak")), 3);
    assert_eq!(registry.dispatch_frame(&frame("speak")), 3);
    assert_eq!(*log.lock().expect("log"), vec!["after:speak", "after:speak"]);
}

#[test]
fn unsubscribe_from_inside_a_callback_is_safe() {
    let registry = registry();
    let log = Arc::new(Mutex::new(Vec::new()));
    let target = Arc::new(Mutex::new(None::<SubscriptionId>));

    let own_id = Arc::new(Mutex::new(None::<SubscriptionId>));
    {
        let registry_ref = registry.clone();
        let target = Arc::clone(&target);
        let own_id_slot = Arc::clone(&own_id);
        let log = Arc::clone(&log);
        let id = registry
            .subscribe(&TopicPatterns::any(), move |envelope| {
                log.lock()
                    .expect("log")
                    .push(format!("once:{}", envelope.topic()));
                if let Some(id) = target.lock().expect("target").take() {
                    registry_ref.unsubscribe(id);
                }
                if let Some(id) = own_id_slot.lock().expect("own").take() {
                    registry_ref.unsubscribe(id);
                }
                Ok(())
            })
            .expect("subscribe");
        *own_id.lock().expect("own") = Some(id);
    }
    let later = registry
        .subscribe(&TopicPatterns::any(), recorder(&log, "later"))
        .expect("subscribe");
    *target.lock().expect("target") = Some(later);
    registry
        .subscribe(&TopicPatterns::any(), recorder(&log, "survivor"))
        .expect("subscribe");

    registry.connection().deliver(&frame("a"));
    registry.connection().deliver(&frame("b"));

    assert_eq!(
        *log.lock().expect("log"),
        vec!["once:a", "survivor:a", "survivor:b"]
    );
    assert_eq!(registry.len(), 1);
}

#[test]
fn subscriptions_added_during_dispatch_start_with_the_next_frame() {
    let registry = registry();
    let log = Arc::new(Mutex::new(Vec::new()));
    let added = Arc::new(AtomicBool::new(false));
    {
        let registry_ref = registry.clone();
        let log = Arc::clone(&log);
        let added = Arc::clone(&added);
        registry
            .subscribe(&TopicPatterns::any(), move |_| {
                if !added.swap(true, Ordering::SeqCst) {
                    registry_ref.subscribe(&TopicPatterns::any(), recorder(&log, "new"))?;
                }
                Ok(())
            })
            .expect("subscribe");
    }

    registry.connection().deliver(&frame("a"));
    registry.connection().deliver(&frame("b"));

    assert_eq!(*log.lock().expect("log"), vec!["new:b"]);
}

#[test]
fn attachment_subscribes_once_and_releases_on_detach_and_drop() {
    let registry = registry();
    let attachment = Attachment::default();

    for _ in 0..3 {
        attachment
            .attach(&registry, |registry| {
                registry.subscribe(&TopicPatterns::any(), |_| Ok(()))
            })
            .expect("attach");
    }
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.connection().listener_count(), 1);
    assert!(attachment.is_attached());

    assert!(attachment.detach());
    assert!(!attachment.detach());
    assert!(registry.is_empty());
    assert_eq!(registry.connection().listener_count(), 0);

    let created = attachment
        .attach(&registry, |registry| {
            registry.subscribe(&TopicPatterns::any(), |_| Ok(()))
        })
        .expect("reattach");
    assert!(created);
    drop(attachment);
    assert!(registry.is_empty());
}

#[test]
fn failed_attach_leaves_the_guard_empty() {
    let registry = registry();
    let attachment = Attachment::default();
    let result = attachment.attach(&registry, |registry| {
        registry.subscribe(&TopicPatterns::include(["["]), |_| Ok(()))
    });

    assert!(result.is_err());
    assert!(!attachment.is_attached());
    assert!(registry.is_empty());
}
