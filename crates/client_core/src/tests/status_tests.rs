use super::*;
use crate::transport::Connection;

fn frame(topic: &str) -> String {
    format!(r#"{{"type":"{topic}","data":{{}}}}"#)
}

fn projector_on_registry() -> (StatusProjector, SubscriptionRegistry) {
    let registry = SubscriptionRegistry::new(Connection::new("ws://bus.test/core"));
    let projector = StatusProjector::new(TopicPatterns::include(["^recognizer_loop.*"]));
    projector.activate(&registry).expect("activate");
    (projector, registry)
}

#[test]
fn transition_table() {
    assert_eq!(transition("recognizer_loop:wakeword"), Some(Status::Listening));
    assert_eq!(transition("recognizer_loop:utterance"), Some(Status::Thinking));
    assert_eq!(
        transition("recognizer_loop:audio_output_start"),
        Some(Status::Speaking)
    );
    assert_eq!(
        transition("recognizer_loop:audio_output_end"),
        Some(Status::Resting)
    );
    assert_eq!(transition("recognizer_loop:foo"), None);
    assert_eq!(transition("wakeword"), None);
    assert_eq!(transition("recognizer_loop:wakeword:extra"), None);
}

#[test]
fn starts_resting_and_follows_the_recognizer_loop() {
    let (projector, registry) = projector_on_registry();
    assert_eq!(projector.current(), Status::Resting);

    let mut seen = Vec::new();
    for action in ["wakeword", "utterance", "audio_output_start", "audio_output_end"] {
        registry
            .connection()
            .deliver(&frame(&format!("recognizer_loop:{action}")));
        seen.push(projector.current());
    }

    assert_eq!(
        seen,
        vec![
            Status::Listening,
            Status::Thinking,
            Status::Speaking,
            Status::Resting
        ]
    );
}

#[test]
fn unknown_actions_and_filtered_topics_leave_status_unchanged() {
    let (projector, registry) = projector_on_registry();
    registry.connection().deliver(&frame("recognizer_loop:wakeword"));

    registry.connection().deliver(&frame("recognizer_loop:foo"));
    assert_eq!(projector.current(), Status::Listening);

    // Matches the table but not the subscription patterns.
    registry.connection().deliver(&frame("other_loop:audio_output_start"));
    assert_eq!(projector.current(), Status::Listening);
}

#[test]
fn repeated_activation_attaches_once() {
    let (projector, registry) = projector_on_registry();
    projector.activate(&registry).expect("activate again");
    projector.activate(&registry).expect("activate again");

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.connection().listener_count(), 1);
    assert_eq!(registry.dispatch_frame(&frame("recognizer_loop:wakeword")), 1);
}

#[test]
fn transitions_are_published_to_watchers() {
    let (projector, registry) = projector_on_registry();
    let mut status = projector.watch();
    assert!(!status.has_changed().expect("sender alive"));

    registry.connection().deliver(&frame("recognizer_loop:audio_output_start"));
    assert!(status.has_changed().expect("sender alive"));
    assert_eq!(*status.borrow_and_update(), Status::Speaking);
}

#[test]
fn deactivate_stops_updates() {
    let (projector, registry) = projector_on_registry();
    assert!(projector.deactivate());
    assert!(!projector.is_active());
    assert_eq!(registry.connection().listener_count(), 0);

    registry.connection().deliver(&frame("recognizer_loop:wakeword"));
    assert_eq!(projector.current(), Status::Resting);
}

#[test]
fn invalid_patterns_fail_activation() {
    let registry = SubscriptionRegistry::new(Connection::new("ws://bus.test/core"));
    let projector = StatusProjector::new(TopicPatterns::include(["recognizer_loop:("]));
    assert!(matches!(
        projector.activate(&registry),
        Err(BusError::InvalidPattern { .. })
    ));
    assert!(!projector.is_active());
}
