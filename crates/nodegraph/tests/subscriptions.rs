//! Integration tests for subscriptions and event routing.

mod common;

use common::{engine, node};
use nodegraph::{
    Error, EventType, NewSubscription, NodeGraph, Subscription, SubscriptionId,
    SubscriptionUpdate,
};
use rstest::rstest;
use serde_json::{Value, json};

fn subscribe(graph: &NodeGraph, service: &str, key: &str, types: &[EventType]) -> Subscription {
    graph
        .create_subscription(&NewSubscription {
            service: service.to_string(),
            endpoint: None,
            node: key.to_string(),
            event_types: types.to_vec(),
            filter: None,
        })
        .expect("should create subscription")
}

#[test]
fn create_get_update_delete() {
    let graph = engine();
    let a = node(&graph, "a");

    let sub = graph
        .create_subscription(&NewSubscription {
            service: "search-indexer".to_string(),
            endpoint: Some("http://indexer/hooks".to_string()),
            node: a.clone(),
            event_types: vec![
                EventType::Updated,
                EventType::Deleted,
                EventType::Updated,
            ],
            filter: Some(json!({"domain": "docs"})),
        })
        .unwrap();

    assert!(sub.is_active);
    assert_eq!(sub.node_key.to_string(), a);
    assert_eq!(sub.event_types, vec![EventType::Updated, EventType::Deleted]);
    assert_eq!(graph.get_subscription(sub.id).unwrap(), sub);

    let updated = graph
        .update_subscription(
            sub.id,
            &SubscriptionUpdate {
                event_types: Some(vec![EventType::Created]),
                is_active: Some(false),
                ..SubscriptionUpdate::default()
            },
        )
        .unwrap();
    assert!(!updated.is_active);
    assert_eq!(updated.event_types, vec![EventType::Created]);
    assert_eq!(updated.endpoint.as_deref(), Some("http://indexer/hooks"));

    graph.delete_subscription(sub.id).unwrap();
    assert!(matches!(
        graph.get_subscription(sub.id),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        graph.delete_subscription(sub.id),
        Err(Error::NotFound { .. })
    ));
}

#[rstest]
#[case::empty_service("  ", vec![EventType::Created], None)]
#[case::no_event_types("svc", vec![], None)]
#[case::array_filter("svc", vec![EventType::Created], Some(json!([1, 2])))]
fn invalid_requests_are_rejected(
    #[case] service: &str,
    #[case] event_types: Vec<EventType>,
    #[case] filter: Option<Value>,
) {
    let graph = engine();
    let a = node(&graph, "a");
    let err = graph
        .create_subscription(&NewSubscription {
            service: service.to_string(),
            endpoint: None,
            node: a,
            event_types,
            filter,
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");
}

#[test]
fn subscribing_to_a_missing_node_is_not_found() {
    let graph = engine();
    let err = graph
        .create_subscription(&NewSubscription {
            service: "svc".to_string(),
            endpoint: None,
            node: "url-db:docs:404".to_string(),
            event_types: vec![EventType::Created],
            filter: None,
        })
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn update_of_missing_subscription_is_not_found() {
    let graph = engine();
    let err = graph
        .update_subscription(
            SubscriptionId(42),
            &SubscriptionUpdate {
                is_active: Some(false),
                ..SubscriptionUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn routing_matches_node_type_and_active_flag() {
    let graph = engine();
    let a = node(&graph, "a");
    let b = node(&graph, "b");

    let deletes = subscribe(&graph, "cleanup", &a, &[EventType::Deleted]);
    let updates = subscribe(&graph, "indexer", &a, &[EventType::Updated, EventType::Deleted]);
    subscribe(&graph, "indexer", &b, &[EventType::Deleted]);
    let paused = subscribe(&graph, "audit", &a, &[EventType::Deleted]);
    graph
        .update_subscription(
            paused.id,
            &SubscriptionUpdate {
                is_active: Some(false),
                ..SubscriptionUpdate::default()
            },
        )
        .unwrap();

    let routed = graph.subscribers_for(&a, EventType::Deleted).unwrap();
    assert!(routed.iter().all(|s| s.wants(EventType::Deleted)));
    let ids: Vec<_> = routed.into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![deletes.id, updates.id]);

    // Routing agrees with each subscription's own view.
    let paused = graph.get_subscription(paused.id).unwrap();
    assert!(!paused.wants(EventType::Deleted));
    assert!(!deletes.wants(EventType::Updated));

    let ids: Vec<_> = graph
        .subscribers_for(&a, EventType::Updated)
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![updates.id]);

    assert!(
        graph
            .subscribers_for(&a, EventType::Created)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn subscriptions_survive_node_deletion() {
    let graph = engine();
    let a = node(&graph, "a");
    let sub = subscribe(&graph, "cleanup", &a, &[EventType::Deleted]);

    graph.delete_node(&a).unwrap();

    let routed = graph.subscribers_for(&a, EventType::Deleted).unwrap();
    assert_eq!(routed.len(), 1);
    assert_eq!(routed[0].id, sub.id);
}

#[test]
fn lists_by_service_and_node() {
    let graph = engine();
    let a = node(&graph, "a");
    let b = node(&graph, "b");
    subscribe(&graph, "indexer", &a, &[EventType::Updated]);
    subscribe(&graph, "indexer", &b, &[EventType::Updated]);
    subscribe(&graph, "audit", &a, &[EventType::Created]);

    assert_eq!(graph.service_subscriptions("indexer").unwrap().len(), 2);
    assert!(graph.service_subscriptions("nobody").unwrap().is_empty());
    assert_eq!(graph.node_subscriptions(&a).unwrap().len(), 2);
    assert_eq!(graph.node_subscriptions(&b).unwrap().len(), 1);
}

#[test]
fn pages_through_all_subscriptions() {
    let graph = engine();
    let a = node(&graph, "a");
    for i in 0..5 {
        subscribe(&graph, &format!("svc-{i}"), &a, &[EventType::Updated]);
    }

    let first = graph.list_subscriptions(1, 2).unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].service, "svc-0");

    let last = graph.list_subscriptions(3, 2).unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].service, "svc-4");

    let beyond = graph.list_subscriptions(10, 2).unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 5);
}
