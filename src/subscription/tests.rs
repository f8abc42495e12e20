//! Multiplexer behaviour over the in-memory transport

use super::*;
use crate::ConsoleError;
use crate::test_utils::{MockConnector, init_test_tracing, mock_multiplexer, pump, pump_ok};
use crate::types::{ConnectionStatus, ProtocolName, RawMessage};

use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn recording(tag: &'static str, log: &Log) -> SubscribeOptions {
    let log = Arc::clone(log);
    SubscribeOptions::json(move |payload| {
        let value = payload.as_json().cloned().unwrap_or(Value::Null);
        log.lock().unwrap().push(format!("{tag}:{value}"));
        Ok(())
    })
}

fn walk() -> ProtocolName {
    ProtocolName::from("Walk")
}

fn live_sockets(connector: &MockConnector, protocol: &str) -> usize {
    connector.live(protocol).len()
}

#[test]
fn first_subscribe_opens_and_last_close_tears_down() {
    init_test_tracing();
    let (connector, multiplexer, _source) = mock_multiplexer();
    let seen = log();

    let a = multiplexer.subscribe("Walk", recording("a", &seen)).unwrap();
    let b = multiplexer.subscribe("Walk", recording("b", &seen)).unwrap();
    assert_eq!(connector.open_count(), 1);
    assert_eq!(multiplexer.subscriber_count(&walk()), 2);
    assert_eq!(multiplexer.status_board()[&walk()].client_count, 2);

    a.close();
    assert!(multiplexer.is_active(&walk()));
    assert_eq!(live_sockets(&connector, "Walk"), 1);
    assert_eq!(multiplexer.status_board()[&walk()].title(), "Walk (1 client)");

    b.close();
    assert!(!multiplexer.is_active(&walk()));
    assert_eq!(live_sockets(&connector, "Walk"), 0);
    assert!(multiplexer.registry().status(&walk()).is_none());
}

#[test]
fn remaining_subscriber_keeps_receiving() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let seen = log();
    let a = multiplexer.subscribe("Walk", recording("a", &seen)).unwrap();
    let _b = multiplexer.subscribe("Walk", recording("b", &seen)).unwrap();
    a.close();

    connector.latest("Walk").unwrap().push_json(&json!({"step": 1}));
    pump_ok(&mut source, &multiplexer);

    assert_eq!(*seen.lock().unwrap(), vec![r#"b:{"step":1}"#]);
}

#[test]
fn fan_out_decodes_once_and_shares_the_value() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let payloads: Arc<Mutex<Vec<Arc<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let mut subscriptions = Vec::new();
    for _ in 0..3 {
        let payloads = Arc::clone(&payloads);
        subscriptions.push(
            multiplexer
                .subscribe(
                    "Walk",
                    SubscribeOptions::json(move |payload| {
                        if let Payload::Json(value) = payload {
                            payloads.lock().unwrap().push(Arc::clone(value));
                        }
                        Ok(())
                    }),
                )
                .unwrap(),
        );
    }

    connector.latest("Walk").unwrap().push_json(&json!({"running": true}));
    pump_ok(&mut source, &multiplexer);

    let payloads = payloads.lock().unwrap();
    assert_eq!(payloads.len(), 3);
    assert!(payloads.iter().all(|p| Arc::ptr_eq(p, &payloads[0])));
    assert_eq!(payloads[0]["running"], true);
}

#[test]
fn raw_subscribers_get_the_message_unchanged() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let seen: Arc<Mutex<Vec<RawMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _raw = multiplexer
        .subscribe(
            "camera-protocol",
            SubscribeOptions::raw(move |payload| {
                sink.lock().unwrap().push(payload.as_raw().cloned().unwrap());
                Ok(())
            }),
        )
        .unwrap();

    // Not JSON, but nobody asked for JSON
    connector.latest("camera-protocol").unwrap().push_binary(&[0xff, 0xd8, 0x00]);
    pump_ok(&mut source, &multiplexer);

    assert_eq!(seen.lock().unwrap()[0].as_bytes(), &[0xff, 0xd8, 0x00]);
}

#[test]
fn failing_handler_is_closed_then_error_propagates() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let seen = log();
    let failing = multiplexer
        .subscribe("Walk", SubscribeOptions::json(|_| Err(anyhow::anyhow!("handler broke"))))
        .unwrap();
    let _ok = multiplexer.subscribe("Walk", recording("ok", &seen)).unwrap();

    connector.latest("Walk").unwrap().push_text("1");
    let results = pump(&mut source, &multiplexer);
    assert!(matches!(results.as_slice(), [Err(ConsoleError::Subscriber { .. })]));
    assert!(failing.is_closed());
    assert_eq!(multiplexer.subscriber_count(&walk()), 1);
    assert!(seen.lock().unwrap().is_empty());

    // Later messages reach the survivor
    connector.latest("Walk").unwrap().push_text("2");
    pump_ok(&mut source, &multiplexer);
    assert_eq!(*seen.lock().unwrap(), vec!["ok:2"]);

    assert!(matches!(failing.send("x"), Err(ConsoleError::SubscriptionClosed { .. })));
}

#[test]
fn undecodable_message_closes_the_json_subscriber() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let seen = log();
    let json_sub = multiplexer.subscribe("Walk", recording("json", &seen)).unwrap();

    connector.latest("Walk").unwrap().push_text("not json");
    let results = pump(&mut source, &multiplexer);

    assert!(matches!(results.as_slice(), [Err(ConsoleError::Decode { .. })]));
    assert!(json_sub.is_closed());
    assert!(!multiplexer.is_active(&walk()));
}

#[test]
fn empty_frames_skip_json_subscribers() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let seen = log();
    let json_sub = multiplexer.subscribe("Walk", recording("json", &seen)).unwrap();
    let raw_seen = Arc::new(Mutex::new(Vec::<RawMessage>::new()));
    let sink = Arc::clone(&raw_seen);
    let _raw = multiplexer
        .subscribe(
            "Walk",
            SubscribeOptions::raw(move |payload| {
                sink.lock().unwrap().extend(payload.as_raw().cloned());
                Ok(())
            }),
        )
        .unwrap();

    let socket = connector.latest("Walk").unwrap();
    socket.push_text("");
    socket.push_text("7");
    pump_ok(&mut source, &multiplexer);

    assert!(!json_sub.is_closed());
    assert_eq!(*seen.lock().unwrap(), vec!["json:7"]);
    assert_eq!(*raw_seen.lock().unwrap(), vec![RawMessage::from(""), RawMessage::from("7")]);
}

#[test]
fn transport_errors_reach_error_handlers() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let errors = log();
    let sink = Arc::clone(&errors);
    let _sub = multiplexer
        .subscribe(
            "Walk",
            SubscribeOptions::json(|_| Ok(())).on_error(move |error| {
                sink.lock().unwrap().push(error.to_string());
            }),
        )
        .unwrap();
    let _quiet = multiplexer.subscribe("Walk", SubscribeOptions::json(|_| Ok(()))).unwrap();

    let socket = connector.latest("Walk").unwrap();
    socket.open();
    socket.push_error("connection reset");
    pump_ok(&mut source, &multiplexer);

    assert_eq!(*errors.lock().unwrap(), vec!["Walk: connection reset"]);
    assert_eq!(multiplexer.registry().status(&walk()), Some(ConnectionStatus::Error));
}

#[test]
fn dropping_a_subscription_unsubscribes() {
    let (connector, multiplexer, _source) = mock_multiplexer();
    {
        let _sub = multiplexer.subscribe("Walk", SubscribeOptions::json(|_| Ok(()))).unwrap();
        assert!(multiplexer.is_active(&walk()));
    }
    assert!(!multiplexer.is_active(&walk()));
    assert_eq!(live_sockets(&connector, "Walk"), 0);
}

#[test]
fn close_is_idempotent() {
    let (_connector, multiplexer, _source) = mock_multiplexer();
    let a = multiplexer.subscribe("Walk", SubscribeOptions::json(|_| Ok(()))).unwrap();
    let _b = multiplexer.subscribe("Walk", SubscribeOptions::json(|_| Ok(()))).unwrap();
    a.close();
    a.close();
    assert_eq!(multiplexer.subscriber_count(&walk()), 1);
}

#[test]
fn send_goes_to_the_shared_socket() {
    let (connector, multiplexer, _source) = mock_multiplexer();
    let a = multiplexer.subscribe("control-protocol", SubscribeOptions::json(|_| Ok(()))).unwrap();
    let b = multiplexer.subscribe("control-protocol", SubscribeOptions::json(|_| Ok(()))).unwrap();

    a.send("one").unwrap();
    b.send_json(&json!({"type": "action", "id": "stand"})).unwrap();

    let socket = connector.latest("control-protocol").unwrap();
    assert_eq!(socket.sent()[0], RawMessage::from("one"));
    assert_eq!(socket.sent_json(), vec![json!({"type": "action", "id": "stand"})]);
}

#[test]
fn events_from_replaced_sockets_are_ignored() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let seen = log();
    let first = multiplexer.subscribe("Walk", recording("first", &seen)).unwrap();
    let old_socket = connector.latest("Walk").unwrap();
    first.close();
    let _second = multiplexer.subscribe("Walk", recording("second", &seen)).unwrap();

    old_socket.push_text("1");
    pump_ok(&mut source, &multiplexer);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn handler_may_unsubscribe_a_later_subscriber() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let seen = log();
    let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&victim);
    let _closer = multiplexer
        .subscribe(
            "Walk",
            SubscribeOptions::json(move |_| {
                if let Some(sub) = slot.lock().unwrap().as_ref() {
                    sub.close();
                }
                Ok(())
            }),
        )
        .unwrap();
    *victim.lock().unwrap() = Some(multiplexer.subscribe("Walk", recording("victim", &seen)).unwrap());

    connector.latest("Walk").unwrap().push_text("1");
    pump_ok(&mut source, &multiplexer);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(multiplexer.subscriber_count(&walk()), 1);
}

#[test]
fn failed_open_does_not_create_an_entry() {
    let (connector, multiplexer, _source) = mock_multiplexer();
    connector.fail_next_open("refused");
    let err = multiplexer.subscribe("Walk", SubscribeOptions::json(|_| Ok(()))).unwrap_err();
    assert!(matches!(err, ConsoleError::Connection { .. }));
    assert!(!multiplexer.is_active(&walk()));

    let _sub = multiplexer.subscribe("Walk", SubscribeOptions::json(|_| Ok(()))).unwrap();
    assert!(multiplexer.is_active(&walk()));
}

#[test]
fn reconnect_all_keeps_subscribers() {
    let (connector, multiplexer, mut source) = mock_multiplexer();
    let seen = log();
    let _sub = multiplexer.subscribe("Walk", recording("a", &seen)).unwrap();
    connector.latest("Walk").unwrap().open();
    pump_ok(&mut source, &multiplexer);

    multiplexer.disconnect_all();
    assert!(multiplexer.is_all_disconnected());
    assert_eq!(multiplexer.reconnect_all(), vec![walk()]);

    let socket = connector.latest("Walk").unwrap();
    socket.open();
    socket.push_text("3");
    pump_ok(&mut source, &multiplexer);
    assert_eq!(*seen.lock().unwrap(), vec!["a:3"]);
    assert!(!multiplexer.is_all_disconnected());
}

#[derive(Debug, Clone)]
enum Op {
    Subscribe(usize),
    Close(usize),
}

#[test]
fn concurrent_subscribers_publish_a_consistent_client_count() {
    let (_connector, multiplexer, _source) = mock_multiplexer();
    let _anchor = multiplexer.subscribe("Walk", SubscribeOptions::json(|_| Ok(()))).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let multiplexer = multiplexer.clone();
            std::thread::spawn(move || {
                let mut held = Vec::new();
                for i in 0..200 {
                    held.push(multiplexer.subscribe("Walk", SubscribeOptions::json(|_| Ok(()))).unwrap());
                    if i % 3 == 0 {
                        held.remove(0).close();
                    }
                }
                held
            })
        })
        .collect();
    let held: Vec<_> = workers.into_iter().flat_map(|worker| worker.join().unwrap()).collect();

    let expected = held.len() + 1;
    assert_eq!(multiplexer.subscriber_count(&walk()), expected);
    assert_eq!(multiplexer.status_board()[&walk()].client_count, expected);
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![(0usize..3).prop_map(Op::Subscribe), (0usize..8).prop_map(Op::Close)]
}

proptest! {
    #[test]
    fn prop_socket_exists_iff_subscribers_exist(ops in prop::collection::vec(op(), 1..40)) {
        let (connector, multiplexer, _source) = mock_multiplexer();
        let names = ["Walk", "Balance", "Body"];
        let mut open: Vec<Subscription> = Vec::new();

        for op in ops {
            match op {
                Op::Subscribe(i) => {
                    open.push(multiplexer.subscribe(names[i], SubscribeOptions::json(|_| Ok(()))).unwrap());
                }
                Op::Close(i) if !open.is_empty() => {
                    let sub = open.remove(i % open.len());
                    sub.close();
                }
                Op::Close(_) => {}
            }

            for name in names {
                let protocol = ProtocolName::from(name);
                let expected = open.iter().filter(|s| s.protocol() == &protocol).count();
                let live = connector.live(name).len();
                prop_assert!(live <= 1);
                prop_assert_eq!(live == 1, expected > 0);
                prop_assert_eq!(multiplexer.subscriber_count(&protocol), expected);
            }
        }
    }
}
