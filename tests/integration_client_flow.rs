//! End-to-end exercise of the public API across connection, dispatcher, and
//! two L4 services sharing one root dispatcher — the data flow §2 describes:
//! a request allocates an id, issues a send, and an inbound frame is routed
//! back to the caller's callback through the registry.

use std::sync::{Arc, Mutex};

use simconnect_client::transport::MockTransport;
use simconnect_client::{Connection, Dispatcher, EventService, OpenMode, SystemStateService};

fn system_state_frame(request_id: u32, integer: i32, float: f32, string: &str) -> Vec<u8> {
    use simconnect_client::Builder;

    let mut b = Builder::new();
    b.put_i32(request_id as i32);
    b.put_i32(integer);
    b.put_f32(float);
    b.put_stringn(string, 260);
    let payload = b.into_bytes();

    let mut frame = Vec::new();
    let size = (12 + payload.len()) as u32;
    frame.extend_from_slice(&size.to_ne_bytes());
    frame.extend_from_slice(&1u32.to_ne_bytes());
    frame.extend_from_slice(&10u32.to_ne_bytes());
    frame.extend_from_slice(&payload);
    frame
}

#[test]
fn system_state_request_round_trips_through_one_shared_dispatcher() {
    let mut conn = Connection::new(MockTransport::new());
    conn.open("integration-test", OpenMode::Simple, 0).unwrap();

    let dispatcher = Dispatcher::new();
    let system_state = SystemStateService::new();
    let events = EventService::new();
    system_state.attach(&dispatcher);
    events.attach(&dispatcher);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let request = system_state
        .request(&mut conn, "Sim", move |value| {
            s.lock().unwrap().push(value.as_bool());
        })
        .unwrap();

    assert!(conn.transport_mut().sent.iter().any(|op| op.contains("request_system_state")));

    let frame = system_state_frame(request.request_id().0, 1, 0.0, "");
    conn.transport_mut().push_frame(frame);
    dispatcher.drain_once(&mut conn).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![true]);
}

#[test]
fn cancelling_a_request_stops_further_delivery_for_its_id() {
    let mut conn = Connection::new(MockTransport::new());
    conn.open("integration-test", OpenMode::Simple, 0).unwrap();

    let dispatcher = Dispatcher::new();
    let system_state = SystemStateService::new();
    system_state.attach(&dispatcher);

    let hits = Arc::new(Mutex::new(0u32));
    let h = hits.clone();
    let mut request = system_state
        .request(&mut conn, "FlightLoaded", move |_| {
            *h.lock().unwrap() += 1;
        })
        .unwrap();
    let request_id = request.request_id();
    request.cancel();

    let frame = system_state_frame(request_id.0, 0, 0.0, "KSEA");
    conn.transport_mut().push_frame(frame);
    dispatcher.drain_once(&mut conn).unwrap();

    assert_eq!(*hits.lock().unwrap(), 0);
}

#[test]
fn notification_group_events_register_through_the_shared_connection() {
    let mut conn = Connection::new(MockTransport::new());
    conn.open("integration-test", OpenMode::Simple, 0).unwrap();

    let events = EventService::new();
    let group = events
        .create_notification_group(&mut conn)
        .unwrap()
        .with_standard_priority()
        .add_event(&mut conn, "Brakes")
        .unwrap();

    assert!(conn
        .transport_mut()
        .sent
        .iter()
        .any(|op| op.contains("set_notification_group_priority")));
    assert!(conn
        .transport_mut()
        .sent
        .iter()
        .any(|op| op.contains("add_client_event_to_notification_group")));
    drop(group);
}
