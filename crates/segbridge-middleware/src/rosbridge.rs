//! Rosbridge v2 WebSocket transport.
//!
//! [`RosbridgeClient`] connects the internal [`EventBus`] to a
//! `rosbridge_server` instance:
//!
//! * **Inbound** – `hanp_msgs/TrackedHumans` frames published on the input
//!   topic are decoded and published on the bus under the same topic name.
//!
//! * **Outbound** – [`EventPayload::Detections`] events appearing on the
//!   bus output topic are encoded as `iri_perception_msgs/detectionArray`
//!   publish frames.
//!
//! The frame codec lives in free functions so it can be exercised without a
//! socket.

use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use segbridge_types::{BridgeError, DetectionArray, Event, EventPayload, TrackedHumans};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, QueuePolicy};
use crate::handler::StopSignal;

/// ROS type name of the inbound stream.
pub const INPUT_MSG_TYPE: &str = "hanp_msgs/TrackedHumans";
/// ROS type name of the outbound stream.
pub const OUTPUT_MSG_TYPE: &str = "iri_perception_msgs/detectionArray";
/// Default `rosbridge_server` endpoint.
pub const DEFAULT_ROSBRIDGE_URL: &str = "ws://localhost:9090";
/// Upper bound on the unsubscribe/unadvertise/close exchange at shutdown.
pub const UNWIRE_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Frame codec
// ---------------------------------------------------------------------------

pub fn subscribe_op(topic: &str, queue_length: usize) -> Value {
    json!({
        "op": "subscribe",
        "topic": topic,
        "type": INPUT_MSG_TYPE,
        "queue_length": queue_length,
    })
}

pub fn unsubscribe_op(topic: &str) -> Value {
    json!({ "op": "unsubscribe", "topic": topic })
}

pub fn advertise_op(topic: &str) -> Value {
    json!({ "op": "advertise", "topic": topic, "type": OUTPUT_MSG_TYPE })
}

pub fn unadvertise_op(topic: &str) -> Value {
    json!({ "op": "unadvertise", "topic": topic })
}

/// Encode `detections` as a publish frame on `topic`.
pub fn publish_op(topic: &str, detections: &DetectionArray) -> Result<Value, BridgeError> {
    let msg = serde_json::to_value(detections)
        .map_err(|e| BridgeError::Parsing(format!("cannot encode {OUTPUT_MSG_TYPE}: {e}")))?;
    Ok(json!({ "op": "publish", "topic": topic, "msg": msg }))
}

/// Decode a text frame received from rosbridge.
///
/// Returns `Ok(None)` for frames that are not a publish on `input_topic`
/// (status messages, other topics).  A publish on `input_topic` whose `msg`
/// does not match the `TrackedHumans` schema is a [`BridgeError::Parsing`].
pub fn decode_frame(text: &str, input_topic: &str) -> Result<Option<TrackedHumans>, BridgeError> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|e| BridgeError::Parsing(format!("frame is not JSON: {e}")))?;

    let op = frame.get("op").and_then(Value::as_str).unwrap_or("");
    let topic = frame.get("topic").and_then(Value::as_str).unwrap_or("");
    if op != "publish" || topic != input_topic {
        return Ok(None);
    }

    let msg = frame
        .get("msg")
        .cloned()
        .ok_or_else(|| BridgeError::Parsing(format!("publish on {topic} has no msg")))?;
    serde_json::from_value(msg)
        .map(Some)
        .map_err(|e| BridgeError::Parsing(format!("{topic}: invalid {INPUT_MSG_TYPE}: {e}")))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Wiring for a [`RosbridgeClient`].
#[derive(Debug, Clone)]
pub struct RosbridgeConfig {
    pub url: String,
    /// Fully resolved input topic; also the bus topic inbound batches land on.
    pub input_topic: String,
    /// Fully resolved output topic; also the bus topic drained outbound.
    pub output_topic: String,
    pub input_queue: QueuePolicy,
    pub output_queue: QueuePolicy,
}

impl Default for RosbridgeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ROSBRIDGE_URL.to_string(),
            input_topic: "/in_humans".to_string(),
            output_topic: "/out_humans".to_string(),
            input_queue: QueuePolicy::default(),
            output_queue: QueuePolicy::default(),
        }
    }
}

/// Bridges one input and one output topic between rosbridge and the bus.
pub struct RosbridgeClient {
    config: RosbridgeConfig,
    bus: EventBus,
}

impl RosbridgeClient {
    pub fn new(config: RosbridgeConfig, bus: EventBus) -> Self {
        Self { config, bus }
    }

    fn source(&self) -> String {
        format!("segbridge-middleware::rosbridge{}", self.config.input_topic)
    }

    /// Decode an inbound frame and forward it onto the bus.
    ///
    /// Returns the number of bus subscribers reached (0 for ignored or
    /// malformed frames).
    pub fn ingest_frame(&self, text: &str) -> usize {
        match decode_frame(text, &self.config.input_topic) {
            Ok(Some(batch)) => {
                debug!(topic = %self.config.input_topic, humans = batch.humans.len(), "received batch");
                let event = Event::new(self.source(), EventPayload::TrackedHumans(batch));
                match self.bus.publish_to(&self.config.input_topic, event) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "dropping inbound batch");
                        0
                    }
                }
            }
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, "ignoring malformed rosbridge frame");
                0
            }
        }
    }

    /// Connect, wire both topics and relay traffic until `stop` fires.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the connection cannot be
    /// established or is lost.  Reconnecting is left to the caller.
    pub async fn run(self, mut stop: StopSignal) -> Result<(), BridgeError> {
        let url = self.config.url.clone();
        let (ws_stream, _) = tokio::select! {
            biased;
            _ = stop.stopped() => {
                info!(url = %url, "stopped before rosbridge handshake completed");
                return Ok(());
            }
            connected = connect_async(url.as_str()) => connected
                .map_err(|e| BridgeError::Transport(format!("connect to {url}: {e}")))?,
        };
        info!(url = %url, input = %self.config.input_topic, output = %self.config.output_topic, "connected to rosbridge");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut outbound = self
            .bus
            .subscribe_to(&self.config.output_topic, self.config.output_queue);

        send_json(
            &mut ws_tx,
            &subscribe_op(&self.config.input_topic, self.config.input_queue.depth.max(1)),
        )
        .await?;
        send_json(&mut ws_tx, &advertise_op(&self.config.output_topic)).await?;

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                next = outbound.recv() => match next {
                    Some(Event { payload: EventPayload::Detections(detections), .. }) => {
                        let frame = publish_op(&self.config.output_topic, &detections)?;
                        send_json(&mut ws_tx, &frame).await?;
                    }
                    Some(other) => {
                        warn!(source = %other.source, "non-detection event on output topic; skipped");
                    }
                    None => break,
                },
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.ingest_frame(text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(BridgeError::Transport(format!("{url} closed the connection")));
                    }
                    Some(Err(e)) => {
                        return Err(BridgeError::Transport(format!("{url}: {e}")));
                    }
                    _ => {}
                },
            }
        }

        info!(url = %url, "leaving rosbridge");
        match tokio::time::timeout(UNWIRE_TIMEOUT, unwire(&mut ws_tx, &self.config)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %url, timeout = ?UNWIRE_TIMEOUT, "rosbridge did not take the goodbye; dropping connection");
                Ok(())
            }
        }
    }
}

/// Unsubscribe, unadvertise and close the socket.
async fn unwire<S>(sink: &mut S, config: &RosbridgeConfig) -> Result<(), BridgeError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    send_json(sink, &unsubscribe_op(&config.input_topic)).await?;
    send_json(sink, &unadvertise_op(&config.output_topic)).await?;
    sink.close()
        .await
        .map_err(|e| BridgeError::Transport(format!("close {}: {e}", config.url)))
}

async fn send_json<S>(sink: &mut S, value: &Value) -> Result<(), BridgeError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    sink.send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| BridgeError::Transport(format!("ws send: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::stop_channel;
    use segbridge_types::{Detection, Header, Point, Time, Vector3};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const IN: &str = "/hanp_to_iri_converter/in_humans";
    const OUT: &str = "/hanp_to_iri_converter/out_humans";

    fn humans_frame(track_id: u64) -> String {
        json!({
            "op": "publish",
            "topic": IN,
            "msg": {
                "header": {"seq": 1, "stamp": {"secs": 1, "nsecs": 0}, "frame_id": "map"},
                "humans": [{"track_id": track_id, "segments": []}]
            }
        })
        .to_string()
    }

    fn sample_detections() -> DetectionArray {
        DetectionArray {
            header: Header {
                seq: 0,
                stamp: Time::new(5, 0),
                frame_id: "/map".to_string(),
            },
            detection: vec![Detection {
                id: 7,
                position: Point::new(1.0, 2.0, 3.0),
                velocity: Vector3::new(0.1, 0.0, 0.0),
                covariance: vec![0.0; 36],
            }],
        }
    }

    #[test]
    fn subscribe_op_carries_type_and_queue_length() {
        let op = subscribe_op(IN, 1);
        assert_eq!(op["op"], "subscribe");
        assert_eq!(op["topic"], IN);
        assert_eq!(op["type"], INPUT_MSG_TYPE);
        assert_eq!(op["queue_length"], 1);
    }

    #[test]
    fn advertise_op_carries_output_type() {
        let op = advertise_op(OUT);
        assert_eq!(op["op"], "advertise");
        assert_eq!(op["type"], OUTPUT_MSG_TYPE);
    }

    #[test]
    fn publish_op_uses_wire_field_names() {
        let op = publish_op(OUT, &sample_detections()).unwrap();
        assert_eq!(op["op"], "publish");
        assert_eq!(op["topic"], OUT);
        assert_eq!(op["msg"]["header"]["frame_id"], "/map");
        assert_eq!(op["msg"]["detection"][0]["id"], 7);
        assert_eq!(op["msg"]["detection"][0]["covariances"].as_array().unwrap().len(), 36);
    }

    #[test]
    fn decode_frame_accepts_publish_on_input_topic() {
        let batch = decode_frame(&humans_frame(4), IN).unwrap().unwrap();
        assert_eq!(batch.humans[0].track_id, 4);
    }

    #[test]
    fn decode_frame_ignores_other_topics_and_ops() {
        let other_topic = json!({"op": "publish", "topic": "/elsewhere", "msg": {}}).to_string();
        assert!(decode_frame(&other_topic, IN).unwrap().is_none());

        let status = json!({"op": "status", "level": "info", "msg": "hello"}).to_string();
        assert!(decode_frame(&status, IN).unwrap().is_none());
    }

    #[test]
    fn decode_frame_rejects_malformed_payloads() {
        assert!(matches!(decode_frame("not json", IN), Err(BridgeError::Parsing(_))));

        let bad = json!({"op": "publish", "topic": IN, "msg": {"humans": [{"track_id": "seven"}]}})
            .to_string();
        assert!(matches!(decode_frame(&bad, IN), Err(BridgeError::Parsing(_))));

        let missing = json!({"op": "publish", "topic": IN}).to_string();
        assert!(matches!(decode_frame(&missing, IN), Err(BridgeError::Parsing(_))));
    }

    #[tokio::test]
    async fn ingest_frame_publishes_on_input_topic() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(IN, QueuePolicy::default());
        let client = RosbridgeClient::new(
            RosbridgeConfig {
                input_topic: IN.to_string(),
                output_topic: OUT.to_string(),
                ..Default::default()
            },
            bus.clone(),
        );

        assert_eq!(client.ingest_frame(&humans_frame(11)), 1);
        assert_eq!(client.ingest_frame("garbage"), 0);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, format!("segbridge-middleware::rosbridge{IN}"));
        match event.payload {
            EventPayload::TrackedHumans(batch) => assert_eq!(batch.humans[0].track_id, 11),
            other => panic!("expected TrackedHumans, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_failure_is_a_transport_error() {
        // Port 9 (discard) is not expected to run a WebSocket server.
        let client = RosbridgeClient::new(
            RosbridgeConfig {
                url: "ws://127.0.0.1:9".to_string(),
                ..Default::default()
            },
            EventBus::default(),
        );
        let (_handle, signal) = stop_channel();
        let result = client.run(signal).await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
    }

    #[tokio::test]
    async fn stop_during_handshake_returns_promptly() {
        // Accepts TCP but never answers the WebSocket upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let client = RosbridgeClient::new(
            RosbridgeConfig {
                url: format!("ws://{addr}"),
                ..Default::default()
            },
            EventBus::default(),
        );
        let (handle, signal) = stop_channel();
        let task = tokio::spawn(client.run(signal));

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop();

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("run must honour stop while connecting")
            .unwrap();
        assert!(result.is_ok());
        silent.abort();
    }

    #[tokio::test]
    async fn stop_before_run_skips_connecting() {
        let client = RosbridgeClient::new(
            RosbridgeConfig {
                url: "ws://127.0.0.1:9".to_string(),
                ..Default::default()
            },
            EventBus::default(),
        );
        let (handle, signal) = stop_channel();
        handle.stop();
        assert!(client.run(signal).await.is_ok());
    }

    /// Full session against an in-process WebSocket server playing the part
    /// of rosbridge.
    #[tokio::test]
    async fn run_relays_both_directions_and_unwires_on_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let bus = EventBus::default();
        let mut inbound = bus.subscribe_to(IN, QueuePolicy::default());
        let client = RosbridgeClient::new(
            RosbridgeConfig {
                url: format!("ws://{addr}"),
                input_topic: IN.to_string(),
                output_topic: OUT.to_string(),
                ..Default::default()
            },
            bus.clone(),
        );
        let (handle, signal) = stop_channel();
        let client_task = tokio::spawn(client.run(signal));

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = accept_async(stream).await.unwrap();

        async fn next_op(server: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Value {
            loop {
                match server.next().await.unwrap().unwrap() {
                    Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                    _ => continue,
                }
            }
        }

        assert_eq!(next_op(&mut server).await["op"], "subscribe");
        assert_eq!(next_op(&mut server).await["op"], "advertise");

        // rosbridge -> bus
        server.send(Message::Text(humans_frame(21).into())).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event.payload, EventPayload::TrackedHumans(_)));

        // bus -> rosbridge; the client's outbound subscription exists once
        // the wiring ops have been sent.
        let out = Event::new("test", EventPayload::Detections(sample_detections()));
        assert_eq!(bus.publish_to(OUT, out).unwrap(), 1);
        let published = next_op(&mut server).await;
        assert_eq!(published["op"], "publish");
        assert_eq!(published["topic"], OUT);
        assert_eq!(published["msg"]["detection"][0]["id"], 7);

        handle.stop();
        assert_eq!(next_op(&mut server).await["op"], "unsubscribe");
        assert_eq!(next_op(&mut server).await["op"], "unadvertise");

        let result = tokio::time::timeout(Duration::from_secs(2), client_task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok(), "clean stop must return Ok, got {result:?}");
    }
}
