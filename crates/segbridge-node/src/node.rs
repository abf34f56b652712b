//! [`ConverterNode`] – lifecycle wrapper around [`SegmentExtractor`].
//!
//! The node owns its configuration explicitly; there is no process-wide
//! state.  [`ConverterNode::initialize`] wires the input subscription and
//! output topic on the [`EventBus`], [`ConverterNode::run`] dispatches
//! batches one at a time until a [`StopHandle`] fires or the bus closes.
//!
//! # Example
//!
//! ```rust,no_run
//! use segbridge_middleware::EventBus;
//! use segbridge_node::node::{ConverterNode, NodeConfig};
//!
//! # async fn demo() {
//! let bus = EventBus::default();
//! let node = ConverterNode::initialize(NodeConfig::default(), bus.clone());
//! let stop = node.stop_handle();
//! let task = tokio::spawn(node.run());
//! // ... later
//! stop.stop();
//! let processed = task.await.unwrap();
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use segbridge_middleware::{
    EventBus, MessageHandler, QueuePolicy, StopHandle, TopicReceiver, resolve_private_topic,
    spin, stop_channel,
};
use segbridge_types::{BridgeError, Event, EventPayload, TrackedHumans};
use tracing::{debug, info, warn};

use crate::extractor::{ExtractorConfig, SegmentExtractor};

/// Default node name; also the private namespace of relative topics.
pub const NODE_NAME: &str = "hanp_to_iri_converter";
/// Default (relative) input topic.
pub const HUMANS_SUB_TOPIC: &str = "in_humans";
/// Default (relative) output topic.
pub const HUMANS_PUB_TOPIC: &str = "out_humans";

/// Configuration bundle for [`ConverterNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub node_name: String,
    /// Relative names resolve under `/<node_name>/`.
    pub input_topic: String,
    pub output_topic: String,
    pub input_queue: QueuePolicy,
    /// Queue for whoever drains the output topic (the transport).
    pub output_queue: QueuePolicy,
    pub extractor: ExtractorConfig,
}

impl NodeConfig {
    pub fn resolved_input_topic(&self) -> String {
        resolve_private_topic(&self.node_name, &self.input_topic)
    }

    pub fn resolved_output_topic(&self) -> String {
        resolve_private_topic(&self.node_name, &self.output_topic)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: NODE_NAME.to_string(),
            input_topic: HUMANS_SUB_TOPIC.to_string(),
            output_topic: HUMANS_PUB_TOPIC.to_string(),
            input_queue: QueuePolicy::default(),
            output_queue: QueuePolicy::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Converter (the handler)
// ─────────────────────────────────────────────────────────────────────────────

/// Converts inbound batches and publishes the result.
pub struct Converter {
    node_name: String,
    extractor: SegmentExtractor,
    bus: EventBus,
    output_topic: String,
    announced: AtomicBool,
    processed: AtomicU64,
}

impl Converter {
    fn source(&self) -> String {
        format!("segbridge-node::{}", self.node_name)
    }

    /// Transform `batch` and publish it on the output topic.
    ///
    /// Returns the number of subscribers that accepted the output.
    pub fn convert(&self, batch: &TrackedHumans) -> Result<usize, BridgeError> {
        if !self.announced.swap(true, Ordering::Relaxed) {
            info!(node = %self.node_name, "got humans");
        }

        let detections = self.extractor.transform(batch);
        debug!(
            humans = batch.humans.len(),
            detections = detections.detection.len(),
            "converted batch"
        );
        self.processed.fetch_add(1, Ordering::Relaxed);

        let event = Event::new(self.source(), EventPayload::Detections(detections));
        self.bus.publish_to(&self.output_topic, event)
    }

    /// Batches converted so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

impl MessageHandler for Converter {
    fn handle(&self, event: Event) -> Result<(), BridgeError> {
        match &event.payload {
            EventPayload::TrackedHumans(batch) => self.convert(batch).map(|_| ()),
            EventPayload::Detections(_) => {
                warn!(source = %event.source, "unexpected detections on input topic; ignored");
                Ok(())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConverterNode
// ─────────────────────────────────────────────────────────────────────────────

/// A wired converter ready to [`run`](ConverterNode::run).
pub struct ConverterNode {
    converter: Converter,
    input: TopicReceiver,
    stop: StopHandle,
}

impl ConverterNode {
    /// Subscribe to the input topic and prepare the output topic.
    pub fn initialize(config: NodeConfig, bus: EventBus) -> Self {
        let input_topic = config.resolved_input_topic();
        let output_topic = config.resolved_output_topic();

        let input = bus.subscribe_to(&input_topic, config.input_queue);
        let policy = input.policy();
        let (stop, _) = stop_channel();

        info!(
            node = %config.node_name,
            input = %input_topic,
            output = %output_topic,
            segment = %config.extractor.target_segment_type,
            queue = policy.depth,
            eviction = ?policy.eviction,
            "converter initialised"
        );

        Self {
            converter: Converter {
                node_name: config.node_name,
                extractor: SegmentExtractor::new(config.extractor),
                bus,
                output_topic,
                announced: AtomicBool::new(false),
                processed: AtomicU64::new(0),
            },
            input,
            stop,
        }
    }

    /// Handle to request cooperative shutdown of [`run`](Self::run).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn input_topic(&self) -> &str {
        self.input.topic()
    }

    pub fn output_topic(&self) -> &str {
        &self.converter.output_topic
    }

    /// Process batches until stopped or the bus closes.
    ///
    /// Returns the number of batches converted.
    pub async fn run(mut self) -> u64 {
        let signal = self.stop.signal();
        spin(&mut self.input, &self.converter, signal).await;
        let processed = self.converter.processed();
        debug!(node = %self.converter.node_name, processed, "converter stopped");
        processed
    }
}
