//! `segbridge-middleware` – message plumbing around the converter.
//!
//! Routes messages between the outside world and the converter without
//! caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – named-topic publish/subscribe event bus with a bounded,
//!   policy-driven queue per subscription.
//! - [`handler`] – the [`MessageHandler`] capability, cooperative shutdown
//!   ([`StopHandle`] / [`StopSignal`]) and the [`spin`] dispatch loop.
//! - [`rosbridge`] – rosbridge v2 WebSocket transport that carries the input
//!   and output topics to and from a ROS graph.

pub mod bus;
pub mod handler;
pub mod rosbridge;

pub use bus::{EventBus, Eviction, QueuePolicy, TopicReceiver, resolve_private_topic};
pub use handler::{MessageHandler, StopHandle, StopSignal, spin, stop_channel};
pub use rosbridge::{RosbridgeClient, RosbridgeConfig};
