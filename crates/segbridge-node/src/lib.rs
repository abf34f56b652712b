//! `segbridge-node` – the HANP → IRI converter node.
//!
//! # Modules
//!
//! - [`extractor`] – [`SegmentExtractor`][extractor::SegmentExtractor]:
//!   the pure per-batch transform that keeps one body segment per tracked
//!   human and emits it as an IRI detection in the `/map` frame.
//! - [`node`] – [`ConverterNode`][node::ConverterNode]: wires the extractor
//!   to an input and output topic on the event bus and runs it until a
//!   cooperative stop is requested.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export.

pub mod extractor;
pub mod node;
pub mod telemetry;

pub use extractor::{ExtractorConfig, OUTPUT_FRAME_ID, SegmentExtractor};
pub use node::{Converter, ConverterNode, NodeConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
