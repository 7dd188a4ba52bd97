//! IPFIX flow collector for SONiC
//!
//! Receives IPFIX from routers over UDP, decodes template-driven records into
//! normalized [`Flow`]s, aligns them to an aggregation interval, optionally
//! annotates them with AS and prefix data from BIRD, and writes them out.
//!
//! # Architecture
//!
//! ```text
//!  UDP :4739
//!      │
//!      ▼
//!  ┌────────────────┐   get/set   ┌───────────────┐
//!  │ ingest workers │◀───────────▶│ TemplateCache │
//!  │ (N readers)    │             └───────────────┘
//!  └───────┬────────┘
//!          │ rendezvous
//!          ▼
//!  ┌────────────────┐   augment   ┌───────────────┐
//!  │ annotators     │────────────▶│ BirdAugmenter │
//!  │ (M per input)  │             └───────────────┘
//!  └───────┬────────┘
//!          │ rendezvous
//!          ▼
//!      flow sink
//! ```
//!
//! Every stage boundary is an unbuffered channel, so a slow sink stalls the
//! readers and excess datagrams are dropped by the kernel.
//!
//! [`Flow`]: sonic_flow_types::Flow

pub mod annotator;
pub mod augment;
pub mod config;
pub mod error;
pub mod field_layout;
pub mod handoff;
pub mod ingest;
pub mod metrics;
pub mod metrics_server;
pub mod sink;
pub mod stats;
pub mod template_cache;

pub use annotator::{align_timestamp, Annotation, Annotator};
pub use augment::{Augmenter, BirdAugmenter};
pub use config::{CollectorConfig, SinkKind};
pub use error::{CollectorError, Result};
pub use handoff::Shutdown;
pub use ingest::{IpfixServer, PacketProcessor};
pub use stats::{GlobalStats, StatsSnapshot};
pub use template_cache::{TemplateCache, TemplateKey};
