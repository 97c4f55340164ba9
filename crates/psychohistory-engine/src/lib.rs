//! The PsychoHistory tree orchestration core.
//!
//! [`TreeBuilder`] drives depth-synchronous wave scheduling over a
//! per-node two-phase pipeline ([`NodeProcessor`]): agentic web research
//! through [`AgenticResearcher`], then probability synthesis. Lifecycle
//! events stream through an [`EventSink`] as the build progresses.

pub mod builder;
pub mod events;
pub mod processor;
pub mod researcher;

pub use builder::{TreeBuilder, TreeBuilderConfig};
pub use events::{ChannelEventSink, EventSink, SinkError};
pub use processor::{NodePipeline, NodeProcessor, DEFAULT_JUSTIFICATION};
pub use researcher::{AgenticResearcher, ResearchRequest, ResearcherConfig};
