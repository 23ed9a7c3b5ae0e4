//! Trustgraph inference core
//!
//! LLM-assisted reasoning over agent registry data:
//! - ranking candidate agents against a free-text query, with trust scores
//! - computing a 2D layout for a trust graph
//!
//! Both pipelines share the same three stages:
//!
//! ```text
//! request ──► PromptBuilder ──► ModelInvoker ──► ResponseExtractor ──► result
//!             (prompt.rs)       (invoker.rs)     (extract.rs)
//! ```
//!
//! Nothing here holds state across invocations. The only shared values are
//! immutable: the [`InferenceConfig`], the invoker, and the skill-card provider.

pub mod api;
pub mod cards;
pub mod config;
pub mod error;
pub mod extract;
pub mod invoker;
pub mod model;
pub mod pipeline;
pub mod prompt;

pub use api::{Api, ApiReply};
pub use cards::{DirectorySkillCards, NoSkillCards, SkillCardProvider};
pub use config::InferenceConfig;
pub use error::{ConfigError, ExtractError, InvokeError, PipelineError};
pub use extract::{ParserChain, ResponseParser};
pub use invoker::{MockInvoker, ModelInvoker, ModelRequest, OpenAiChatInvoker};
pub use model::*;
pub use pipeline::{AgentMatcher, GraphLayouter, LayoutRequest};
