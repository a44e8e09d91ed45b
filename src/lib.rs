pub mod audio_mixer;
pub mod composer;
pub mod config;
pub mod download;
pub mod duration;
pub mod error;
pub mod generation;
pub mod handler;
pub mod media_tool;
pub mod pipeline;
pub mod publisher;
pub mod retry;
pub mod scene;
pub mod scene_builder;
pub mod script;

pub use composer::{compose, CompositionPlan, ConcatMode};
pub use config::{ConfigLoader, PipelineConfig};
pub use error::{PipelineError, Result};
pub use generation::{GenerationBackend, HttpGenerationBackend};
pub use pipeline::{PipelineState, Publisher, ScenePipeline};
pub use publisher::HttpPublisher;
pub use scene::{AssetKind, ClipPair, Dialogue, GeneratedAsset, SceneSpec};
pub use scene_builder::SceneAssetBuilder;
pub use script::{parse_scene_script, PendingResponse, ResponseRouter};
