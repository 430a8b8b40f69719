pub mod cache;
pub mod condition;
pub mod config;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod expander;
pub mod imports;
pub mod project;
pub mod properties;
pub mod sdk;
pub mod shredder;
pub mod toolset;
pub mod xml;

pub use cache::ProjectRootElementCache;
pub use config::{EvaluationConfig, LoadSettings, NameComparison};
pub use environment::{parse_env_script, parse_env_script_file};
pub use error::{ErrorKind, ProjectError};
pub use evaluator::{EvaluatedProject, ProjectTarget};
pub use events::{CollectingLogger, EvaluationEvent, EvaluationLogger, ImportIgnoredReason, TracingLogger};
pub use imports::ResolvedImport;
pub use project::{Project, ProjectBuilder};
pub use properties::{ProjectItem, ProjectMetadata, ProjectProperty};
pub use sdk::{DirectorySdkResolver, SdkReference, SdkResolver, SdkResult};
pub use toolset::{Toolset, ToolsetCollection};
pub use xml::ProjectRootElement;
