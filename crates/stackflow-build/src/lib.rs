//! StackFlow image build orchestration
//!
//! This crate decides, per service, whether a container image has to be built:
//! it rewrites image names for the managed registry, checks the registry for
//! an existing image and hands the remaining builds to a build executor.

pub mod auth;
pub mod cancel;
pub mod error;
pub mod executor;
pub mod image;
pub mod orchestrator;
pub mod progress;
pub mod registry;

pub use auth::{RegistryAuth, RegistryCredentials};
pub use cancel::CancelToken;
pub use error::{BuildError, Result};
pub use executor::{BuildExecutor, BuildRequest, BuildxExecutor, OutputMode, RecordingExecutor};
pub use image::{ImageRef, extract_registry, split_image_tag};
pub use orchestrator::{BuildOptions, BuildOrchestrator, BuildReport};
pub use progress::BuildProgress;
pub use registry::{HttpRegistry, ImageDigest, InMemoryRegistry, RegistryLookup};
