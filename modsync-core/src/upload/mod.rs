//! Upload orchestration: publish a data-file change and open a pull request

mod forge;
mod target;
mod workflow;

pub use forge::{ForgeClient, Fork, Interaction, NewPullRequest};
pub use target::{read_target, TargetFile};
pub use workflow::{ReachabilityCheck, UploadOutcome, UploadRequest, UploadStep, Uploader};
