//! CLI command implementations

pub mod batch;
pub mod repo;
pub mod upload;

pub use batch::{BatchArgs, CheckUpdatesArgs};
pub use repo::RepoCommand;
pub use upload::UploadArgs;
