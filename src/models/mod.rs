mod artifact;
mod options;
mod spec;
mod state;

pub use artifact::ThumbnailArtifact;
pub use options::{
    OptionFlag, ResampleFilter, ResampleMethod, ResampleOptions, ThumbFormat, UnknownFlag,
};
pub use spec::{CacheKey, FileDescriptor, ThumbnailSpec, validate_dimensions};
pub use state::AppState;
