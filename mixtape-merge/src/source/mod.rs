//! Source resolution: classification, containment, acquisition and release

pub mod classify;
pub mod handle;
pub mod resolver;

pub use classify::{canonicalize_reference, Canonical, Classifier, SourceRef};
pub use handle::{release_all, release_all_async, ResourceLedger, SourceHandle, WorkArea};
pub use resolver::{
    PlatformDownloader, ResolvedToken, SourceResolver, StorageTokenResolver, TokenResolver,
};
