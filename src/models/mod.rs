pub mod content;
pub mod discovery;
pub mod media;

pub use content::{ContentBlock, ContentItem, ContentStatus, ContentType};
pub use discovery::{DiscoveryPayload, DiscoveryReport, MediaMapEntry, ValidationSummary};
pub use media::{MediaAsset, Provider};
