pub mod rewrite;

pub use rewrite::{rewrite_uploads, RewriteOutcome};
