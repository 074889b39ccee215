//! # Fallback Placeholders
//!
//! Static placeholder images served whenever a real thumbnail cannot be
//! produced, plus the best-effort "mark missing" report to the file index.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::services::file_index::FileIndex;

/// Why a placeholder is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackReason {
    SourceMissing,
    SourceCorrupt,
    TokenInvalid,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Placeholder {
    pub name: &'static str,
    pub content_type: &'static str,
    pub bytes: &'static [u8],
}

const SVG: &str = "image/svg+xml";

impl Placeholder {
    pub const GENERIC_PHOTO: Placeholder = Placeholder {
        name: "photo",
        content_type: SVG,
        bytes: br##"<svg xmlns="http://www.w3.org/2000/svg" width="96" height="96" viewBox="0 0 24 24"><rect width="24" height="24" fill="#e0e0e0"/><path fill="#9e9e9e" d="M21 19V5c0-1.1-.9-2-2-2H5c-1.1 0-2 .9-2 2v14c0 1.1.9 2 2 2h14c1.1 0 2-.9 2-2zM8.5 13.5l2.5 3.01L14.5 12l4.5 6H5l3.5-4.5z"/></svg>"##,
    };

    pub const BROKEN_FILE: Placeholder = Placeholder {
        name: "broken",
        content_type: SVG,
        bytes: br##"<svg xmlns="http://www.w3.org/2000/svg" width="96" height="96" viewBox="0 0 24 24"><rect width="24" height="24" fill="#e0e0e0"/><path fill="#9e9e9e" d="M21 5v6.59l-3-3.01-4 4.01-4-4-4 4-3-3.01V5c0-1.1.9-2 2-2h14c1.1 0 2 .9 2 2zm-3 6.42 3 3.01V19c0 1.1-.9 2-2 2H5c-1.1 0-2-.9-2-2v-6.58l3 2.99 4-4 4 4 4-3.99z"/></svg>"##,
    };
}

/// Picks placeholders and reports missing sources.
pub struct FallbackResolver {
    file_index: Arc<dyn FileIndex>,
}

impl FallbackResolver {
    pub fn new(file_index: Arc<dyn FileIndex>) -> Self {
        Self { file_index }
    }

    /// Pure lookup of the placeholder for `reason`.
    pub fn resolve(reason: FallbackReason) -> &'static Placeholder {
        match reason {
            FallbackReason::SourceMissing | FallbackReason::SourceCorrupt => {
                &Placeholder::BROKEN_FILE
            }
            FallbackReason::TokenInvalid => &Placeholder::GENERIC_PHOTO,
        }
    }

    /// Resolves the placeholder and, for missing sources, asks the file index
    /// to flag `file_id` as missing.
    ///
    /// The report runs on a detached task: its outcome is logged and never
    /// delays or fails the response.
    pub fn handle(&self, reason: FallbackReason, file_id: &str) -> &'static Placeholder {
        if reason == FallbackReason::SourceMissing {
            let file_index = Arc::clone(&self.file_index);
            let file_id = file_id.to_string();
            tokio::spawn(async move {
                match file_index.mark_missing(&file_id).await {
                    Ok(()) => debug!(%file_id, "Source flagged as missing"),
                    Err(e) => warn!(%file_id, error = %e, "Failed to flag source as missing"),
                }
            });
        }
        Self::resolve(reason)
    }
}
