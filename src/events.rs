//! Structured events emitted by the crawl engine
//!
//! The engine never logs directly. It reports through an injected
//! [`EventSink`], which [`TracingSink`] forwards to `tracing` and
//! [`MemorySink`] records for inspection.

use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::crawl::{Ecosystem, ErrorKind, PassState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    PassStateChanged {
        state: PassState,
    },
    EcosystemSelected {
        ecosystem: Ecosystem,
        purl: String,
    },
    CrawlingPackage {
        ecosystem: Ecosystem,
        purl: String,
        source: Option<String>,
    },
    LabelFound {
        label: String,
        value: String,
    },
    UnsupportedEcosystem {
        ty: String,
        purl: String,
    },
    PackageFailed {
        purl: String,
        kind: ErrorKind,
        error: String,
    },
}

/// Fire-and-forget receiver of crawl events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CrawlEvent);
}

/// Forwards events to the global `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::PassStateChanged { state } => {
                info!(state = state.as_str(), "Crawl pass state changed")
            }
            CrawlEvent::EcosystemSelected { ecosystem, purl } => {
                info!(ecosystem = ecosystem.as_str(), purl = %purl, "Selected ecosystem")
            }
            CrawlEvent::CrawlingPackage {
                ecosystem,
                purl,
                source,
            } => info!(
                ecosystem = ecosystem.as_str(),
                purl = %purl,
                source = source.as_deref().unwrap_or("<registry>"),
                "Crawling package"
            ),
            CrawlEvent::LabelFound { label, value } => {
                info!(label = %label, value = %value, "Found an image label")
            }
            CrawlEvent::UnsupportedEcosystem { ty, purl } => {
                error!(purl_type = %ty, purl = %purl, "Unsupported package type")
            }
            CrawlEvent::PackageFailed { purl, kind, error } => {
                warn!(purl = %purl, kind = kind.as_str(), error = %error, "Package failed")
            }
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<CrawlEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<CrawlEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: CrawlEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
