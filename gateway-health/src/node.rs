use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A single upstream node's endpoints plus its lock-free health flags. Flags
/// are read by every request path and written only by the probe loop
/// (single-writer, many-reader).
#[derive(Debug)]
pub struct Node {
    pub http: Option<String>,
    pub ws: Option<String>,
    http_healthy: AtomicBool,
    ws_healthy: AtomicBool,
    last_http_height: AtomicU64,
    last_ws_height: AtomicU64,
}

impl Node {
    pub fn new(http: Option<String>, ws: Option<String>) -> Self {
        Self {
            http,
            ws,
            http_healthy: AtomicBool::new(true),
            ws_healthy: AtomicBool::new(true),
            last_http_height: AtomicU64::new(0),
            last_ws_height: AtomicU64::new(0),
        }
    }

    pub fn is_http_healthy(&self) -> bool {
        self.http_healthy.load(Ordering::Relaxed)
    }

    pub fn is_ws_healthy(&self) -> bool {
        self.ws_healthy.load(Ordering::Relaxed)
    }

    pub(crate) fn set_http_height(&self, height: u64) {
        self.last_http_height.store(height, Ordering::Relaxed);
    }

    pub(crate) fn set_ws_height(&self, height: u64) {
        self.last_ws_height.store(height, Ordering::Relaxed);
    }

    pub(crate) fn http_height(&self) -> u64 {
        self.last_http_height.load(Ordering::Relaxed)
    }

    pub(crate) fn ws_height(&self) -> u64 {
        self.last_ws_height.load(Ordering::Relaxed)
    }

    pub(crate) fn set_http_healthy(&self, healthy: bool) {
        self.http_healthy.store(healthy, Ordering::Relaxed);
    }

    pub(crate) fn set_ws_healthy(&self, healthy: bool) {
        self.ws_healthy.store(healthy, Ordering::Relaxed);
    }
}
