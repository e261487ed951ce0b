use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Display path status queried before decrypting protected content.
pub trait OutputProtection: Send + Sync {
    fn is_source_uhd(&self) -> bool;
    fn is_hdcp_2_2(&self) -> bool;
}

/// Output protection state pushed by the host, for platforms without a
/// display driver query.
pub struct StaticOutputProtection {
    source_width: AtomicU32,
    source_height: AtomicU32,
    hdcp_2_2: AtomicBool,
}

impl StaticOutputProtection {
    pub fn new(hdcp_2_2: bool) -> Self {
        Self {
            source_width: AtomicU32::new(0),
            source_height: AtomicU32::new(0),
            hdcp_2_2: AtomicBool::new(hdcp_2_2),
        }
    }

    pub fn set_source_resolution(&self, width: u32, height: u32) {
        self.source_width.store(width, Ordering::Relaxed);
        self.source_height.store(height, Ordering::Relaxed);
    }

    pub fn set_hdcp_2_2(&self, connected: bool) {
        self.hdcp_2_2.store(connected, Ordering::Relaxed);
    }
}

impl OutputProtection for StaticOutputProtection {
    fn is_source_uhd(&self) -> bool {
        self.source_width.load(Ordering::Relaxed) >= 3840
            || self.source_height.load(Ordering::Relaxed) >= 2160
    }

    fn is_hdcp_2_2(&self) -> bool {
        self.hdcp_2_2.load(Ordering::Relaxed)
    }
}
