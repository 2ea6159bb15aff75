//! # Controller Configuration

/// Tunables for one controller instance
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Interval between firmware state polls during bring-up (µs)
    pub poll_interval_us: u32,
    /// Interval between ring drains while waiting on a synchronous command (µs)
    pub sync_poll_interval_us: u32,
    /// Total time a synchronous command may take (µs)
    pub sync_timeout_us: u32,
    /// Watchdog ticks a command may stay posted when the request sets none
    pub default_timeout_ticks: u32,
    /// Upper bound on command slots, whatever the firmware reports
    pub max_commands_limit: u16,
    /// Upper bound on scatter-gather entries per command
    pub max_segments_limit: u16,
    /// Use 64-bit scatter-gather entries
    pub dma64: bool,
    /// Bring-up attempts during a reset before the device is given up
    pub max_reset_attempts: u32,
}

impl ControllerConfig {
    /// Bring-up poll interval: 100ms
    pub const DEFAULT_POLL_INTERVAL_US: u32 = 100_000;
    /// Synchronous drain interval: 1ms
    pub const DEFAULT_SYNC_POLL_INTERVAL_US: u32 = 1_000;
    /// Synchronous command budget: 50s
    pub const DEFAULT_SYNC_TIMEOUT_US: u32 = 50_000_000;
    /// Command TTL in watchdog ticks
    pub const DEFAULT_TIMEOUT_TICKS: u32 = 30;
    /// Slot cap
    pub const DEFAULT_MAX_COMMANDS: u16 = 128;
    /// SGL cap
    pub const DEFAULT_MAX_SEGMENTS: u16 = 256;

    /// Create default configuration
    pub fn new() -> Self {
        Self {
            poll_interval_us: Self::DEFAULT_POLL_INTERVAL_US,
            sync_poll_interval_us: Self::DEFAULT_SYNC_POLL_INTERVAL_US,
            sync_timeout_us: Self::DEFAULT_SYNC_TIMEOUT_US,
            default_timeout_ticks: Self::DEFAULT_TIMEOUT_TICKS,
            max_commands_limit: Self::DEFAULT_MAX_COMMANDS,
            max_segments_limit: Self::DEFAULT_MAX_SEGMENTS,
            dma64: true,
            max_reset_attempts: 3,
        }
    }

    /// Short timeouts for diagnostics and simulated hardware
    pub fn diagnostic() -> Self {
        Self {
            poll_interval_us: 1_000,
            sync_poll_interval_us: 10,
            sync_timeout_us: 10_000,
            default_timeout_ticks: 3,
            max_reset_attempts: 1,
            ..Self::new()
        }
    }

    /// Set the bring-up poll interval
    pub fn with_poll_interval(mut self, us: u32) -> Self {
        self.poll_interval_us = us;
        self
    }

    /// Set the synchronous command budget
    pub fn with_sync_timeout(mut self, us: u32) -> Self {
        self.sync_timeout_us = us;
        self
    }

    /// Set the default command TTL
    pub fn with_timeout_ticks(mut self, ticks: u32) -> Self {
        self.default_timeout_ticks = ticks;
        self
    }

    /// Cap the slot count
    pub fn with_max_commands(mut self, limit: u16) -> Self {
        self.max_commands_limit = limit;
        self
    }

    /// Cap the SGL length
    pub fn with_max_segments(mut self, limit: u16) -> Self {
        self.max_segments_limit = limit;
        self
    }

    /// Select 32- or 64-bit scatter-gather entries
    pub fn with_dma64(mut self, enabled: bool) -> Self {
        self.dma64 = enabled;
        self
    }

    /// Set how many bring-up attempts a reset makes
    pub fn with_reset_attempts(mut self, attempts: u32) -> Self {
        self.max_reset_attempts = attempts;
        self
    }

    /// Slot count for a firmware-reported maximum
    pub fn commands_for(&self, fw_max: u32) -> u16 {
        let fw = fw_max.min(u16::MAX as u32) as u16;
        fw.min(self.max_commands_limit).max(1)
    }

    /// SGL length for a firmware-reported maximum
    pub fn segments_for(&self, fw_max: u32) -> u16 {
        let fw = fw_max.min(u16::MAX as u32) as u16;
        fw.min(self.max_segments_limit).max(1)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}
