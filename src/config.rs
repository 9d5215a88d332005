use crate::constants::DATA_READY_TIMEOUT_MS;

/// Configuration settings for the BNO086 driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// How long `read_packet` waits for the data-ready line, in milliseconds.
    pub ready_timeout_ms: u32,
    /// Report interval requested when `init` enables the default sensor
    /// streams, in microseconds.
    pub report_interval_us: u32,
}

impl Config {
    /// Creates a new `Config` instance.
    ///
    /// # Arguments
    ///
    /// * `ready_timeout_ms` - Data-ready wait window in milliseconds.
    /// * `report_interval_us` - Default sensor report interval in microseconds.
    ///
    /// # Returns
    ///
    /// A new `Config` instance with the specified values.
    pub fn new(ready_timeout_ms: u32, report_interval_us: u32) -> Config {
        Config {
            ready_timeout_ms,
            report_interval_us,
        }
    }

    /// Sets the data-ready wait window for the configuration.
    ///
    /// # Arguments
    ///
    /// * `timeout_ms` - The window in milliseconds.
    ///
    /// # Returns
    ///
    /// The updated `Config` instance.
    pub fn ready_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.ready_timeout_ms = timeout_ms;
        self
    }

    /// Sets the default sensor report interval for the configuration.
    ///
    /// # Arguments
    ///
    /// * `interval_us` - The interval in microseconds.
    ///
    /// # Returns
    ///
    /// The updated `Config` instance.
    pub fn report_interval_us(mut self, interval_us: u32) -> Self {
        self.report_interval_us = interval_us;
        self
    }
}

/// Provides default configuration values for the BNO086 driver.
impl Default for Config {
    /// Returns the default configuration: a 2000 ms data-ready window and a
    /// 10 ms (100 Hz) report interval.
    fn default() -> Config {
        Config {
            ready_timeout_ms: DATA_READY_TIMEOUT_MS,
            report_interval_us: 10_000,
        }
    }
}
