// The BNO086 exposes six SHTP communication channels. Each keeps its own
// 8-bit send sequence counter.
pub const NUM_CHANNELS: usize = 6;
pub const CHANNEL_COMMAND: u8 = 0;
pub const CHANNEL_EXECUTABLE: u8 = 1;
pub const CHANNEL_CONTROL: u8 = 2;
pub const CHANNEL_REPORTS: u8 = 3;
pub const CHANNEL_WAKE_REPORTS: u8 = 4;
pub const CHANNEL_GYRO: u8 = 5;

// SHTP header: little-endian 16-bit total length (top bit is a continuation
// flag), channel byte, sequence byte.
pub const HEADER_LEN: usize = 4;
pub const LENGTH_CONTINUATION_MASK: u16 = 0x7FFF;

// Payload ceilings. Inbound packets can reach ~1 KiB (advertisement, FRS
// metadata); everything we send is far smaller.
pub const MAX_RX_PAYLOAD: usize = 1020;
pub const MAX_TX_PAYLOAD: usize = 128;

// Control-channel report IDs (figure 34, page 36 of the reference manual).
pub const SHTP_COMMAND_RESPONSE: u8 = 0xF1;
pub const SHTP_COMMAND_REQUEST: u8 = 0xF2;
pub const SHTP_FRS_READ_RESPONSE: u8 = 0xF3;
pub const SHTP_FRS_READ_REQUEST: u8 = 0xF4;
pub const SHTP_FRS_WRITE_RESPONSE: u8 = 0xF5;
pub const SHTP_FRS_WRITE_REQUEST: u8 = 0xF6;
pub const SHTP_FRS_WRITE_DATA: u8 = 0xF7;
pub const SHTP_PRODUCT_ID_RESPONSE: u8 = 0xF8;
pub const SHTP_PRODUCT_ID_REQUEST: u8 = 0xF9;
pub const SHTP_BASE_TIMESTAMP: u8 = 0xFB;
pub const SHTP_GET_FEATURE_RESPONSE: u8 = 0xFC;
pub const SHTP_SET_FEATURE_COMMAND: u8 = 0xFD;
pub const SHTP_GET_FEATURE_REQUEST: u8 = 0xFE;

// Sensor report IDs, used both to enable a feature and as the sub-record tag
// inside input reports.
pub const SENSOR_REPORT_ACCELEROMETER: u8 = 0x01;
pub const SENSOR_REPORT_GYROSCOPE: u8 = 0x02;
pub const SENSOR_REPORT_MAGNETOMETER: u8 = 0x03;

// Executable-channel command bytes (figure 1-27 of the datasheet).
pub const EXECUTABLE_RESET: u8 = 0x01;

// Fixed-point Q points per report type, from the datasheet.
pub const ACCELEROMETER_Q_POINT: u8 = 8;
pub const GYROSCOPE_Q_POINT: u8 = 9;
pub const MAGNETOMETER_Q_POINT: u8 = 4;

// Physical conversion constants. Accel reports are descaled to g, gyro to
// degrees per second, magnetometer stays in microtesla.
pub const STANDARD_GRAVITY: f32 = 9.80665;
pub const RAD_TO_DEG: f32 = 57.295_78;

// Default 7-bit I2C address (SA0 low).
pub const DEFAULT_I2C_ADDRESS: u8 = 0x4A;

// Ready-line polling: how long to wait for the interrupt line to assert
// before giving up, and how long to sleep between polls.
pub const DATA_READY_TIMEOUT_MS: u32 = 2000;
pub const READY_POLL_INTERVAL_MS: u32 = 1;

// Window used when draining the advertisement/reset packets the device
// pushes after boot; much shorter than the normal data-ready timeout.
pub const DRAIN_TIMEOUT_MS: u32 = 100;
