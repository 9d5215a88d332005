#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

use log::debug;

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod packet;
pub use packet::{Packet, ShtpHeader};

mod report;
pub use report::{AxisData, ImuSample};

mod interface;
pub use interface::{I2cInterface, SensorInterface, SpiInterface};

use packet::ByteReader;
use report::decode_input_report;

/// Static identifying information fetched from the device at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductId {
    /// Why the device last reset (power-on, watchdog, ...).
    pub reset_cause: u8,
    pub sw_version_major: u8,
    pub sw_version_minor: u8,
    pub sw_version_patch: u16,
    pub sw_part_number: u32,
    pub sw_build_number: u32,
}

impl ProductId {
    fn decode(payload: &[u8]) -> Result<ProductId, Error> {
        let mut r = ByteReader::new(payload);
        r.skip(1).ok_or(Error::InvalidPacket)?; // report ID
        let reset_cause = r.read_u8().ok_or(Error::InvalidPacket)?;
        let sw_version_major = r.read_u8().ok_or(Error::InvalidPacket)?;
        let sw_version_minor = r.read_u8().ok_or(Error::InvalidPacket)?;
        let sw_part_number = r.read_u32_le().ok_or(Error::InvalidPacket)?;
        let sw_build_number = r.read_u32_le().ok_or(Error::InvalidPacket)?;
        let sw_version_patch = r.read_u16_le().ok_or(Error::InvalidPacket)?;
        Ok(ProductId {
            reset_cause,
            sw_version_major,
            sw_version_minor,
            sw_version_patch,
            sw_part_number,
            sw_build_number,
        })
    }
}

/// Describes one sensor stream the host asks the device to produce.
///
/// Encoded as the 17-byte set-feature message; the get-feature response
/// parses back into the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureReport {
    /// Sensor report ID the descriptor applies to.
    pub report_id: u8,
    pub flags: u8,
    /// Change sensitivity threshold, in sensor-specific units.
    pub change_sensitivity: u16,
    /// Requested report interval in microseconds.
    pub report_interval_us: u32,
    /// Batch interval in microseconds (0 disables batching).
    pub batch_interval_us: u32,
    /// Sensor-specific configuration word.
    pub sensor_config: u32,
}

impl FeatureReport {
    /// Creates a descriptor for `report_id` at `report_interval_us`, with
    /// every other field zeroed.
    pub fn new(report_id: u8, report_interval_us: u32) -> FeatureReport {
        FeatureReport {
            report_id,
            flags: 0,
            change_sensitivity: 0,
            report_interval_us,
            batch_interval_us: 0,
            sensor_config: 0,
        }
    }

    fn encode(&self) -> [u8; 17] {
        let mut buf = [0u8; 17];
        buf[0] = SHTP_SET_FEATURE_COMMAND;
        buf[1] = self.report_id;
        buf[2] = self.flags;
        buf[3..5].copy_from_slice(&self.change_sensitivity.to_le_bytes());
        buf[5..9].copy_from_slice(&self.report_interval_us.to_le_bytes());
        buf[9..13].copy_from_slice(&self.batch_interval_us.to_le_bytes());
        buf[13..17].copy_from_slice(&self.sensor_config.to_le_bytes());
        buf
    }

    fn decode(payload: &[u8]) -> Result<FeatureReport, Error> {
        let mut r = ByteReader::new(payload);
        r.skip(1).ok_or(Error::InvalidPacket)?; // report ID
        Ok(FeatureReport {
            report_id: r.read_u8().ok_or(Error::InvalidPacket)?,
            flags: r.read_u8().ok_or(Error::InvalidPacket)?,
            change_sensitivity: r.read_u16_le().ok_or(Error::InvalidPacket)?,
            report_interval_us: r.read_u32_le().ok_or(Error::InvalidPacket)?,
            batch_interval_us: r.read_u32_le().ok_or(Error::InvalidPacket)?,
            sensor_config: r.read_u32_le().ok_or(Error::InvalidPacket)?,
        })
    }
}

/// Response to a command request on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResponse {
    pub sequence: u8,
    pub command: u8,
    pub command_sequence: u8,
    pub response_sequence: u8,
    pub params: [u8; 11],
}

impl CommandResponse {
    fn decode(payload: &[u8]) -> Result<CommandResponse, Error> {
        let mut r = ByteReader::new(payload);
        r.skip(1).ok_or(Error::InvalidPacket)?; // report ID
        let sequence = r.read_u8().ok_or(Error::InvalidPacket)?;
        let command = r.read_u8().ok_or(Error::InvalidPacket)?;
        let command_sequence = r.read_u8().ok_or(Error::InvalidPacket)?;
        let response_sequence = r.read_u8().ok_or(Error::InvalidPacket)?;
        let mut params = [0u8; 11];
        for p in params.iter_mut() {
            *p = r.read_u8().ok_or(Error::InvalidPacket)?;
        }
        Ok(CommandResponse {
            sequence,
            command,
            command_sequence,
            response_sequence,
            params,
        })
    }
}

/// Represents a BNO086 9-axis IMU speaking SHTP.
///
/// This struct provides methods to interact with the sensor, such as
/// initializing it, enabling report streams, reading samples and accessing
/// the device's flash record system.
///
/// # Type Parameters
///
/// * `I`: The bus interface used to communicate with the sensor. It must
///   implement [`SensorInterface`]; [`I2cInterface`] and [`SpiInterface`]
///   are provided.
pub struct Bno086<I> {
    interface: I,
    config: Config,
    // One 8-bit send counter per SHTP channel, wrapping mod 256.
    sequence: [u8; NUM_CHANNELS],
    command_sequence: u8,
    packet: Packet,
    // Set when a SPI exchange clocked back a complete packet during a send;
    // the next read_packet consumes it without touching the bus.
    pending: bool,
    product_id: Option<ProductId>,
}

impl<I> Bno086<I>
where
    I: SensorInterface,
{
    /// Creates a new `Bno086` driver instance.
    ///
    /// # Arguments
    ///
    /// * `interface`: The bus interface for communication with the sensor.
    /// * `config`: The initial configuration for the driver.
    ///
    /// # Returns
    ///
    /// A new `Bno086` instance.
    pub fn new(interface: I, config: Config) -> Self {
        Self {
            interface,
            config,
            sequence: [0; NUM_CHANNELS],
            command_sequence: 0,
            packet: Packet::new(),
            pending: false,
            product_id: None,
        }
    }

    /// Initializes the BNO086 according to the provided configuration.
    ///
    /// This involves:
    /// - Draining the advertisement and reset packets the device pushes
    ///   after boot.
    /// - Fetching and storing the product ID record.
    /// - Enabling the accelerometer, gyroscope and magnetometer streams at
    ///   the configured report interval.
    pub async fn init(&mut self) -> Result<(), Error> {
        self.drain().await;

        self.get_product_id().await.map_err(|e| {
            log::error!("Failed to fetch product ID during init: {:?}", e);
            e
        })?;

        let interval = self.config.report_interval_us;
        self.enable_accelerometer(interval).await.map_err(|e| {
            log::error!("Failed to enable accelerometer during init: {:?}", e);
            e
        })?;
        self.enable_gyroscope(interval).await.map_err(|e| {
            log::error!("Failed to enable gyroscope during init: {:?}", e);
            e
        })?;
        self.enable_magnetometer(interval).await.map_err(|e| {
            log::error!("Failed to enable magnetometer during init: {:?}", e);
            e
        })?;

        debug!("BNO086 init sequence complete.");
        Ok(())
    }

    /// Commands a soft reset over the executable channel and drains the
    /// packets the device emits while rebooting. Sequence counters restart
    /// from zero, matching the freshly reset device.
    pub async fn soft_reset(&mut self) -> Result<(), Error> {
        debug!("Issuing soft reset");
        self.send(CHANNEL_EXECUTABLE, &[EXECUTABLE_RESET]).await?;
        self.pending = false;
        self.sequence = [0; NUM_CHANNELS];
        self.command_sequence = 0;
        self.drain().await;
        Ok(())
    }

    /// The product ID record fetched by `init` or `get_product_id`, if any.
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    /// The most recently received packet.
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Releases the bus interface.
    pub fn release(self) -> I {
        self.interface
    }

    /// Wraps `payload` in an SHTP header and transmits it.
    ///
    /// The header carries the per-channel sequence number, which is
    /// post-incremented on every send. Over SPI, a packet the device clocks
    /// back during the exchange is kept for the next `read_packet` call.
    ///
    /// # Arguments
    ///
    /// * `channel`: SHTP channel number, must be in `[0, 5]`.
    /// * `payload`: At most 128 bytes.
    ///
    /// # Returns
    ///
    /// * `Ok(())` once the frame is on the wire.
    /// * `Err(Error::InvalidArg)` for an out-of-range channel or payload.
    /// * `Err(Error::WriteFailure)` / `Err(Error::Timeout)` for bus issues.
    pub async fn send(&mut self, channel: u8, payload: &[u8]) -> Result<(), Error> {
        if usize::from(channel) >= NUM_CHANNELS {
            log::error!("Channel {} out of range (0-5)", channel);
            return Err(Error::InvalidArg);
        }
        if payload.len() > MAX_TX_PAYLOAD {
            log::error!("Payload of {} bytes exceeds send ceiling", payload.len());
            return Err(Error::InvalidArg);
        }

        let sequence = self.sequence[usize::from(channel)];
        self.sequence[usize::from(channel)] = sequence.wrapping_add(1);

        let total = HEADER_LEN + payload.len();
        let mut frame = [0u8; HEADER_LEN + MAX_TX_PAYLOAD];
        frame[..HEADER_LEN].copy_from_slice(&ShtpHeader::new(channel, sequence, payload.len()).to_bytes());
        frame[HEADER_LEN..total].copy_from_slice(payload);

        debug!(
            "Sending {} byte packet on channel {} (seq {})",
            total, channel, sequence
        );
        let mut capture = [0u8; HEADER_LEN + MAX_TX_PAYLOAD];
        let captured = self.interface.write(&frame[..total], &mut capture).await?;
        if captured >= HEADER_LEN {
            self.stash_immediate(&capture[..captured]).await?;
        }
        Ok(())
    }

    // Keeps a packet captured during a full-duplex send, reading whatever
    // tail the capture window missed.
    async fn stash_immediate(&mut self, capture: &[u8]) -> Result<(), Error> {
        let mut hdr = [0u8; HEADER_LEN];
        hdr.copy_from_slice(&capture[..HEADER_LEN]);
        let header = ShtpHeader::from_bytes(&hdr);
        if header.is_empty() {
            return Ok(());
        }

        let payload_len = header.payload_len().min(MAX_RX_PAYLOAD);
        let got = (capture.len() - HEADER_LEN).min(payload_len);
        self.packet.payload[..got].copy_from_slice(&capture[HEADER_LEN..HEADER_LEN + got]);
        if payload_len > got {
            self.interface
                .read(&mut self.packet.payload[got..payload_len])
                .await?;
        }

        self.packet.channel = header.channel;
        self.packet.sequence = header.sequence;
        self.packet.len = payload_len;
        self.pending = true;
        debug!(
            "Captured immediate {} byte response on channel {}",
            payload_len, header.channel
        );
        Ok(())
    }

    /// Retrieves one inbound packet into the per-device buffer.
    ///
    /// Waits for the data-ready line (up to the configured timeout), reads
    /// the 4-byte header, then reads the payload. The payload length is the
    /// lower 15 bits of the length field minus the header, clamped to zero;
    /// anything beyond the buffer ceiling is left for the device's
    /// continuation handling.
    ///
    /// # Returns
    ///
    /// * `Ok(())` with the packet stored, readable via [`Bno086::packet`].
    /// * `Err(Error::Timeout)` if the ready line never asserts.
    /// * `Err(Error::ReadFailure)` if a bus read fails.
    pub async fn read_packet(&mut self) -> Result<(), Error> {
        if self.pending {
            self.pending = false;
            debug!("Consuming response captured during the previous send");
            return Ok(());
        }

        self.interface
            .wait_ready(self.config.ready_timeout_ms)
            .await?;

        let mut hdr = [0u8; HEADER_LEN];
        self.interface.read(&mut hdr).await?;
        let header = ShtpHeader::from_bytes(&hdr);

        let payload_len = header.payload_len().min(MAX_RX_PAYLOAD);
        if payload_len > 0 {
            self.interface
                .read(&mut self.packet.payload[..payload_len])
                .await?;
        }

        self.packet.channel = header.channel;
        self.packet.sequence = header.sequence;
        self.packet.len = payload_len;
        debug!(
            "Received {} byte packet on channel {} (seq {})",
            payload_len, header.channel, header.sequence
        );
        Ok(())
    }

    /// Reads one packet and decodes any input report it carries.
    ///
    /// A packet on the sensor-report channels whose payload leads with the
    /// base-timestamp report is decoded into an [`ImuSample`]; anything else
    /// yields an empty sample. Freshness is signalled by this method's
    /// `Result`, not by the sample content.
    pub async fn read_sample(&mut self) -> Result<ImuSample, Error> {
        self.read_packet().await?;
        if self.packet.channel == CHANNEL_REPORTS || self.packet.channel == CHANNEL_WAKE_REPORTS {
            Ok(decode_input_report(self.packet.payload()))
        } else {
            debug!(
                "Packet on channel {} is not an input report",
                self.packet.channel
            );
            Ok(ImuSample::default())
        }
    }

    /// Queries the product ID record (CMD 0xF9).
    ///
    /// # Returns
    ///
    /// * `Ok(ProductId)` with the decoded record, also stored on the driver.
    /// * `Err(Error)` if the exchange failed or the reply was unexpected.
    pub async fn get_product_id(&mut self) -> Result<ProductId, Error> {
        debug!("Requesting product ID (report 0xF9)");
        self.send(CHANNEL_CONTROL, &[SHTP_PRODUCT_ID_REQUEST, 0x00])
            .await?;
        self.receive_control(SHTP_PRODUCT_ID_RESPONSE).await?;

        let id = ProductId::decode(self.packet.payload())?;
        debug!(
            "Product ID: part {} version {}.{}.{} build {}",
            id.sw_part_number,
            id.sw_version_major,
            id.sw_version_minor,
            id.sw_version_patch,
            id.sw_build_number
        );
        self.product_id = Some(id);
        Ok(id)
    }

    /// Enables a sensor stream by sending the 17-byte set-feature message.
    pub async fn set_feature(&mut self, feature: &FeatureReport) -> Result<(), Error> {
        debug!(
            "Enabling feature {:02X} at {} us",
            feature.report_id, feature.report_interval_us
        );
        self.send(CHANNEL_CONTROL, &feature.encode()).await
    }

    /// Reads back the feature descriptor for `report_id` (CMD 0xFE).
    ///
    /// # Returns
    ///
    /// * `Ok(FeatureReport)` with the descriptor the device currently holds.
    /// * `Err(Error)` if the exchange failed or the reply was unexpected.
    pub async fn get_feature(&mut self, report_id: u8) -> Result<FeatureReport, Error> {
        debug!("Requesting feature descriptor {:02X}", report_id);
        self.send(CHANNEL_CONTROL, &[SHTP_GET_FEATURE_REQUEST, report_id])
            .await?;
        self.receive_control(SHTP_GET_FEATURE_RESPONSE).await?;
        FeatureReport::decode(self.packet.payload())
    }

    /// Enables the calibrated accelerometer stream.
    pub async fn enable_accelerometer(&mut self, interval_us: u32) -> Result<(), Error> {
        self.set_feature(&FeatureReport::new(SENSOR_REPORT_ACCELEROMETER, interval_us))
            .await
    }

    /// Enables the calibrated gyroscope stream.
    pub async fn enable_gyroscope(&mut self, interval_us: u32) -> Result<(), Error> {
        self.set_feature(&FeatureReport::new(SENSOR_REPORT_GYROSCOPE, interval_us))
            .await
    }

    /// Enables the calibrated magnetometer stream.
    pub async fn enable_magnetometer(&mut self, interval_us: u32) -> Result<(), Error> {
        self.set_feature(&FeatureReport::new(SENSOR_REPORT_MAGNETOMETER, interval_us))
            .await
    }

    /// Sends a 12-byte command request and waits for the matching response.
    ///
    /// # Arguments
    ///
    /// * `command`: The command byte (tare, calibrate, ...).
    /// * `params`: The 9 parameter bytes of the request.
    ///
    /// # Returns
    ///
    /// * `Ok(CommandResponse)` carrying the 11 response parameter bytes.
    /// * `Err(Error)` if the exchange failed or the reply was unexpected.
    pub async fn run_command(
        &mut self,
        command: u8,
        params: &[u8; 9],
    ) -> Result<CommandResponse, Error> {
        debug!("Running command {:02X}", command);
        let mut buf = [0u8; 12];
        buf[0] = SHTP_COMMAND_REQUEST;
        buf[1] = self.command_sequence;
        self.command_sequence = self.command_sequence.wrapping_add(1);
        buf[2] = command;
        buf[3..12].copy_from_slice(params);

        self.send(CHANNEL_CONTROL, &buf).await?;
        self.receive_control(SHTP_COMMAND_RESPONSE).await?;
        CommandResponse::decode(self.packet.payload())
    }

    /// Reads an FRS record in 32-bit words.
    ///
    /// # Arguments
    ///
    /// * `record_id`: The flash record to read.
    /// * `offset`: Word offset into the record.
    /// * `words`: Destination buffer; at most `words.len()` words are fetched.
    ///
    /// # Returns
    ///
    /// * `Ok(n)` with the number of words stored.
    /// * `Err(Error::CommandFailed)` if the device reports an error status.
    pub async fn frs_read(
        &mut self,
        record_id: u16,
        offset: u16,
        words: &mut [u32],
    ) -> Result<usize, Error> {
        debug!(
            "FRS read of record {:04X} at word offset {}",
            record_id, offset
        );
        let mut buf = [0u8; 8];
        buf[0] = SHTP_FRS_READ_REQUEST;
        buf[2..4].copy_from_slice(&offset.to_le_bytes());
        buf[4..6].copy_from_slice(&record_id.to_le_bytes());
        buf[6..8].copy_from_slice(&(words.len() as u16).to_le_bytes());
        self.send(CHANNEL_CONTROL, &buf).await?;

        let mut count = 0;
        loop {
            self.receive_control(SHTP_FRS_READ_RESPONSE).await?;
            let mut r = ByteReader::new(self.packet.payload());
            r.skip(1).ok_or(Error::InvalidPacket)?; // report ID
            let len_status = r.read_u8().ok_or(Error::InvalidPacket)?;
            let _word_offset = r.read_u16_le().ok_or(Error::InvalidPacket)?;
            let data0 = r.read_u32_le().ok_or(Error::InvalidPacket)?;
            let data1 = r.read_u32_le().ok_or(Error::InvalidPacket)?;

            let status = len_status & 0x0F;
            let data_len = usize::from(len_status >> 4);
            // 1: unrecognized record, 2: busy, 4: offset out of range,
            // 5: record empty, 8: device error.
            if matches!(status, 1 | 2 | 4 | 5 | 8) {
                log::error!("FRS read of {:04X} failed with status {}", record_id, status);
                return Err(Error::CommandFailed);
            }

            for (i, word) in [data0, data1].into_iter().enumerate() {
                if i < data_len && count < words.len() {
                    words[count] = word;
                    count += 1;
                }
            }

            // 3: read record completed, 7: block and record completed.
            if status == 3 || status == 7 || count >= words.len() {
                debug!("FRS read of {:04X} returned {} words", record_id, count);
                return Ok(count);
            }
        }
    }

    /// Writes an FRS record in 32-bit words, two per data message.
    ///
    /// # Arguments
    ///
    /// * `record_id`: The flash record to write.
    /// * `words`: The record content.
    ///
    /// # Returns
    ///
    /// * `Ok(())` once every word is acknowledged.
    /// * `Err(Error::CommandFailed)` if the device reports a failure status.
    pub async fn frs_write(&mut self, record_id: u16, words: &[u32]) -> Result<(), Error> {
        debug!(
            "FRS write of {} words to record {:04X}",
            words.len(),
            record_id
        );
        let mut buf = [0u8; 6];
        buf[0] = SHTP_FRS_WRITE_REQUEST;
        buf[2..4].copy_from_slice(&(words.len() as u16).to_le_bytes());
        buf[4..6].copy_from_slice(&record_id.to_le_bytes());
        self.send(CHANNEL_CONTROL, &buf).await?;
        self.check_frs_write_status().await?;

        for (i, chunk) in words.chunks(2).enumerate() {
            let mut data = [0u8; 12];
            data[0] = SHTP_FRS_WRITE_DATA;
            data[2..4].copy_from_slice(&((i * 2) as u16).to_le_bytes());
            data[4..8].copy_from_slice(&chunk[0].to_le_bytes());
            if let Some(second) = chunk.get(1) {
                data[8..12].copy_from_slice(&second.to_le_bytes());
            }
            self.send(CHANNEL_CONTROL, &data).await?;
            self.check_frs_write_status().await?;
        }
        Ok(())
    }

    async fn check_frs_write_status(&mut self) -> Result<(), Error> {
        self.receive_control(SHTP_FRS_WRITE_RESPONSE).await?;
        let status = self
            .packet
            .payload()
            .get(1)
            .copied()
            .ok_or(Error::InvalidPacket)?;
        // 0: word received, 3: write completed, 4: write mode ready,
        // 8: record valid.
        match status {
            0 | 3 | 4 | 8 => Ok(()),
            _ => {
                log::error!("FRS write failed with status {}", status);
                Err(Error::CommandFailed)
            }
        }
    }

    // Reads one packet and checks its leading report ID. On a mismatch, one
    // extra blocking read is attempted before giving up.
    async fn receive_control(&mut self, expected: u8) -> Result<(), Error> {
        self.read_packet().await?;
        if self.packet.payload().first() == Some(&expected) {
            return Ok(());
        }
        log::warn!(
            "Expected report {:02X}, got {:02X?}; reading one more packet",
            expected,
            self.packet.payload().first()
        );

        self.read_packet().await?;
        if self.packet.payload().first() == Some(&expected) {
            Ok(())
        } else {
            log::error!(
                "Expected report {:02X}, got {:02X?} again",
                expected,
                self.packet.payload().first()
            );
            Err(Error::UnexpectedReply)
        }
    }

    // Swallows whatever the device has queued, e.g. the advertisement and
    // reset-complete packets pushed after boot.
    async fn drain(&mut self) {
        let saved = self.config.ready_timeout_ms;
        self.config.ready_timeout_ms = DRAIN_TIMEOUT_MS;
        for _ in 0..32 {
            if self.read_packet().await.is_err() {
                break;
            }
        }
        self.config.ready_timeout_ms = saved;
    }
}
