use log::debug;

use crate::constants::*;
use crate::packet::ByteReader;

/// One 3-axis sample in physical units.
///
/// Accelerometer samples are in g, gyroscope samples in degrees per second,
/// magnetometer samples in microtesla.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisData {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// The decoded content of one input-report packet.
///
/// Each field is present only if the packet carried a sub-record for that
/// sensor; a packet routinely carries one, two, or all three.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuSample {
    pub accel: Option<AxisData>,
    pub gyro: Option<AxisData>,
    pub mag: Option<AxisData>,
}

// Converts a fixed-point value with `q` fractional bits to float.
fn q_to_f32(raw: i16, q: u8) -> f32 {
    f32::from(raw) / (1u32 << q) as f32
}

fn scale_axes(x: i16, y: i16, z: i16, q: u8, factor: f32) -> AxisData {
    AxisData {
        x: q_to_f32(x, q) * factor,
        y: q_to_f32(y, q) * factor,
        z: q_to_f32(z, q) * factor,
    }
}

/// Decodes an input-report payload into an `ImuSample`.
///
/// The payload must lead with the 5-byte base-timestamp record (report ID
/// `0xFB` plus a 32-bit time delta). After it, sub-records are walked in
/// fixed 10-byte steps: tag byte, 16-bit sequence counter, status byte, then
/// three little-endian signed 16-bit axis values. Unrecognized tags are
/// skipped; a trailing short record ends the walk.
pub(crate) fn decode_input_report(payload: &[u8]) -> ImuSample {
    let mut sample = ImuSample::default();
    let mut reader = ByteReader::new(payload);

    match reader.read_u8() {
        Some(SHTP_BASE_TIMESTAMP) => {}
        _ => return sample,
    }
    if reader.skip(4).is_none() {
        return sample;
    }

    // 10 bytes per sub-record: tag, seq, status, x, y, z.
    while reader.remaining() >= 10 {
        let tag = match reader.read_u8() {
            Some(tag) => tag,
            None => break,
        };
        let (Some(_seq), Some(_status)) = (reader.read_u16_le(), reader.read_u8()) else {
            break;
        };
        let (Some(x), Some(y), Some(z)) = (
            reader.read_i16_le(),
            reader.read_i16_le(),
            reader.read_i16_le(),
        ) else {
            break;
        };

        match tag {
            SENSOR_REPORT_ACCELEROMETER => {
                // Q8 gives m/s^2; report in g.
                sample.accel = Some(scale_axes(
                    x,
                    y,
                    z,
                    ACCELEROMETER_Q_POINT,
                    1.0 / STANDARD_GRAVITY,
                ));
            }
            SENSOR_REPORT_GYROSCOPE => {
                // Q9 gives rad/s; report in deg/s.
                sample.gyro = Some(scale_axes(x, y, z, GYROSCOPE_Q_POINT, RAD_TO_DEG));
            }
            SENSOR_REPORT_MAGNETOMETER => {
                sample.mag = Some(scale_axes(x, y, z, MAGNETOMETER_Q_POINT, 1.0));
            }
            _ => {
                debug!("Skipping unrecognized input report tag {:02X}", tag);
            }
        }
    }

    sample
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: u8, x: i16, y: i16, z: i16) -> [u8; 10] {
        let mut r = [0u8; 10];
        r[0] = tag;
        r[4..6].copy_from_slice(&x.to_le_bytes());
        r[6..8].copy_from_slice(&y.to_le_bytes());
        r[8..10].copy_from_slice(&z.to_le_bytes());
        r
    }

    fn report(records: &[[u8; 10]]) -> std::vec::Vec<u8> {
        let mut payload = std::vec![SHTP_BASE_TIMESTAMP, 0, 0, 0, 0];
        for r in records {
            payload.extend_from_slice(r);
        }
        payload
    }

    #[test]
    fn zero_raw_decodes_to_zero() {
        let payload = report(&[
            record(SENSOR_REPORT_ACCELEROMETER, 0, 0, 0),
            record(SENSOR_REPORT_GYROSCOPE, 0, 0, 0),
            record(SENSOR_REPORT_MAGNETOMETER, 0, 0, 0),
        ]);
        let sample = decode_input_report(&payload);
        let zero = AxisData {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        };
        assert_eq!(sample.accel, Some(zero));
        assert_eq!(sample.gyro, Some(zero));
        assert_eq!(sample.mag, Some(zero));
    }

    #[test]
    fn descaling_is_linear_and_sign_preserving() {
        let once = decode_input_report(&report(&[record(SENSOR_REPORT_GYROSCOPE, 100, -100, 7)]));
        let twice = decode_input_report(&report(&[record(SENSOR_REPORT_GYROSCOPE, 200, -200, 14)]));
        let a = once.gyro.unwrap();
        let b = twice.gyro.unwrap();
        assert!((b.x - 2.0 * a.x).abs() < 1e-5);
        assert!((b.y - 2.0 * a.y).abs() < 1e-5);
        assert!((b.z - 2.0 * a.z).abs() < 1e-5);
        assert!(a.x > 0.0 && a.y < 0.0);
    }

    #[test]
    fn accel_q8_descales_to_g() {
        // Raw 0x0800 = 2048, Q8 scale 1/256 -> 8 m/s^2 -> ~0.816 g.
        let payload = report(&[record(SENSOR_REPORT_ACCELEROMETER, 0x0800, 0, 0)]);
        let accel = decode_input_report(&payload).accel.unwrap();
        assert!((accel.x - 0.81577).abs() < 1e-3);
        assert_eq!(accel.y, 0.0);
        assert_eq!(accel.z, 0.0);
    }

    #[test]
    fn unrecognized_tags_are_skipped_in_fixed_steps() {
        let payload = report(&[
            record(0x2A, 1, 2, 3),
            record(SENSOR_REPORT_MAGNETOMETER, 16, 32, -16),
        ]);
        let sample = decode_input_report(&payload);
        assert_eq!(sample.accel, None);
        // Q4: raw 16 -> 1.0 uT.
        let mag = sample.mag.unwrap();
        assert_eq!(mag.x, 1.0);
        assert_eq!(mag.y, 2.0);
        assert_eq!(mag.z, -1.0);
    }

    #[test]
    fn payload_without_timestamp_yields_empty_sample() {
        let sample = decode_input_report(&[0xFC, 0x01, 0x00]);
        assert_eq!(sample, ImuSample::default());
    }

    #[test]
    fn trailing_short_record_ends_walk() {
        let mut payload = report(&[record(SENSOR_REPORT_ACCELEROMETER, 256, 0, 0)]);
        payload.extend_from_slice(&[SENSOR_REPORT_GYROSCOPE, 0, 0]); // truncated
        let sample = decode_input_report(&payload);
        assert!(sample.accel.is_some());
        assert_eq!(sample.gyro, None);
    }
}
