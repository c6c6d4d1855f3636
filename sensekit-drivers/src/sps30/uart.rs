//! SPS30 over SHDLC/UART

use embedded_hal::delay::DelayNs;
use heapless::String;
use sensekit_hal::ByteStream;
use sensekit_protocol::{Session, SessionConfig};

use super::{
    parse_serial, DeviceStatus, Measurement, OutputFormat, ShdlcInfo, Sps30Error, VersionInfo,
    SERIAL_NUMBER_LEN,
};

/// SHDLC slave address of the SPS30
pub const SHDLC_ADDRESS: u8 = 0x00;

/// SHDLC command identifiers
mod cmd {
    pub const START_MEASUREMENT: u8 = 0x00;
    pub const STOP_MEASUREMENT: u8 = 0x01;
    pub const READ_MEASURED_VALUES: u8 = 0x03;
    pub const SLEEP: u8 = 0x10;
    pub const WAKE_UP: u8 = 0x11;
    pub const START_FAN_CLEANING: u8 = 0x56;
    pub const AUTO_CLEANING_INTERVAL: u8 = 0x80;
    pub const DEVICE_INFORMATION: u8 = 0xD0;
    pub const READ_VERSION: u8 = 0xD1;
    pub const READ_DEVICE_STATUS: u8 = 0xD2;
    pub const RESET: u8 = 0xD3;
}

/// Device information subcommand for the serial number
const INFO_SERIAL_NUMBER: u8 = 0x03;

/// Time the sensor needs after a reset before it answers again
const RESET_DELAY_MS: u32 = 100;

/// SPS30 driver on a serial link
pub struct Sps30Uart<C, D> {
    session: Session<C>,
    delay: D,
    version: Option<VersionInfo>,
}

impl<C: ByteStream, D: DelayNs> Sps30Uart<C, D> {
    /// Create a driver; `config` sets the response timeout
    pub fn new(channel: C, delay: D, config: SessionConfig) -> Self {
        Self {
            session: Session::new(channel, config),
            delay,
            version: None,
        }
    }

    /// Version read by the last successful [`probe`](Self::probe) or
    /// [`version`](Self::version)
    pub fn cached_version(&self) -> Option<VersionInfo> {
        self.version
    }

    /// Access the SHDLC session
    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    /// Take the channel and delay back
    pub fn release(self) -> (C, D) {
        (self.session.release(), self.delay)
    }

    /// Wake the sensor and read its version
    ///
    /// A failed wake-up is not fatal: the sensor may already be awake.
    pub fn probe(&mut self) -> Result<VersionInfo, Sps30Error> {
        debug!("SPS30 probe");
        if let Err(e) = self.wake_up() {
            debug!("SPS30 wake-up before probe failed: {}", e);
        }
        self.version()
    }

    /// Read firmware, hardware and SHDLC versions
    pub fn version(&mut self) -> Result<VersionInfo, Sps30Error> {
        let mut data = [0u8; 7];
        let n = self
            .session
            .send_and_receive(SHDLC_ADDRESS, cmd::READ_VERSION, &[], &mut data)?;
        if n != data.len() {
            return Err(Sps30Error::InvalidResponse);
        }

        let version = VersionInfo {
            firmware_major: data[0],
            firmware_minor: data[1],
            shdlc: Some(ShdlcInfo {
                hardware_revision: data[3],
                shdlc_major: data[5],
                shdlc_minor: data[6],
            }),
        };
        self.version = Some(version);
        Ok(version)
    }

    /// Read the serial number string
    pub fn serial_number(&mut self) -> Result<String<SERIAL_NUMBER_LEN>, Sps30Error> {
        let mut data = [0u8; SERIAL_NUMBER_LEN];
        let n = self.session.send_and_receive(
            SHDLC_ADDRESS,
            cmd::DEVICE_INFORMATION,
            &[INFO_SERIAL_NUMBER],
            &mut data,
        )?;
        parse_serial(&data[..n])
    }

    /// Start continuous measurement
    pub fn start_measurement(&mut self, format: OutputFormat) -> Result<(), Sps30Error> {
        self.session.execute(
            SHDLC_ADDRESS,
            cmd::START_MEASUREMENT,
            &[0x01, format.selector()],
        )?;
        Ok(())
    }

    /// Return to idle mode
    pub fn stop_measurement(&mut self) -> Result<(), Sps30Error> {
        self.session
            .execute(SHDLC_ADDRESS, cmd::STOP_MEASUREMENT, &[])?;
        Ok(())
    }

    /// Read the latest values
    ///
    /// Returns `None` when no new reading is available yet.
    pub fn read_measurement(&mut self) -> Result<Option<Measurement>, Sps30Error> {
        let mut data = [0u8; 40];
        let n = self.session.send_and_receive(
            SHDLC_ADDRESS,
            cmd::READ_MEASURED_VALUES,
            &[],
            &mut data,
        )?;
        if n == 0 {
            return Ok(None);
        }
        Measurement::from_bytes(&data[..n])
            .map(Some)
            .ok_or(Sps30Error::InvalidResponse)
    }

    /// Enter sleep mode (only from idle)
    pub fn sleep(&mut self) -> Result<(), Sps30Error> {
        self.session.execute(SHDLC_ADDRESS, cmd::SLEEP, &[])?;
        Ok(())
    }

    /// Leave sleep mode
    ///
    /// The raw wake-up byte only toggles the RX line; the framed command
    /// that follows is what the sensor acknowledges.
    pub fn wake_up(&mut self) -> Result<(), Sps30Error> {
        self.session.activate_transport()?;
        self.session.execute(SHDLC_ADDRESS, cmd::WAKE_UP, &[])?;
        Ok(())
    }

    /// Soft reset, then wait for the sensor to come back
    ///
    /// The reply is not awaited; the sensor reboots straight away.
    pub fn reset(&mut self) -> Result<(), Sps30Error> {
        self.session.send(SHDLC_ADDRESS, cmd::RESET, &[])?;
        self.delay.delay_ms(RESET_DELAY_MS);
        self.version = None;
        Ok(())
    }

    /// Read the fan auto-cleaning interval in seconds
    pub fn fan_auto_cleaning_interval(&mut self) -> Result<u32, Sps30Error> {
        let mut data = [0u8; 4];
        let n = self.session.send_and_receive(
            SHDLC_ADDRESS,
            cmd::AUTO_CLEANING_INTERVAL,
            &[0x00],
            &mut data,
        )?;
        if n != data.len() {
            return Err(Sps30Error::InvalidResponse);
        }
        Ok(u32::from_be_bytes(data))
    }

    /// Set the fan auto-cleaning interval in seconds (0 disables it)
    pub fn set_fan_auto_cleaning_interval(&mut self, seconds: u32) -> Result<(), Sps30Error> {
        let s = seconds.to_be_bytes();
        self.session.execute(
            SHDLC_ADDRESS,
            cmd::AUTO_CLEANING_INTERVAL,
            &[0x00, s[0], s[1], s[2], s[3]],
        )?;
        Ok(())
    }

    /// Run the fan at full speed for a cleaning cycle
    pub fn start_fan_cleaning(&mut self) -> Result<(), Sps30Error> {
        self.session
            .execute(SHDLC_ADDRESS, cmd::START_FAN_CLEANING, &[])?;
        Ok(())
    }

    /// Read the device status register, optionally clearing it
    pub fn device_status(&mut self, clear: bool) -> Result<DeviceStatus, Sps30Error> {
        let mut data = [0u8; 5];
        let n = self.session.send_and_receive(
            SHDLC_ADDRESS,
            cmd::READ_DEVICE_STATUS,
            &[clear as u8],
            &mut data,
        )?;
        if n != data.len() {
            return Err(Sps30Error::InvalidResponse);
        }
        Ok(DeviceStatus::from_register(u32::from_be_bytes([
            data[0], data[1], data[2], data[3],
        ])))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use sensekit_protocol::{stuff, stuff_response, ShdlcError, TransportError};
    use std::vec::Vec;

    #[derive(Debug)]
    struct MockError;

    impl embedded_io::Error for MockError {
        fn kind(&self) -> embedded_io::ErrorKind {
            embedded_io::ErrorKind::Other
        }
    }

    /// Sensor stand-in: records every write, answers reads from a script
    #[derive(Default)]
    struct MockSensor {
        written: Vec<Vec<u8>>,
        replies: Vec<Vec<u8>>,
        reject_raw_writes: bool,
    }

    impl MockSensor {
        fn reply(mut self, command: u8, state: u8, payload: &[u8]) -> Self {
            let frame = stuff_response(SHDLC_ADDRESS, command, state, payload).unwrap();
            self.replies.push(frame.as_slice().to_vec());
            self
        }
    }

    impl ByteStream for MockSensor {
        type Error = MockError;

        fn write(&mut self, data: &[u8]) -> Result<usize, MockError> {
            if self.reject_raw_writes && data.len() == 1 {
                return Ok(0);
            }
            self.written.push(data.to_vec());
            Ok(data.len())
        }

        fn read_until(
            &mut self,
            _delimiter: u8,
            buf: &mut [u8],
            _timeout_ms: u32,
        ) -> Result<usize, MockError> {
            if self.replies.is_empty() {
                return Ok(0);
            }
            let reply = self.replies.remove(0);
            buf[..reply.len()].copy_from_slice(&reply);
            Ok(reply.len())
        }
    }

    #[derive(Default)]
    struct MockDelay {
        total_ns: u64,
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += ns as u64;
        }
    }

    fn driver(sensor: MockSensor) -> Sps30Uart<MockSensor, MockDelay> {
        Sps30Uart::new(sensor, MockDelay::default(), SessionConfig::RELAXED)
    }

    fn request(command: u8, payload: &[u8]) -> Vec<u8> {
        stuff(SHDLC_ADDRESS, command, payload)
            .unwrap()
            .as_slice()
            .to_vec()
    }

    #[test]
    fn test_probe_wakes_then_reads_version() {
        let sensor = MockSensor::default()
            .reply(cmd::WAKE_UP, 0, &[])
            .reply(cmd::READ_VERSION, 0, &[2, 2, 0, 7, 0, 2, 0]);
        let mut sps = driver(sensor);

        let version = sps.probe().unwrap();
        assert_eq!(version.firmware_major, 2);
        assert_eq!(version.firmware_minor, 2);
        assert_eq!(
            version.shdlc,
            Some(ShdlcInfo {
                hardware_revision: 7,
                shdlc_major: 2,
                shdlc_minor: 0
            })
        );
        assert_eq!(sps.cached_version(), Some(version));

        let (sensor, _) = sps.release();
        assert_eq!(sensor.written[0], [0xFF]);
        assert_eq!(sensor.written[1], [0x7E, 0x00, 0x7D, 0x31, 0x00, 0xEE, 0x7E]);
        assert_eq!(sensor.written[2], request(cmd::READ_VERSION, &[]));
    }

    #[test]
    fn test_probe_survives_failed_wake_up() {
        let sensor = MockSensor {
            reject_raw_writes: true,
            ..Default::default()
        }
        .reply(cmd::READ_VERSION, 0, &[1, 0, 0, 4, 0, 2, 0]);
        let mut sps = driver(sensor);

        assert_eq!(sps.probe().unwrap().firmware_major, 1);
    }

    #[test]
    fn test_wake_up_transport_error() {
        let sensor = MockSensor {
            reject_raw_writes: true,
            ..Default::default()
        };
        let mut sps = driver(sensor);

        assert_eq!(
            sps.wake_up(),
            Err(Sps30Error::Link(ShdlcError::Transport(
                TransportError::ShortWrite {
                    requested: 1,
                    written: 0
                }
            )))
        );
    }

    #[test]
    fn test_start_measurement_payload() {
        let sensor = MockSensor::default()
            .reply(cmd::START_MEASUREMENT, 0, &[])
            .reply(cmd::START_MEASUREMENT, 0, &[]);
        let mut sps = driver(sensor);

        sps.start_measurement(OutputFormat::Float).unwrap();
        sps.start_measurement(OutputFormat::Integer).unwrap();

        let (sensor, _) = sps.release();
        assert_eq!(sensor.written[0], [0x7E, 0x00, 0x00, 0x02, 0x01, 0x03, 0xF9, 0x7E]);
        assert_eq!(sensor.written[1], request(cmd::START_MEASUREMENT, &[0x01, 0x05]));
    }

    #[test]
    fn test_read_measurement_float() {
        let mut payload = [0u8; 40];
        payload[..4].copy_from_slice(&12.5f32.to_be_bytes());
        let sensor = MockSensor::default().reply(cmd::READ_MEASURED_VALUES, 0, &payload);
        let mut sps = driver(sensor);

        match sps.read_measurement().unwrap() {
            Some(Measurement::Float(c)) => assert_eq!(c.mc_1p0, 12.5),
            other => panic!("unexpected reading {other:?}"),
        }
    }

    #[test]
    fn test_read_measurement_no_new_data() {
        let sensor = MockSensor::default().reply(cmd::READ_MEASURED_VALUES, 0, &[]);
        let mut sps = driver(sensor);
        assert_eq!(sps.read_measurement(), Ok(None));
    }

    #[test]
    fn test_read_measurement_odd_length() {
        let sensor = MockSensor::default().reply(cmd::READ_MEASURED_VALUES, 0, &[0u8; 12]);
        let mut sps = driver(sensor);
        assert_eq!(sps.read_measurement(), Err(Sps30Error::InvalidResponse));
    }

    #[test]
    fn test_sleep_refused() {
        // State 0x43: command not allowed in current state
        let sensor = MockSensor::default().reply(cmd::SLEEP, 0x43, &[]);
        let mut sps = driver(sensor);
        assert_eq!(sps.sleep(), Err(Sps30Error::UnsupportedCommand(0x43)));
    }

    #[test]
    fn test_serial_number() {
        let mut payload = [0u8; 17];
        payload[..16].copy_from_slice(b"3A1B2C3D4E5F6071");
        let sensor = MockSensor::default().reply(cmd::DEVICE_INFORMATION, 0, &payload);
        let mut sps = driver(sensor);

        assert_eq!(sps.serial_number().unwrap().as_str(), "3A1B2C3D4E5F6071");
        let (sensor, _) = sps.release();
        assert_eq!(sensor.written[0], request(cmd::DEVICE_INFORMATION, &[0x03]));
    }

    #[test]
    fn test_auto_cleaning_interval_round_trip() {
        let sensor = MockSensor::default()
            .reply(cmd::AUTO_CLEANING_INTERVAL, 0, &[0x00, 0x09, 0x3A, 0x80])
            .reply(cmd::AUTO_CLEANING_INTERVAL, 0, &[]);
        let mut sps = driver(sensor);

        assert_eq!(sps.fan_auto_cleaning_interval().unwrap(), 604_800);
        sps.set_fan_auto_cleaning_interval(345_600).unwrap();

        let (sensor, _) = sps.release();
        assert_eq!(sensor.written[0], request(cmd::AUTO_CLEANING_INTERVAL, &[0x00]));
        assert_eq!(
            sensor.written[1],
            request(cmd::AUTO_CLEANING_INTERVAL, &[0x00, 0x00, 0x05, 0x46, 0x00])
        );
    }

    #[test]
    fn test_device_status() {
        let sensor =
            MockSensor::default().reply(cmd::READ_DEVICE_STATUS, 0, &[0x00, 0x20, 0x00, 0x10, 0x00]);
        let mut sps = driver(sensor);

        let status = sps.device_status(true).unwrap();
        assert!(status.fan_speed_warning);
        assert!(status.fan_failure);

        let (sensor, _) = sps.release();
        assert_eq!(sensor.written[0], request(cmd::READ_DEVICE_STATUS, &[0x01]));
    }

    #[test]
    fn test_reset_does_not_wait_for_reply() {
        let mut sps = driver(MockSensor::default());
        sps.reset().unwrap();

        let (sensor, delay) = sps.release();
        assert_eq!(sensor.written, [request(cmd::RESET, &[])]);
        assert_eq!(delay.total_ns, 100_000_000);
    }

    #[test]
    fn test_no_reply_is_link_error() {
        let mut sps = driver(MockSensor::default());
        assert!(matches!(
            sps.stop_measurement(),
            Err(Sps30Error::Link(e)) if e.is_malformed()
        ));
    }
}
