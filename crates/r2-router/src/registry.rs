//! The device table and port reservations.
//!
//! Slots are indexed by device id. A parallel port table records which
//! device (or the node itself, for the radio pins) owns each port, so a
//! port can never be claimed twice.

use r2_packet::{MAX_DEVICES, MAX_PORTS, RESPONSE_VALUE_COUNT};
use tracing::{debug, trace};

use crate::device::{parse_spec, Device, DeviceError, DeviceState, DeviceType, SENSOR_ROD_COUNT};
use crate::hal::{Board, PinMode};

/// Values returned by a device read, unused slots zero.
pub type Values = [u16; RESPONSE_VALUE_COUNT];

/// HC-SR04 echo time per centimetre of distance (microseconds).
const HCSR04_US_PER_CM: u32 = 58;

/// Owner of a reserved port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOwner {
    /// Claimed by the node itself (e.g. radio pins).
    System,
    /// Claimed by a device.
    Device(u8),
}

/// Result of a device read.
///
/// A sensor failure still produces zeroed values; `fault` then carries the
/// failure so the caller can record it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// Values read.
    pub values: Values,
    /// Failure that produced the zeroed values.
    pub fault: Option<DeviceError>,
}

impl Reading {
    fn ok(values: Values) -> Self {
        Reading { values, fault: None }
    }
}

/// Fixed-capacity device table.
#[derive(Debug)]
pub struct DeviceRegistry {
    slots: [Option<Device>; MAX_DEVICES],
    ports: [Option<PortOwner>; MAX_PORTS],
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        DeviceRegistry {
            slots: std::array::from_fn(|_| None),
            ports: [None; MAX_PORTS],
        }
    }

    /// Reserve ports for the node itself. They survive [`DeviceRegistry::clear`].
    pub fn reserve_system_ports(&mut self, ports: &[u8]) -> Result<(), DeviceError> {
        for &port in ports {
            let slot = self
                .ports
                .get_mut(port as usize)
                .ok_or(DeviceError::InvalidArguments(port))?;
            *slot = Some(PortOwner::System);
        }
        Ok(())
    }

    /// Create a device at `id`, replacing whatever was there.
    ///
    /// Arguments are validated before the old device is removed. Port
    /// conflicts are detected after, so a device may be recreated on its own
    /// ports; a conflict then leaves the slot empty.
    pub fn create(
        &mut self,
        board: &mut dyn Board,
        id: u8,
        type_code: u8,
        args: &[u8],
    ) -> Result<(), DeviceError> {
        if id as usize >= MAX_DEVICES {
            return Err(DeviceError::MaxDevicesInUse(id));
        }
        let device_type = DeviceType::try_from(type_code)?;
        let spec = parse_spec(id, device_type, args)?;

        self.delete(board, id);

        for (i, &port) in spec.ports.iter().enumerate() {
            if port as usize >= MAX_PORTS {
                return Err(DeviceError::InvalidArguments(id));
            }
            if self.ports[port as usize].is_some() || spec.ports[..i].contains(&port) {
                return Err(DeviceError::PortInUse { port });
            }
        }
        if let DeviceState::MultiplexedMoisture { multiplexer, .. } = spec.state {
            match self.get(multiplexer) {
                Some(device) if device.device_type == DeviceType::Multiplexer => {}
                _ => return Err(DeviceError::NoDeviceFound(multiplexer)),
            }
        }

        for &port in &spec.ports {
            self.ports[port as usize] = Some(PortOwner::Device(id));
        }

        let device = Device {
            id,
            device_type,
            ports: spec.ports,
            state: spec.state,
        };
        setup(board, &device);
        debug!(id, device_type = %device_type, ports = ?device.ports, "device created");
        self.slots[id as usize] = Some(device);
        Ok(())
    }

    /// Remove the device at `id`, releasing its ports. Empty slots are ignored.
    pub fn delete(&mut self, board: &mut dyn Board, id: u8) {
        let Some(device) = self.slots.get_mut(id as usize).and_then(Option::take) else {
            return;
        };
        teardown(board, &device);
        for &port in &device.ports {
            if let Some(owner) = self.ports.get_mut(port as usize) {
                if *owner == Some(PortOwner::Device(id)) {
                    *owner = None;
                }
            }
        }
        debug!(id, "device deleted");
    }

    /// Remove every device.
    pub fn clear(&mut self, board: &mut dyn Board) {
        for id in 0..MAX_DEVICES as u8 {
            self.delete(board, id);
        }
    }

    /// The device at `id`.
    pub fn get(&self, id: u8) -> Option<&Device> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Owner of a port.
    pub fn port_owner(&self, port: u8) -> Option<PortOwner> {
        self.ports.get(port as usize).copied().flatten()
    }

    /// Live devices in id order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.slots.iter().flatten()
    }

    /// Number of live devices.
    pub fn len(&self) -> usize {
        self.devices().count()
    }

    /// Whether no device is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a device. `params` are type specific.
    pub fn read(
        &mut self,
        board: &mut dyn Board,
        id: u8,
        params: &[u8],
    ) -> Result<Reading, DeviceError> {
        let device = self.get(id).ok_or(DeviceError::NoDeviceFound(id))?.clone();
        if !device.device_type.is_readable() {
            return Err(DeviceError::NotReadable(id));
        }
        let ports = &device.ports;

        let reading = match (&device.device_type, &device.state) {
            (DeviceType::DigitalInput, _) => Reading::ok([board.digital_read(ports[0]) as u16, 0]),
            (DeviceType::AnalogInput, _) => Reading::ok([board.analog_read(ports[0]), 0]),
            (DeviceType::Hcsr04Sonar, _) => {
                let micros = board.echo_pulse_us(ports[0], ports[1]);
                Reading::ok([(micros / HCSR04_US_PER_CM).min(u16::MAX as u32) as u16, 0])
            }
            (DeviceType::Sonar, DeviceState::Sonar { max_distance }) => {
                let cm = board.ping_cm(ports[0], ports[1], *max_distance);
                Reading::ok([cm.min(255), 0])
            }
            (DeviceType::Dht11, _) => match board.read_dht11(ports[0]) {
                Ok(reading) => {
                    Reading::ok([reading.temperature as u16, reading.humidity as u16])
                }
                Err(fault) => Reading {
                    values: [0; RESPONSE_VALUE_COUNT],
                    fault: Some(DeviceError::HumiditySensorRead { id, fault }),
                },
            },
            (DeviceType::SimpleMoisture, _) => {
                let (analog, enable) = (ports[0], ports[1]);
                board.digital_write(enable, true);
                // The first sample after powering the sensor is unreliable.
                board.analog_read(analog);
                let value = board.analog_read(analog);
                board.digital_write(enable, false);
                Reading::ok([value, 0])
            }
            (
                DeviceType::MultiplexedMoisture,
                DeviceState::MultiplexedMoisture { multiplexer, channels },
            ) => {
                let pair = *params.first().ok_or(DeviceError::InvalidArguments(id))? as usize;
                let rods = channels
                    .get(pair * SENSOR_ROD_COUNT..(pair + 1) * SENSOR_ROD_COUNT)
                    .ok_or(DeviceError::InvalidArguments(id))?;
                let mut sum = 0u32;
                for (rod, &channel) in rods.iter().enumerate() {
                    self.write(board, *multiplexer, channel as u16)?;
                    for (k, &control) in ports[1..].iter().enumerate() {
                        board.digital_write(control, k == rod);
                    }
                    sum += board.analog_read(ports[0]) as u32;
                }
                for &control in &ports[1..] {
                    board.digital_write(control, false);
                }
                Reading::ok([(sum / SENSOR_ROD_COUNT as u32) as u16, 0])
            }
            _ => return Err(DeviceError::NotReadable(id)),
        };
        trace!(id, values = ?reading.values, "device read");
        Ok(reading)
    }

    /// Write a device.
    pub fn write(&mut self, board: &mut dyn Board, id: u8, value: u16) -> Result<(), DeviceError> {
        let device = self
            .slots
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(DeviceError::NoDeviceFound(id))?;

        match (&device.device_type, &mut device.state) {
            (DeviceType::DigitalOutput, _) => board.digital_write(device.ports[0], value > 0),
            (DeviceType::AnalogOutput, _) => board.analog_write(device.ports[0], value.min(255) as u8),
            (DeviceType::Servo, DeviceState::Servo { angle }) => {
                board.servo_write(device.ports[0], value);
                *angle = Some(value);
            }
            (DeviceType::Multiplexer, DeviceState::Multiplexer { channel }) => {
                if value >= 1 << device.ports.len() {
                    return Err(DeviceError::InvalidArguments(id));
                }
                let mut bits = value;
                for &port in &device.ports {
                    board.digital_write(port, bits & 1 == 1);
                    bits >>= 1;
                }
                *channel = value as u8;
            }
            _ => return Err(DeviceError::NotWritable(id)),
        }
        trace!(id, value, "device written");
        Ok(())
    }

    /// Wrapping sum over every live device's id, type and ports.
    pub fn checksum(&self) -> u8 {
        self.devices().fold(0u8, |acc, device| {
            device
                .ports
                .iter()
                .fold(acc.wrapping_add(device.id).wrapping_add(device.device_type.code()), |a, p| {
                    a.wrapping_add(*p)
                })
        })
    }
}

fn setup(board: &mut dyn Board, device: &Device) {
    let ports = &device.ports;
    match device.device_type {
        DeviceType::DigitalInput => board.pin_mode(ports[0], PinMode::Input),
        DeviceType::DigitalOutput | DeviceType::AnalogOutput => {
            board.pin_mode(ports[0], PinMode::Output)
        }
        DeviceType::Servo => board.servo_attach(ports[0]),
        DeviceType::Hcsr04Sonar | DeviceType::Sonar => {
            board.pin_mode(ports[0], PinMode::Output);
            board.pin_mode(ports[1], PinMode::Input);
        }
        DeviceType::SimpleMoisture => board.pin_mode(ports[1], PinMode::Output),
        DeviceType::Multiplexer => {
            for &port in ports {
                board.pin_mode(port, PinMode::Output);
            }
        }
        DeviceType::MultiplexedMoisture => {
            for &port in &ports[1..] {
                board.pin_mode(port, PinMode::Output);
            }
        }
        DeviceType::AnalogInput | DeviceType::Dht11 => {}
    }
}

fn teardown(board: &mut dyn Board, device: &Device) {
    match device.device_type {
        DeviceType::Servo => board.servo_detach(device.ports[0]),
        DeviceType::DigitalOutput => board.digital_write(device.ports[0], false),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{Dht11Reading, SensorFault, SimBoard};

    fn fixture() -> (DeviceRegistry, SimBoard) {
        (DeviceRegistry::new(), SimBoard::new())
    }

    #[test]
    fn test_port_exclusivity() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();

        registry.create(&mut board, 1, 2, &[5]).unwrap();
        let err = registry.create(&mut board, 2, 1, &[5]).unwrap_err();
        assert_eq!(err, DeviceError::PortInUse { port: 5 });
        assert!(registry.get(1).is_some());
        assert!(registry.get(2).is_none());

        registry.delete(&mut board, 1);
        registry.create(&mut board, 2, 1, &[5]).unwrap();
        assert_eq!(registry.port_owner(5), Some(PortOwner::Device(2)));
    }

    #[test]
    fn test_recreate_on_same_ports() {
        let (mut registry, mut board) = fixture();
        registry.create(&mut board, 1, 2, &[5]).unwrap();
        registry.create(&mut board, 1, 4, &[5]).unwrap();
        assert_eq!(registry.get(1).map(|d| d.device_type), Some(DeviceType::Servo));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_system_ports_are_reserved() {
        let (mut registry, mut board) = fixture();
        registry.reserve_system_ports(&[7, 8]).unwrap();
        assert_eq!(
            registry.create(&mut board, 0, 2, &[8]),
            Err(DeviceError::PortInUse { port: 8 })
        );
        registry.clear(&mut board);
        assert_eq!(registry.port_owner(7), Some(PortOwner::System));
    }

    #[test]
    fn test_create_failures() {
        let (mut registry, mut board) = fixture();
        assert_eq!(
            registry.create(&mut board, MAX_DEVICES as u8, 2, &[5]),
            Err(DeviceError::MaxDevicesInUse(MAX_DEVICES as u8))
        );
        assert_eq!(
            registry.create(&mut board, 0, 99, &[5]),
            Err(DeviceError::DeviceTypeNotFound(99))
        );
        assert_eq!(
            registry.create(&mut board, 0, 5, &[3, 3]),
            Err(DeviceError::PortInUse { port: 3 })
        );
        assert_eq!(
            registry.create(&mut board, 0, 2, &[MAX_PORTS as u8]),
            Err(DeviceError::InvalidArguments(0))
        );
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let (mut registry, mut board) = fixture();
        registry.delete(&mut board, 3);
        registry.delete(&mut board, 200);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_teardown_drives_output_low_and_detaches_servo() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();

        registry.create(&mut board, 0, 2, &[5]).unwrap();
        registry.write(&mut board, 0, 1).unwrap();
        registry.create(&mut board, 1, 4, &[9]).unwrap();
        registry.write(&mut board, 1, 90).unwrap();
        assert_eq!(sim.servo(9), Some(Some(90)));

        registry.clear(&mut board);
        assert_eq!(sim.digital_output(5), Some(false));
        assert_eq!(sim.servo(9), None);
    }

    #[test]
    fn test_write_rules() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();

        registry.create(&mut board, 0, 1, &[4]).unwrap();
        assert_eq!(registry.write(&mut board, 0, 1), Err(DeviceError::NotWritable(0)));
        assert_eq!(registry.write(&mut board, 5, 1), Err(DeviceError::NoDeviceFound(5)));

        registry.create(&mut board, 1, 8, &[6]).unwrap();
        registry.write(&mut board, 1, 1000).unwrap();
        assert_eq!(sim.analog_output(6), Some(255));
    }

    #[test]
    fn test_read_inputs() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();
        sim.set_digital_input(4, true);
        sim.set_analog_input(14, 512);
        sim.set_echo_us(3, 58 * 20);

        registry.create(&mut board, 0, 1, &[4]).unwrap();
        registry.create(&mut board, 1, 3, &[14]).unwrap();
        registry.create(&mut board, 2, 5, &[2, 3]).unwrap();
        registry.create(&mut board, 3, 2, &[5]).unwrap();

        assert_eq!(registry.read(&mut board, 0, &[]).unwrap().values, [1, 0]);
        assert_eq!(registry.read(&mut board, 1, &[]).unwrap().values, [512, 0]);
        assert_eq!(registry.read(&mut board, 2, &[]).unwrap().values, [20, 0]);
        assert_eq!(registry.read(&mut board, 3, &[]), Err(DeviceError::NotReadable(3)));
        assert_eq!(registry.read(&mut board, 9, &[]), Err(DeviceError::NoDeviceFound(9)));
    }

    #[test]
    fn test_sonar_clamps_distance() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();
        sim.set_ping_cm(3, 300);
        registry.create(&mut board, 0, 9, &[2, 3, 255]).unwrap();
        assert_eq!(registry.read(&mut board, 0, &[]).unwrap().values, [0, 0]);
        sim.set_ping_cm(3, 200);
        assert_eq!(registry.read(&mut board, 0, &[]).unwrap().values, [200, 0]);
    }

    #[test]
    fn test_dht11_failure_returns_zeroed_values() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();
        registry.create(&mut board, 0, 6, &[4]).unwrap();

        sim.set_dht11(4, Ok(Dht11Reading { temperature: 21, humidity: 40 }));
        assert_eq!(registry.read(&mut board, 0, &[]).unwrap(), Reading::ok([21, 40]));

        sim.set_dht11(4, Err(SensorFault::Checksum));
        let reading = registry.read(&mut board, 0, &[]).unwrap();
        assert_eq!(reading.values, [0, 0]);
        assert_eq!(
            reading.fault,
            Some(DeviceError::HumiditySensorRead { id: 0, fault: SensorFault::Checksum })
        );
    }

    #[test]
    fn test_simple_moisture_discards_first_sample() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();
        sim.set_analog_input(15, 300);
        registry.create(&mut board, 0, 7, &[15, 8]).unwrap();

        assert_eq!(registry.read(&mut board, 0, &[]).unwrap().values, [300, 0]);
        assert_eq!(sim.analog_reads(15), 2);
        assert_eq!(sim.digital_log(), vec![(8, true), (8, false)]);
    }

    #[test]
    fn test_multiplexer_selects_lsb_first() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();
        registry.create(&mut board, 0, 10, &[2, 10, 11]).unwrap();

        registry.write(&mut board, 0, 2).unwrap();
        assert_eq!(sim.digital_output(10), Some(false));
        assert_eq!(sim.digital_output(11), Some(true));
        assert_eq!(registry.write(&mut board, 0, 4), Err(DeviceError::InvalidArguments(0)));
    }

    #[test]
    fn test_multiplexed_moisture_averages_rods() {
        let (mut registry, sim) = fixture();
        let mut board = sim.clone();
        sim.set_analog_input(14, 400);

        assert_eq!(
            registry.create(&mut board, 1, 11, &[14, 6, 7, 0, 0, 1]),
            Err(DeviceError::NoDeviceFound(0))
        );
        registry.create(&mut board, 0, 10, &[2, 10, 11]).unwrap();
        registry.create(&mut board, 1, 11, &[14, 6, 7, 0, 0, 1, 2, 3]).unwrap();

        assert_eq!(registry.read(&mut board, 1, &[1]).unwrap().values, [400, 0]);
        assert_eq!(
            registry.get(0).map(|d| d.state.clone()),
            Some(DeviceState::Multiplexer { channel: 3 })
        );
        assert_eq!(sim.digital_output(6), Some(false));
        assert_eq!(sim.digital_output(7), Some(false));
        assert_eq!(registry.read(&mut board, 1, &[2]), Err(DeviceError::InvalidArguments(1)));
        assert_eq!(registry.read(&mut board, 1, &[]), Err(DeviceError::InvalidArguments(1)));
    }

    #[test]
    fn test_checksum_covers_devices() {
        let (mut registry, mut board) = fixture();
        assert_eq!(registry.checksum(), 0);
        registry.create(&mut board, 1, 2, &[5]).unwrap();
        assert_eq!(registry.checksum(), 1 + 2 + 5);
    }
}
