//! Device types and their creation arguments.

use r2_packet::{
    ErrorCode, Fault, DEVICE_MAX_PORTS, DEVICE_TYPE_ANALOG_INPUT, DEVICE_TYPE_ANALOG_OUTPUT,
    DEVICE_TYPE_DHT11, DEVICE_TYPE_DIGITAL_INPUT, DEVICE_TYPE_DIGITAL_OUTPUT,
    DEVICE_TYPE_HCSR04_SONAR, DEVICE_TYPE_MULTIPLEXED_MOISTURE, DEVICE_TYPE_MULTIPLEXER,
    DEVICE_TYPE_SERVO, DEVICE_TYPE_SIMPLE_MOISTURE, DEVICE_TYPE_SONAR,
};
use thiserror::Error;

use crate::hal::SensorFault;

/// Kinds of device a node can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Digital input pin.
    DigitalInput,
    /// Digital output pin.
    DigitalOutput,
    /// Analog input pin.
    AnalogInput,
    /// Servo on a PWM pin.
    Servo,
    /// HC-SR04 sonar, distance from echo timing.
    Hcsr04Sonar,
    /// DHT11 temperature/humidity sensor.
    Dht11,
    /// Moisture sensor powered through an enable pin.
    SimpleMoisture,
    /// PWM output pin.
    AnalogOutput,
    /// Ping sonar with a maximum distance.
    Sonar,
    /// Multiplexer channel selector.
    Multiplexer,
    /// Moisture sensor pairs read through a multiplexer.
    MultiplexedMoisture,
}

impl DeviceType {
    /// Wire code of this type.
    pub fn code(&self) -> u8 {
        match self {
            DeviceType::DigitalInput => DEVICE_TYPE_DIGITAL_INPUT,
            DeviceType::DigitalOutput => DEVICE_TYPE_DIGITAL_OUTPUT,
            DeviceType::AnalogInput => DEVICE_TYPE_ANALOG_INPUT,
            DeviceType::Servo => DEVICE_TYPE_SERVO,
            DeviceType::Hcsr04Sonar => DEVICE_TYPE_HCSR04_SONAR,
            DeviceType::Dht11 => DEVICE_TYPE_DHT11,
            DeviceType::SimpleMoisture => DEVICE_TYPE_SIMPLE_MOISTURE,
            DeviceType::AnalogOutput => DEVICE_TYPE_ANALOG_OUTPUT,
            DeviceType::Sonar => DEVICE_TYPE_SONAR,
            DeviceType::Multiplexer => DEVICE_TYPE_MULTIPLEXER,
            DeviceType::MultiplexedMoisture => DEVICE_TYPE_MULTIPLEXED_MOISTURE,
        }
    }

    /// Whether `SetDevice` applies to this type.
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            DeviceType::DigitalOutput
                | DeviceType::AnalogOutput
                | DeviceType::Servo
                | DeviceType::Multiplexer
        )
    }

    /// Whether `GetDevice` applies to this type.
    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            DeviceType::DigitalInput
                | DeviceType::AnalogInput
                | DeviceType::Hcsr04Sonar
                | DeviceType::Dht11
                | DeviceType::SimpleMoisture
                | DeviceType::Sonar
                | DeviceType::MultiplexedMoisture
        )
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = DeviceError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            DEVICE_TYPE_DIGITAL_INPUT => DeviceType::DigitalInput,
            DEVICE_TYPE_DIGITAL_OUTPUT => DeviceType::DigitalOutput,
            DEVICE_TYPE_ANALOG_INPUT => DeviceType::AnalogInput,
            DEVICE_TYPE_SERVO => DeviceType::Servo,
            DEVICE_TYPE_HCSR04_SONAR => DeviceType::Hcsr04Sonar,
            DEVICE_TYPE_DHT11 => DeviceType::Dht11,
            DEVICE_TYPE_SIMPLE_MOISTURE => DeviceType::SimpleMoisture,
            DEVICE_TYPE_ANALOG_OUTPUT => DeviceType::AnalogOutput,
            DEVICE_TYPE_SONAR => DeviceType::Sonar,
            DEVICE_TYPE_MULTIPLEXER => DeviceType::Multiplexer,
            DEVICE_TYPE_MULTIPLEXED_MOISTURE => DeviceType::MultiplexedMoisture,
            other => return Err(DeviceError::DeviceTypeNotFound(other)),
        })
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Errors from the device registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// No live device at the id.
    #[error("no device with id {0}")]
    NoDeviceFound(u8),

    /// The port is held by another device or by the node itself.
    #[error("port {port} is in use")]
    PortInUse {
        /// Contested port.
        port: u8,
    },

    /// Unknown device type code.
    #[error("device type {0} not found")]
    DeviceTypeNotFound(u8),

    /// Device id outside the device table.
    #[error("device id {0} exceeds the device table")]
    MaxDevicesInUse(u8),

    /// The device does not accept writes.
    #[error("device {0} is not writable")]
    NotWritable(u8),

    /// The device does not support reads.
    #[error("device {0} is not readable")]
    NotReadable(u8),

    /// Arguments missing, malformed or out of range.
    #[error("invalid arguments for device {0}")]
    InvalidArguments(u8),

    /// A humidity sensor read failed.
    #[error("humidity sensor on device {id} failed: {fault:?}")]
    HumiditySensorRead {
        /// Device id.
        id: u8,
        /// Sensor failure.
        fault: SensorFault,
    },
}

impl From<&DeviceError> for Fault {
    fn from(err: &DeviceError) -> Self {
        match err {
            DeviceError::NoDeviceFound(id) => Fault::new(ErrorCode::NoDeviceFound, *id),
            DeviceError::PortInUse { port } => Fault::new(ErrorCode::PortInUse, *port),
            DeviceError::DeviceTypeNotFound(code) => {
                Fault::new(ErrorCode::DeviceTypeNotFound, *code)
            }
            DeviceError::MaxDevicesInUse(id) => Fault::new(ErrorCode::MaxDevicesInUse, *id),
            DeviceError::NotWritable(id) => Fault::new(ErrorCode::NotWritable, *id),
            DeviceError::NotReadable(id) => Fault::new(ErrorCode::NotReadable, *id),
            DeviceError::InvalidArguments(id) => Fault::new(ErrorCode::InvalidArguments, *id),
            DeviceError::HumiditySensorRead { fault, .. } => {
                Fault::new(ErrorCode::HumiditySensorRead, *fault as u8)
            }
        }
    }
}

/// Per-type runtime state created on `CreateDevice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// Nothing beyond the ports.
    Plain,
    /// Attached servo and its last angle.
    Servo {
        /// Last written angle.
        angle: Option<u16>,
    },
    /// Ping sonar range.
    Sonar {
        /// Maximum distance in cm.
        max_distance: u8,
    },
    /// Currently selected multiplexer channel.
    Multiplexer {
        /// Selected channel.
        channel: u8,
    },
    /// Sensor pairs routed through a multiplexer device.
    MultiplexedMoisture {
        /// Id of the multiplexer device.
        multiplexer: u8,
        /// Flattened channel pairs.
        channels: Vec<u8>,
    },
}

/// A live device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Slot index.
    pub id: u8,
    /// Device type.
    pub device_type: DeviceType,
    /// Claimed ports, in type-specific order.
    pub ports: Vec<u8>,
    /// Runtime state.
    pub state: DeviceState,
}

/// Rods per moisture sensor.
pub const SENSOR_ROD_COUNT: usize = 2;

/// Parsed `CreateDevice` arguments: the ports to claim and the initial state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceSpec {
    pub ports: Vec<u8>,
    pub state: DeviceState,
}

/// Parse the creation arguments of a device (everything after the type byte).
pub(crate) fn parse_spec(id: u8, device_type: DeviceType, args: &[u8]) -> Result<DeviceSpec, DeviceError> {
    let need = |n: usize| args.get(..n).ok_or(DeviceError::InvalidArguments(id));

    let spec = match device_type {
        DeviceType::DigitalInput
        | DeviceType::DigitalOutput
        | DeviceType::AnalogInput
        | DeviceType::AnalogOutput
        | DeviceType::Dht11 => DeviceSpec {
            ports: need(1)?.to_vec(),
            state: DeviceState::Plain,
        },
        DeviceType::Servo => DeviceSpec {
            ports: need(1)?.to_vec(),
            state: DeviceState::Servo { angle: None },
        },
        DeviceType::Hcsr04Sonar | DeviceType::SimpleMoisture => DeviceSpec {
            ports: need(2)?.to_vec(),
            state: DeviceState::Plain,
        },
        DeviceType::Sonar => {
            let raw = need(3)?;
            DeviceSpec {
                ports: raw[..2].to_vec(),
                state: DeviceState::Sonar { max_distance: raw[2] },
            }
        }
        DeviceType::Multiplexer => {
            let count = need(1)?[0] as usize;
            if count == 0 || count > DEVICE_MAX_PORTS {
                return Err(DeviceError::InvalidArguments(id));
            }
            DeviceSpec {
                ports: need(1 + count)?[1..].to_vec(),
                state: DeviceState::Multiplexer { channel: 0 },
            }
        }
        DeviceType::MultiplexedMoisture => {
            let raw = need(4)?;
            let channels = args[4..].to_vec();
            if channels.is_empty() || channels.len() % SENSOR_ROD_COUNT != 0 {
                return Err(DeviceError::InvalidArguments(id));
            }
            DeviceSpec {
                ports: raw[..3].to_vec(),
                state: DeviceState::MultiplexedMoisture {
                    multiplexer: raw[3],
                    channels,
                },
            }
        }
    };
    Ok(spec)
}
