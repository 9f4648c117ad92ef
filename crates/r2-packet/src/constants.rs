//! Protocol constants
//!
//! These constants define the action codes, error codes, device type codes,
//! sizes and framing bytes shared by every node speaking the device router
//! protocol. Masters and slaves built from different firmware revisions talk
//! to each other, so none of these values may change.

// ============================================================================
// Sizes
// ============================================================================

/// Maximum number of devices a single node can host.
pub const MAX_DEVICES: usize = 10;

/// Maximum number of ports a single device can occupy.
pub const DEVICE_MAX_PORTS: usize = 4;

/// Number of physical ports a node can hand out (valid ids are `0..MAX_PORTS`).
pub const MAX_PORTS: usize = 64;

/// Maximum size (in bytes) of request arguments and response content.
pub const MAX_CONTENT_SIZE: usize = MAX_DEVICES * 2 + 1;

/// checksum(1) + host(1) + action(1) + id(1) + argSize(1)
pub const REQUEST_HEADER_SIZE: usize = 5;

/// checksum(1) + messageId(1) + host(1) + action(1) + id(1) + contentSize(1)
pub const RESPONSE_HEADER_SIZE: usize = 6;

/// Smallest valid request (no arguments).
pub const MIN_REQUEST_SIZE: usize = REQUEST_HEADER_SIZE;

/// Largest valid request (arguments filled to capacity).
pub const MAX_REQUEST_SIZE: usize = REQUEST_HEADER_SIZE + MAX_CONTENT_SIZE;

/// Smallest valid response (no content).
pub const MIN_RESPONSE_SIZE: usize = RESPONSE_HEADER_SIZE;

/// Largest valid response (content filled to capacity).
pub const MAX_RESPONSE_SIZE: usize = RESPONSE_HEADER_SIZE + MAX_CONTENT_SIZE;

/// Number of 16-bit values returned by a device read.
pub const RESPONSE_VALUE_COUNT: usize = 2;

/// Size of the content of a GetDevice response.
pub const RESPONSE_VALUE_CONTENT_SIZE: usize = RESPONSE_VALUE_COUNT * 2;

// ============================================================================
// Addresses
// ============================================================================

/// Node address reserved for the local node / the mesh master.
pub const DEVICE_HOST_LOCAL: u8 = 0x00;

// ============================================================================
// Request Actions
// ============================================================================

/// Creates a device.
pub const ACTION_CREATE_DEVICE: u8 = 0x01;
/// Sets the value of a device.
pub const ACTION_SET_DEVICE: u8 = 0x02;
/// Returns the value of a device.
pub const ACTION_GET_DEVICE: u8 = 0x03;
/// Initializes the router (clears devices and diagnostics).
pub const ACTION_INITIALIZE: u8 = 0x04;
/// Reply to a successful initialization.
pub const ACTION_INITIALIZATION_OK: u8 = 0x05;
/// Persists a new node address.
pub const ACTION_SET_NODE_ID: u8 = 0x06;
/// Checks whether a node is reachable.
pub const ACTION_CHECK_NODE: u8 = 0x07;
/// Lists the nodes in the mesh routing table.
pub const ACTION_GET_NODES: u8 = 0x08;
/// Keep-alive ping (internal).
pub const ACTION_PING: u8 = 0x09;
/// Enables or disables sleep mode.
pub const ACTION_SLEEP: u8 = 0x0A;
/// Reads the sleep state.
pub const ACTION_CHECK_SLEEP_STATE: u8 = 0x0B;
/// Defers sleeping for a number of seconds.
pub const ACTION_PAUSE_SLEEP: u8 = 0x0C;
/// Resets the router to an uninitialized state.
pub const ACTION_RESET: u8 = 0x0D;
/// Returns a checksum of configuration and devices.
pub const ACTION_CHECK_INTEGRITY: u8 = 0x0E;
/// Deletes a device.
pub const ACTION_DELETE_DEVICE: u8 = 0x0F;

// ============================================================================
// Response / Internal Actions
// ============================================================================

/// The response carries an error code and error info.
pub const ACTION_ERROR: u8 = 0xF0;
/// Internal marker: nothing was read from the mesh.
pub const ACTION_NO_MESSAGE_READ: u8 = 0xF1;
/// Internal: master pings a slave to find out if it's alive.
pub const ACTION_PING_SLAVE: u8 = 0xF2;

// ============================================================================
// Error Codes
// ============================================================================

/// No device with the specified id was found.
pub const ERROR_CODE_NO_DEVICE_FOUND: u8 = 1;
/// The port is already claimed by another device.
pub const ERROR_CODE_PORT_IN_USE: u8 = 2;
/// The device type is not known.
pub const ERROR_CODE_DEVICE_TYPE_NOT_FOUND: u8 = 3;
/// The device id is outside the device table.
pub const ERROR_CODE_MAX_DEVICES_IN_USE: u8 = 4;
/// The device does not support writes.
pub const ERROR_CODE_NOT_WRITABLE: u8 = 5;
/// The device does not support reads.
pub const ERROR_CODE_NOT_READABLE: u8 = 6;
/// Unknown action received.
pub const ERROR_CODE_UNKNOWN_ACTION: u8 = 7;
/// Humidity sensor (DHT11) read failure.
pub const ERROR_CODE_HUMIDITY_SENSOR_READ: u8 = 8;
/// The remote node is not available.
pub const ERROR_CODE_NODE_NOT_AVAILABLE: u8 = 9;
/// A mesh read returned fewer bytes than a packet header.
pub const ERROR_CODE_BAD_SIZE_READ: u8 = 10;
/// A mesh exchange timed out.
pub const ERROR_CODE_TIMEOUT: u8 = 11;
/// A mesh write failed.
pub const ERROR_CODE_WRITE_ERROR: u8 = 12;
/// A mesh message had an unexpected type.
pub const ERROR_CODE_UNKNOWN_MESSAGE_TYPE: u8 = 13;
/// The master's read returned no data.
pub const ERROR_CODE_NO_NETWORK_DATA: u8 = 14;
/// Routing through a node that is not the master is not supported.
pub const ERROR_CODE_ROUTING_THROUGH_NON_MASTER: u8 = 15;
/// The master received the same message twice in succession.
pub const ERROR_CODE_DUPLICATE_MESSAGE: u8 = 16;
/// Serial frame was not completed in time.
pub const ERROR_CODE_SERIAL_TIMEOUT: u8 = 17;
/// The radio refused to sleep.
pub const ERROR_CODE_FAILED_TO_SLEEP: u8 = 18;
/// Unread messages were found in the master's input queue.
pub const ERROR_CODE_MESSAGE_SYNCHRONIZATION: u8 = 19;
/// Declared request size is outside the allowed range.
pub const ERROR_CODE_INVALID_REQUEST_SIZE: u8 = 20;
/// Request checksum did not match its content.
pub const ERROR_CODE_BAD_CHECKSUM: u8 = 21;
/// Request arguments are missing or out of range.
pub const ERROR_CODE_INVALID_ARGUMENTS: u8 = 24;
/// Non-volatile storage could not be read or written.
pub const ERROR_CODE_STORAGE: u8 = 25;

// ============================================================================
// Device Types
// ============================================================================

/// Slot is empty.
pub const DEVICE_TYPE_UNDEFINED: u8 = 0;
/// Digital input pin.
pub const DEVICE_TYPE_DIGITAL_INPUT: u8 = 1;
/// Digital output pin.
pub const DEVICE_TYPE_DIGITAL_OUTPUT: u8 = 2;
/// Analog input pin.
pub const DEVICE_TYPE_ANALOG_INPUT: u8 = 3;
/// Servo on a PWM pin.
pub const DEVICE_TYPE_SERVO: u8 = 4;
/// HC-SR04 ultrasonic sensor driven by echo timing.
pub const DEVICE_TYPE_HCSR04_SONAR: u8 = 5;
/// DHT11 temperature/humidity sensor.
pub const DEVICE_TYPE_DHT11: u8 = 6;
/// Moisture sensor with an enable pin.
pub const DEVICE_TYPE_SIMPLE_MOISTURE: u8 = 7;
/// Analog (PWM) output pin.
pub const DEVICE_TYPE_ANALOG_OUTPUT: u8 = 8;
/// Sonar using a ping driver with a maximum distance.
pub const DEVICE_TYPE_SONAR: u8 = 9;
/// Multiplexer channel selector.
pub const DEVICE_TYPE_MULTIPLEXER: u8 = 10;
/// Moisture sensor pairs read through a multiplexer.
pub const DEVICE_TYPE_MULTIPLEXED_MOISTURE: u8 = 11;

// ============================================================================
// Transport Framing
// ============================================================================

/// Fixed header preceding every serial frame (both directions).
pub const SERIAL_HEADER: [u8; 3] = [0xF0, 0x0F, 0xF1];

/// First byte answered to an I2C master poll when a reply is queued.
pub const I2C_READY_TO_SEND: u8 = 0xFF;

/// Byte answered to an I2C master poll when no reply is queued.
pub const I2C_NOTHING_QUEUED: u8 = 0x00;

/// Mesh message type carrying a request or a response.
pub const MESH_MESSAGE: u8 = b'M';

/// Mesh message type carrying a keep-alive ping (one node address byte).
pub const MESH_MESSAGE_PING: u8 = b'P';

/// Mesh message type of an empty header from the network layer. Skipped.
pub const MESH_MESSAGE_NONE: u8 = 0;

// ============================================================================
// Persisted State
// ============================================================================

/// Non-volatile address of the node's own address byte.
pub const NODE_ID_STORAGE_ADDRESS: u16 = 0;

/// Non-volatile address of the sleep cycle byte (0 = not sleeping).
pub const SLEEP_MODE_STORAGE_ADDRESS: u16 = 1;

/// Sleep cycle value meaning "sleep until a message arrives".
pub const SLEEP_UNTIL_MESSAGE_RECEIVED: u8 = 0xFF;
