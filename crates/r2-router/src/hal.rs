//! Board abstraction.
//!
//! The registry never touches hardware directly. Pin I/O and the sensor
//! drivers it relies on (servo PWM, echo timing, DHT11 bit-banging) sit
//! behind [`Board`], so the same router runs on real hardware or against
//! [`SimBoard`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Direction of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Input.
    Input,
    /// Output.
    Output,
}

/// A successful DHT11 read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dht11Reading {
    /// Temperature in degrees Celsius.
    pub temperature: u8,
    /// Relative humidity in percent.
    pub humidity: u8,
}

/// Why a sensor read failed. The discriminant is reported as error info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// The sensor didn't answer in time.
    Timeout = 1,
    /// The sensor answered with a bad checksum.
    Checksum = 2,
    /// Any other failure.
    Other = 3,
}

/// Hardware access used by the device registry.
pub trait Board: Send {
    /// Configure a pin direction.
    fn pin_mode(&mut self, port: u8, mode: PinMode);
    /// Drive a digital output.
    fn digital_write(&mut self, port: u8, high: bool);
    /// Sample a digital input.
    fn digital_read(&mut self, port: u8) -> bool;
    /// Sample an analog input.
    fn analog_read(&mut self, port: u8) -> u16;
    /// Write a PWM duty cycle.
    fn analog_write(&mut self, port: u8, value: u8);
    /// Attach a servo driver to a pin.
    fn servo_attach(&mut self, port: u8);
    /// Move an attached servo.
    fn servo_write(&mut self, port: u8, angle: u16);
    /// Detach a servo driver.
    fn servo_detach(&mut self, port: u8);
    /// Fire a trigger pulse and measure the echo high time in microseconds.
    fn echo_pulse_us(&mut self, trigger: u8, echo: u8) -> u32;
    /// Ping-style distance in centimetres, 0 when nothing is within `max_cm`.
    fn ping_cm(&mut self, trigger: u8, echo: u8, max_cm: u8) -> u16;
    /// Read a DHT11 sensor.
    fn read_dht11(&mut self, port: u8) -> Result<Dht11Reading, SensorFault>;
    /// Status indicator (LED).
    fn set_status(&mut self, on: bool);
}

#[derive(Debug, Default)]
struct SimState {
    modes: HashMap<u8, PinMode>,
    digital_out: HashMap<u8, bool>,
    digital_in: HashMap<u8, bool>,
    analog_in: HashMap<u8, u16>,
    analog_out: HashMap<u8, u8>,
    analog_reads: HashMap<u8, usize>,
    servos: HashMap<u8, Option<u16>>,
    echo_us: HashMap<u8, u32>,
    ping_cm: HashMap<u8, u16>,
    dht11: HashMap<u8, Result<Dht11Reading, SensorFault>>,
    digital_log: Vec<(u8, bool)>,
    status: bool,
}

/// In-memory board.
///
/// Clones share state, so a test can keep a handle after moving the board
/// into a router and inspect what the router drove.
#[derive(Debug, Clone, Default)]
pub struct SimBoard {
    state: Arc<Mutex<SimState>>,
}

impl SimBoard {
    /// Create a board with every pin low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level a digital input will read.
    pub fn set_digital_input(&self, port: u8, high: bool) {
        self.state.lock().digital_in.insert(port, high);
    }

    /// Set the value an analog input will read.
    pub fn set_analog_input(&self, port: u8, value: u16) {
        self.state.lock().analog_in.insert(port, value);
    }

    /// Set the echo time measured on an echo pin.
    pub fn set_echo_us(&self, echo: u8, micros: u32) {
        self.state.lock().echo_us.insert(echo, micros);
    }

    /// Set the distance a ping sonar on this echo pin reports.
    pub fn set_ping_cm(&self, echo: u8, cm: u16) {
        self.state.lock().ping_cm.insert(echo, cm);
    }

    /// Set the outcome of the next DHT11 reads on a pin.
    pub fn set_dht11(&self, port: u8, reading: Result<Dht11Reading, SensorFault>) {
        self.state.lock().dht11.insert(port, reading);
    }

    /// Level last driven on a digital output.
    pub fn digital_output(&self, port: u8) -> Option<bool> {
        self.state.lock().digital_out.get(&port).copied()
    }

    /// Every digital write in order.
    pub fn digital_log(&self) -> Vec<(u8, bool)> {
        self.state.lock().digital_log.clone()
    }

    /// Duty cycle last written to a PWM output.
    pub fn analog_output(&self, port: u8) -> Option<u8> {
        self.state.lock().analog_out.get(&port).copied()
    }

    /// Number of analog samples taken on a pin.
    pub fn analog_reads(&self, port: u8) -> usize {
        self.state.lock().analog_reads.get(&port).copied().unwrap_or(0)
    }

    /// Configured direction of a pin.
    pub fn pin_mode_of(&self, port: u8) -> Option<PinMode> {
        self.state.lock().modes.get(&port).copied()
    }

    /// Whether a servo is attached, and its last angle.
    pub fn servo(&self, port: u8) -> Option<Option<u16>> {
        self.state.lock().servos.get(&port).copied()
    }

    /// Current status indicator.
    pub fn status(&self) -> bool {
        self.state.lock().status
    }
}

impl Board for SimBoard {
    fn pin_mode(&mut self, port: u8, mode: PinMode) {
        self.state.lock().modes.insert(port, mode);
    }

    fn digital_write(&mut self, port: u8, high: bool) {
        let mut state = self.state.lock();
        state.digital_out.insert(port, high);
        state.digital_log.push((port, high));
    }

    fn digital_read(&mut self, port: u8) -> bool {
        self.state.lock().digital_in.get(&port).copied().unwrap_or(false)
    }

    fn analog_read(&mut self, port: u8) -> u16 {
        let mut state = self.state.lock();
        *state.analog_reads.entry(port).or_insert(0) += 1;
        state.analog_in.get(&port).copied().unwrap_or(0)
    }

    fn analog_write(&mut self, port: u8, value: u8) {
        self.state.lock().analog_out.insert(port, value);
    }

    fn servo_attach(&mut self, port: u8) {
        self.state.lock().servos.insert(port, None);
    }

    fn servo_write(&mut self, port: u8, angle: u16) {
        if let Some(slot) = self.state.lock().servos.get_mut(&port) {
            *slot = Some(angle);
        }
    }

    fn servo_detach(&mut self, port: u8) {
        self.state.lock().servos.remove(&port);
    }

    fn echo_pulse_us(&mut self, trigger: u8, echo: u8) -> u32 {
        let mut state = self.state.lock();
        state.digital_log.push((trigger, true));
        state.digital_log.push((trigger, false));
        state.echo_us.get(&echo).copied().unwrap_or(0)
    }

    fn ping_cm(&mut self, _trigger: u8, echo: u8, max_cm: u8) -> u16 {
        let cm = self.state.lock().ping_cm.get(&echo).copied().unwrap_or(0);
        if cm > max_cm as u16 {
            0
        } else {
            cm
        }
    }

    fn read_dht11(&mut self, port: u8) -> Result<Dht11Reading, SensorFault> {
        self.state
            .lock()
            .dht11
            .get(&port)
            .copied()
            .unwrap_or(Err(SensorFault::Timeout))
    }

    fn set_status(&mut self, on: bool) {
        self.state.lock().status = on;
    }
}
