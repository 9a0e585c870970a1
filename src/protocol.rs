use crate::crc;
use crate::error::{Error, Result};
use std::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 16-bit value stored in a Modbus register.
pub type Word = u16;

// Modbus RTU requires a silent interval of 3.5 characters between frames,
// at 9600 baud this rounds up to 4ms.
pub const MINIMUM_DELAY: Duration = Duration::from_millis(4);

/// Largest register count a single read may request.
pub const MAX_READ_QUANTITY: u16 = 125;
/// Largest register count a single write multiple may carry.
pub const MAX_WRITE_QUANTITY: u16 = 123;

// address, function code, byte count + CRC
const READ_REPLY_OVERHEAD: usize = 3 + crc::CRC_LENGTH;
// address, function code, register, value or quantity + CRC
const WRITE_REPLY_LENGTH: usize = 6 + crc::CRC_LENGTH;

macro_rules! read_bit {
    ($byte:expr,$position:expr) => {
        ($byte >> $position) & 1 != 0
    };
}

/// Modbus RTU device address on the RS485 bus.
/// The address must be in the range from 0 to 247, where 0 is broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8"))]
pub struct Address(u8);

impl Address {
    /// Minimum valid Modbus device address.
    pub const MIN: u8 = 0;
    /// Maximum valid Modbus device address.
    pub const MAX: u8 = 247;
    /// Writes sent to this address reach every device and are never answered.
    pub const BROADCAST: Address = Address(0);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl Default for Address {
    /// Factory default address of the servo controller.
    fn default() -> Self {
        Self(0x01)
    }
}

impl std::ops::Deref for Address {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::invalid_parameter(format!(
                "device address {value} is outside the valid range of {} to {}",
                Self::MIN,
                Self::MAX
            )))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// The operations this codec speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleRegister = 0x06,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters
        )
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            0x06 => Ok(FunctionCode::WriteSingleRegister),
            0x10 => Ok(FunctionCode::WriteMultipleRegisters),
            _ => Err(Error::invalid_parameter(format!(
                "unsupported function code {value:#04x}"
            ))),
        }
    }
}

/// One request/response exchange: how to frame it, how long the answer is
/// and how to turn the answer into a value.
pub trait Operation {
    type Output;

    fn request(&self, address: Address) -> Result<Vec<u8>>;

    fn reply_size(&self) -> usize;

    fn decode(&self, address: Address, rx_buffer: &[u8]) -> Result<Self::Output>;
}

fn create_request_header(address: Address, function: FunctionCode, register: u16) -> Vec<u8> {
    let mut tx_buffer = Vec::with_capacity(WRITE_REPLY_LENGTH);
    tx_buffer.push(*address);
    tx_buffer.push(function as u8);
    tx_buffer.extend_from_slice(&register.to_be_bytes());
    tx_buffer
}

fn validate_len(buffer: &[u8], reply_size: usize) -> Result<()> {
    if buffer.len() != reply_size {
        log::warn!(
            "Invalid buffer size - required={} received={}",
            reply_size,
            buffer.len()
        );
        return Err(Error::IncompleteResponse {
            expected: reply_size,
            actual: buffer.len(),
        });
    }
    Ok(())
}

fn validate_checksum(buffer: &[u8]) -> Result<&[u8]> {
    let (payload, received) = crc::split(buffer).ok_or(Error::IncompleteResponse {
        expected: crc::CRC_LENGTH,
        actual: buffer.len(),
    })?;
    let calculated = crc::checksum(payload);
    if calculated != received {
        log::warn!(
            "Invalid checksum - calculated={:04X?} received={:04X?} buffer={:02X?}",
            calculated,
            received,
            buffer
        );
        return Err(Error::CrcMismatch {
            calculated,
            received,
        });
    }
    Ok(payload)
}

fn validate_field(field: &'static str, expected: u16, received: u16) -> Result<()> {
    if expected != received {
        log::warn!(
            "Unexpected {} - expected={:#X} received={:#X}",
            field,
            expected,
            received
        );
        return Err(Error::UnexpectedResponse {
            field,
            expected,
            received,
        });
    }
    Ok(())
}

/// Runs length, CRC and header checks in that order and returns the
/// payload without its checksum.
fn validate_frame(
    buffer: &[u8],
    reply_size: usize,
    address: Address,
    function: FunctionCode,
) -> Result<&[u8]> {
    validate_len(buffer, reply_size)?;
    let payload = validate_checksum(buffer)?;
    validate_field("device address", *address as u16, payload[0] as u16)?;
    validate_field("function code", function as u16, payload[1] as u16)?;
    Ok(payload)
}

fn word_at(payload: &[u8], offset: usize) -> Word {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

/// Read a block of input (0x04) or holding (0x03) registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRegisters {
    function: FunctionCode,
    register: u16,
    quantity: u16,
}

impl ReadRegisters {
    pub fn input(register: u16, quantity: u16) -> Self {
        Self {
            function: FunctionCode::ReadInputRegisters,
            register,
            quantity,
        }
    }

    pub fn holding(register: u16, quantity: u16) -> Self {
        Self {
            function: FunctionCode::ReadHoldingRegisters,
            register,
            quantity,
        }
    }

    pub fn function(&self) -> FunctionCode {
        self.function
    }

    fn validate_quantity(&self) -> Result<()> {
        if !(1..=MAX_READ_QUANTITY).contains(&self.quantity) {
            return Err(Error::invalid_parameter(format!(
                "register count {} is outside the valid range of 1 to {MAX_READ_QUANTITY}",
                self.quantity
            )));
        }
        Ok(())
    }
}

impl Operation for ReadRegisters {
    type Output = Vec<Word>;

    fn request(&self, address: Address) -> Result<Vec<u8>> {
        self.validate_quantity()?;
        let mut tx_buffer = create_request_header(address, self.function, self.register);
        tx_buffer.extend_from_slice(&self.quantity.to_be_bytes());
        crc::append(&mut tx_buffer);
        Ok(tx_buffer)
    }

    fn reply_size(&self) -> usize {
        READ_REPLY_OVERHEAD + 2 * self.quantity as usize
    }

    fn decode(&self, address: Address, rx_buffer: &[u8]) -> Result<Vec<Word>> {
        self.validate_quantity()?;
        let payload = validate_frame(rx_buffer, self.reply_size(), address, self.function)?;
        // Standard Modbus byte count of two bytes per register, which the
        // controller sends; a count of 1 for a single register is rejected.
        validate_field("byte count", 2 * self.quantity, payload[2] as u16)?;
        Ok(payload[3..]
            .chunks_exact(2)
            .map(|word| u16::from_be_bytes([word[0], word[1]]))
            .collect())
    }
}

/// Write one holding register. The device answers with an echo of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSingleRegister {
    pub register: u16,
    pub value: Word,
}

impl Operation for WriteSingleRegister {
    type Output = ();

    fn request(&self, address: Address) -> Result<Vec<u8>> {
        let mut tx_buffer =
            create_request_header(address, FunctionCode::WriteSingleRegister, self.register);
        tx_buffer.extend_from_slice(&self.value.to_be_bytes());
        crc::append(&mut tx_buffer);
        Ok(tx_buffer)
    }

    fn reply_size(&self) -> usize {
        WRITE_REPLY_LENGTH
    }

    fn decode(&self, address: Address, rx_buffer: &[u8]) -> Result<()> {
        let payload = validate_frame(
            rx_buffer,
            self.reply_size(),
            address,
            FunctionCode::WriteSingleRegister,
        )?;
        validate_field("register address", self.register, word_at(payload, 2))?;
        validate_field("register value", self.value, word_at(payload, 4))
    }
}

/// Write consecutive holding registers from raw field bytes.
///
/// The bytes are sent as given after the byte count, so payloads made of
/// byte sized fields keep their documented order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleRegisters {
    register: u16,
    fields: Vec<u8>,
}

impl WriteMultipleRegisters {
    pub fn from_fields(register: u16, fields: Vec<u8>) -> Self {
        Self { register, fields }
    }

    /// Lays out each word big-endian.
    pub fn from_words(register: u16, words: &[Word]) -> Self {
        Self {
            register,
            fields: words.iter().flat_map(|word| word.to_be_bytes()).collect(),
        }
    }

    /// Number of whole registers the fields cover, saturating at `u16::MAX`.
    pub fn quantity(&self) -> u16 {
        u16::try_from(self.fields.len() / 2).unwrap_or(u16::MAX)
    }

    fn validate_fields(&self) -> Result<()> {
        if self.fields.is_empty() || self.fields.len() % 2 != 0 {
            return Err(Error::invalid_parameter(format!(
                "{} field bytes do not fill whole registers",
                self.fields.len()
            )));
        }
        if self.fields.len() > 2 * MAX_WRITE_QUANTITY as usize {
            return Err(Error::invalid_parameter(format!(
                "{} registers exceed the limit of {MAX_WRITE_QUANTITY}",
                self.fields.len() / 2
            )));
        }
        Ok(())
    }
}

impl Operation for WriteMultipleRegisters {
    type Output = ();

    fn request(&self, address: Address) -> Result<Vec<u8>> {
        self.validate_fields()?;
        let mut tx_buffer =
            create_request_header(address, FunctionCode::WriteMultipleRegisters, self.register);
        tx_buffer.extend_from_slice(&self.quantity().to_be_bytes());
        tx_buffer.push(self.fields.len() as u8);
        tx_buffer.extend_from_slice(&self.fields);
        crc::append(&mut tx_buffer);
        Ok(tx_buffer)
    }

    fn reply_size(&self) -> usize {
        WRITE_REPLY_LENGTH
    }

    fn decode(&self, address: Address, rx_buffer: &[u8]) -> Result<()> {
        self.validate_fields()?;
        let payload = validate_frame(
            rx_buffer,
            self.reply_size(),
            address,
            FunctionCode::WriteMultipleRegisters,
        )?;
        validate_field("register address", self.register, word_at(payload, 2))?;
        validate_field("register count", self.quantity(), word_at(payload, 4))
    }
}

/// State of the two digital inputs and two digital outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IoStatus {
    pub in_1: bool,
    pub in_2: bool,
    pub out_1: bool,
    pub out_2: bool,
}

impl IoStatus {
    /// Input register holding the IO status byte.
    pub const ADDRESS: u16 = 0x34;
    pub const QUANTITY: u16 = 1;

    pub fn request() -> ReadRegisters {
        ReadRegisters::input(Self::ADDRESS, Self::QUANTITY)
    }

    /// Bits 3 down to 0 map to IN_1, IN_2, OUT_1, OUT_2.
    pub fn from_status_byte(status: u8) -> Self {
        Self {
            in_1: read_bit!(status, 3),
            in_2: read_bit!(status, 2),
            out_1: read_bit!(status, 1),
            out_2: read_bit!(status, 0),
        }
    }

    pub fn decode_from_input_registers(words: &[Word]) -> Result<Self> {
        let word = words.first().ok_or(Error::IncompleteResponse {
            expected: Self::QUANTITY as usize,
            actual: 0,
        })?;
        Ok(Self::from_status_byte(*word as u8))
    }
}

impl fmt::Display for IoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IN_1={} IN_2={} OUT_1={} OUT_2={}",
            self.in_1 as u8, self.in_2 as u8, self.out_1 as u8, self.out_2 as u8
        )
    }
}

/// Output write request for OUT_1 and OUT_2.
///
/// Each output carries a mask byte and a value byte. Masks accept 0 to 2,
/// values 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoOutputs {
    pub out1_mask: u8,
    pub out1: u8,
    pub out2_mask: u8,
    pub out2: u8,
}

impl IoOutputs {
    /// First holding register of the output write block.
    pub const ADDRESS: u16 = 0x36;
    /// Mask that applies the accompanying value.
    pub const MASK_WRITE: u8 = 1;
    pub const MASK_MAX: u8 = 2;

    /// Drive both outputs to the given levels.
    pub fn set(out1: bool, out2: bool) -> Self {
        Self {
            out1_mask: Self::MASK_WRITE,
            out1: out1 as u8,
            out2_mask: Self::MASK_WRITE,
            out2: out2 as u8,
        }
    }

    fn validate_mask(name: &str, mask: u8) -> Result<()> {
        if mask > Self::MASK_MAX {
            return Err(Error::invalid_parameter(format!(
                "{name} {mask} is outside the valid range of 0 to {}",
                Self::MASK_MAX
            )));
        }
        Ok(())
    }

    fn validate_level(name: &str, level: u8) -> Result<()> {
        if level > 1 {
            return Err(Error::invalid_parameter(format!(
                "{name} {level} must be 0 or 1"
            )));
        }
        Ok(())
    }

    /// Field bytes in wire order: OUT_2 mask, OUT_2, OUT_1 mask, OUT_1.
    pub fn to_field_bytes(&self) -> Result<[u8; 4]> {
        Self::validate_mask("OUT_2 mask", self.out2_mask)?;
        Self::validate_level("OUT_2 value", self.out2)?;
        Self::validate_mask("OUT_1 mask", self.out1_mask)?;
        Self::validate_level("OUT_1 value", self.out1)?;
        Ok([self.out2_mask, self.out2, self.out1_mask, self.out1])
    }

    pub fn request(&self) -> Result<WriteMultipleRegisters> {
        Ok(WriteMultipleRegisters::from_fields(
            Self::ADDRESS,
            self.to_field_bytes()?.to_vec(),
        ))
    }
}

/// Move to an absolute angle with the given acceleration and speed.
///
/// Packed as four big-endian registers: acceleration, speed, then the
/// signed angle split into its high and low word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AbsoluteMove {
    pub acceleration: u16,
    pub speed: u16,
    pub angle: i32,
}

impl AbsoluteMove {
    /// First holding register of the absolute move block.
    pub const ADDRESS: u16 = 0x90;
    pub const QUANTITY: u16 = 4;

    pub fn to_words(&self) -> [Word; 4] {
        let angle = self.angle.to_be_bytes();
        [
            self.acceleration,
            self.speed,
            u16::from_be_bytes([angle[0], angle[1]]),
            u16::from_be_bytes([angle[2], angle[3]]),
        ]
    }

    pub fn from_words(words: &[Word]) -> Result<Self> {
        let [acceleration, speed, angle_hi, angle_lo]: [Word; 4] =
            words.try_into().map_err(|_| {
                Error::invalid_parameter(format!(
                    "absolute move needs {} registers, got {}",
                    Self::QUANTITY,
                    words.len()
                ))
            })?;
        let [b0, b1] = angle_hi.to_be_bytes();
        let [b2, b3] = angle_lo.to_be_bytes();
        Ok(Self {
            acceleration,
            speed,
            angle: i32::from_be_bytes([b0, b1, b2, b3]),
        })
    }

    pub fn request(&self) -> WriteMultipleRegisters {
        WriteMultipleRegisters::from_words(Self::ADDRESS, &self.to_words())
    }
}
