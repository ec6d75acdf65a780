//! Brick message protocol: telemetry quantities, callback payloads, request
//! decoding and packet framing.
//!
//! Every packet starts with an 8-byte header followed by a little-endian
//! payload:
//!
//! ```text
//! 0  uid            u32
//! 4  length         u8   header + payload
//! 5  function id    u8
//! 6  options        u8   sequence number << 4 | response expected << 3
//! 7  flags          u8   error code << 6
//! ```

use bytemuck::{Pod, Zeroable};
use heapless::Vec;

use crate::drivers::imu::{EulerAngles, Quaternion, Snapshot, Vector3};

pub const HEADER_LEN: usize = 8;
pub const MAX_PAYLOAD_LEN: usize = Snapshot::LEN;
pub const MAX_FRAME_LEN: usize = 80;

pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;
pub type Frame = Vec<u8, MAX_FRAME_LEN>;

/* ───── Function ids ─────────────────────────────────────────────────── */
pub mod fid {
    pub const GET_ACCELERATION: u8 = 1;
    pub const GET_ALL_DATA: u8 = 9;
    pub const LEDS_ON: u8 = 10;
    pub const LEDS_OFF: u8 = 11;
    pub const ARE_LEDS_ON: u8 = 12;
    pub const SAVE_CALIBRATION: u8 = 13;
    pub const SET_ACCELERATION_PERIOD: u8 = 14;
    pub const GET_ALL_DATA_PERIOD: u8 = 31;

    pub const CALLBACK_ACCELERATION: u8 = 32;
    pub const CALLBACK_MAGNETIC_FIELD: u8 = 33;
    pub const CALLBACK_ANGULAR_VELOCITY: u8 = 34;
    pub const CALLBACK_TEMPERATURE: u8 = 35;
    pub const CALLBACK_LINEAR_ACCELERATION: u8 = 36;
    pub const CALLBACK_GRAVITY_VECTOR: u8 = 37;
    pub const CALLBACK_ORIENTATION: u8 = 38;
    pub const CALLBACK_QUATERNION: u8 = 39;
    pub const CALLBACK_ALL_DATA: u8 = 40;
}

/// One independently schedulable telemetry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Quantity {
    Acceleration = 0,
    MagneticField = 1,
    AngularVelocity = 2,
    Temperature = 3,
    Orientation = 4,
    LinearAcceleration = 5,
    GravityVector = 6,
    Quaternion = 7,
    AllData = 8,
}

impl Quantity {
    pub const COUNT: usize = 9;

    pub const ALL: [Quantity; Self::COUNT] = [
        Quantity::Acceleration,
        Quantity::MagneticField,
        Quantity::AngularVelocity,
        Quantity::Temperature,
        Quantity::Orientation,
        Quantity::LinearAcceleration,
        Quantity::GravityVector,
        Quantity::Quaternion,
        Quantity::AllData,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn getter_fid(self) -> u8 {
        fid::GET_ACCELERATION + self as u8
    }

    pub const fn set_period_fid(self) -> u8 {
        fid::SET_ACCELERATION_PERIOD + 2 * self as u8
    }

    pub const fn get_period_fid(self) -> u8 {
        self.set_period_fid() + 1
    }

    pub const fn callback_fid(self) -> u8 {
        match self {
            Quantity::Acceleration => fid::CALLBACK_ACCELERATION,
            Quantity::MagneticField => fid::CALLBACK_MAGNETIC_FIELD,
            Quantity::AngularVelocity => fid::CALLBACK_ANGULAR_VELOCITY,
            Quantity::Temperature => fid::CALLBACK_TEMPERATURE,
            Quantity::Orientation => fid::CALLBACK_ORIENTATION,
            Quantity::LinearAcceleration => fid::CALLBACK_LINEAR_ACCELERATION,
            Quantity::GravityVector => fid::CALLBACK_GRAVITY_VECTOR,
            Quantity::Quaternion => fid::CALLBACK_QUATERNION,
            Quantity::AllData => fid::CALLBACK_ALL_DATA,
        }
    }
}

/// Telemetry for one quantity, copied out of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    Acceleration(Vector3),
    MagneticField(Vector3),
    AngularVelocity(Vector3),
    Temperature(i8),
    Orientation(EulerAngles),
    LinearAcceleration(Vector3),
    GravityVector(Vector3),
    Quaternion(Quaternion),
    AllData(Snapshot),
}

impl Message {
    pub fn from_snapshot(quantity: Quantity, snapshot: &Snapshot) -> Self {
        match quantity {
            Quantity::Acceleration => Message::Acceleration(snapshot.acceleration),
            Quantity::MagneticField => Message::MagneticField(snapshot.magnetic_field),
            Quantity::AngularVelocity => Message::AngularVelocity(snapshot.angular_velocity),
            Quantity::Temperature => Message::Temperature(snapshot.temperature),
            Quantity::Orientation => Message::Orientation(snapshot.orientation),
            Quantity::LinearAcceleration => {
                Message::LinearAcceleration(snapshot.linear_acceleration)
            }
            Quantity::GravityVector => Message::GravityVector(snapshot.gravity_vector),
            Quantity::Quaternion => Message::Quaternion(snapshot.quaternion),
            Quantity::AllData => Message::AllData(*snapshot),
        }
    }

    pub fn quantity(&self) -> Quantity {
        match self {
            Message::Acceleration(_) => Quantity::Acceleration,
            Message::MagneticField(_) => Quantity::MagneticField,
            Message::AngularVelocity(_) => Quantity::AngularVelocity,
            Message::Temperature(_) => Quantity::Temperature,
            Message::Orientation(_) => Quantity::Orientation,
            Message::LinearAcceleration(_) => Quantity::LinearAcceleration,
            Message::GravityVector(_) => Quantity::GravityVector,
            Message::Quaternion(_) => Quantity::Quaternion,
            Message::AllData(_) => Quantity::AllData,
        }
    }

    /// Payload size of this message type, from its own field layout.
    pub fn payload_len(&self) -> usize {
        match self {
            Message::Temperature(_) => 1,
            Message::Orientation(_) => EulerAngles::LEN,
            Message::Quaternion(_) => Quaternion::LEN,
            Message::AllData(_) => Snapshot::LEN,
            _ => Vector3::LEN,
        }
    }

    pub fn payload(&self) -> Payload {
        let mut raw = [0u8; MAX_PAYLOAD_LEN];
        match self {
            Message::Acceleration(v)
            | Message::MagneticField(v)
            | Message::AngularVelocity(v)
            | Message::LinearAcceleration(v)
            | Message::GravityVector(v) => v.encode(&mut raw),
            Message::Temperature(t) => raw[0] = *t as u8,
            Message::Orientation(e) => e.encode(&mut raw),
            Message::Quaternion(q) => q.encode(&mut raw),
            Message::AllData(s) => raw = s.to_bytes(),
        }
        // payload_len() never exceeds MAX_PAYLOAD_LEN
        Vec::from_slice(&raw[..self.payload_len()]).unwrap_or_default()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct Header {
    pub uid: [u8; 4],
    pub length: u8,
    pub function_id: u8,
    pub options: u8,
    pub flags: u8,
}

const RESPONSE_EXPECTED: u8 = 1 << 3;

impl Header {
    pub fn new(uid: u32, function_id: u8, payload_len: usize) -> Self {
        Self {
            uid: uid.to_le_bytes(),
            length: (HEADER_LEN + payload_len) as u8,
            function_id,
            options: 0,
            flags: 0,
        }
    }

    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let raw = raw.get(..HEADER_LEN).ok_or(ProtocolError::Truncated)?;
        Ok(bytemuck::pod_read_unaligned(raw))
    }

    pub fn uid(&self) -> u32 {
        u32::from_le_bytes(self.uid)
    }

    /// Whether a packet with this header is meant for `uid`; uid 0 is a
    /// broadcast.
    pub fn addressed_to(&self, uid: u32) -> bool {
        let target = self.uid();
        target == 0 || target == uid
    }

    pub fn sequence(&self) -> u8 {
        self.options >> 4
    }

    pub fn response_expected(&self) -> bool {
        self.options & RESPONSE_EXPECTED != 0
    }

    /// Header for the response to this request.
    pub fn reply(&self, payload_len: usize) -> Self {
        Self {
            length: (HEADER_LEN + payload_len) as u8,
            flags: 0,
            ..*self
        }
    }
}

/// Header followed by payload.
pub fn frame(header: &Header, payload: &[u8]) -> Frame {
    let mut frame = Frame::new();
    // HEADER_LEN + MAX_PAYLOAD_LEN < MAX_FRAME_LEN
    let _ = frame.extend_from_slice(bytemuck::bytes_of(header));
    let _ = frame.extend_from_slice(&payload[..payload.len().min(MAX_FRAME_LEN - HEADER_LEN)]);
    frame
}

/// Callback packet for `message`.
pub fn callback_frame(uid: u32, message: &Message) -> Frame {
    let payload = message.payload();
    let header = Header::new(uid, message.quantity().callback_fid(), payload.len());
    frame(&header, &payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    Truncated,
    UnknownFunction(u8),
    BadLength { expected: usize, got: usize },
}

/// Host request, decoded from a packet addressed to this brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    Get(Quantity),
    LedsOn,
    LedsOff,
    AreLedsOn,
    SaveCalibration,
    SetPeriod(Quantity, u32),
    GetPeriod(Quantity),
}

impl Request {
    pub fn decode(function_id: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        let expect = |len: usize| {
            if payload.len() == len {
                Ok(())
            } else {
                Err(ProtocolError::BadLength {
                    expected: len,
                    got: payload.len(),
                })
            }
        };

        let request = match function_id {
            fid::GET_ACCELERATION..=fid::GET_ALL_DATA => {
                expect(0)?;
                let quantity = Quantity::from_index((function_id - fid::GET_ACCELERATION) as usize)
                    .ok_or(ProtocolError::UnknownFunction(function_id))?;
                Request::Get(quantity)
            }
            fid::LEDS_ON => {
                expect(0)?;
                Request::LedsOn
            }
            fid::LEDS_OFF => {
                expect(0)?;
                Request::LedsOff
            }
            fid::ARE_LEDS_ON => {
                expect(0)?;
                Request::AreLedsOn
            }
            fid::SAVE_CALIBRATION => {
                expect(0)?;
                Request::SaveCalibration
            }
            fid::SET_ACCELERATION_PERIOD..=fid::GET_ALL_DATA_PERIOD => {
                let offset = (function_id - fid::SET_ACCELERATION_PERIOD) as usize;
                let quantity = Quantity::from_index(offset / 2)
                    .ok_or(ProtocolError::UnknownFunction(function_id))?;
                if offset % 2 == 0 {
                    expect(4)?;
                    let period = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    Request::SetPeriod(quantity, period)
                } else {
                    expect(0)?;
                    Request::GetPeriod(quantity)
                }
            }
            other => return Err(ProtocolError::UnknownFunction(other)),
        };
        Ok(request)
    }

    /// Parse a complete packet.
    pub fn parse(raw: &[u8]) -> Result<(Header, Self), ProtocolError> {
        let header = Header::parse(raw)?;
        let length = header.length as usize;
        if length < HEADER_LEN || raw.len() < length {
            return Err(ProtocolError::Truncated);
        }
        let request = Self::decode(header.function_id, &raw[HEADER_LEN..length])?;
        Ok((header, request))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    Value(Message),
    Bool(bool),
    Period(u32),
}

impl Response {
    pub fn payload(&self) -> Payload {
        match self {
            Response::Value(message) => message.payload(),
            Response::Bool(value) => Vec::from_slice(&[*value as u8]).unwrap_or_default(),
            Response::Period(period) => Vec::from_slice(&period.to_le_bytes()).unwrap_or_default(),
        }
    }
}

/// Reply packet for `request`. Requests without a response payload are only
/// acknowledged when the host asked for it.
pub fn response_frame(request: &Header, response: Option<&Response>) -> Option<Frame> {
    match response {
        Some(response) => {
            let payload = response.payload();
            Some(frame(&request.reply(payload.len()), &payload))
        }
        None if request.response_expected() => Some(frame(&request.reply(0), &[])),
        None => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    Timeout,
}

/// Outgoing side of the transport. Implementations block for a bounded time
/// at most.
#[allow(async_fn_in_trait)]
pub trait TelemetrySink {
    async fn send(&mut self, frame: Frame) -> Result<(), SendError>;
}
