use std::fmt;

/// Op codes of the mixer's `{op, d}` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MixerOp {
    Hello = 0,
    Identify = 1,
    Identified = 2,
    Reidentify = 3,
    Event = 5,
    Request = 6,
    RequestResponse = 7,
    RequestBatch = 8,
    RequestBatchResponse = 9,
}

impl MixerOp {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "Hello",
            Self::Identify => "Identify",
            Self::Identified => "Identified",
            Self::Reidentify => "Reidentify",
            Self::Event => "Event",
            Self::Request => "Request",
            Self::RequestResponse => "RequestResponse",
            Self::RequestBatch => "RequestBatch",
            Self::RequestBatchResponse => "RequestBatchResponse",
        }
    }
}

impl TryFrom<u8> for MixerOp {
    type Error = u8;

    fn try_from(op: u8) -> Result<Self, Self::Error> {
        Ok(match op {
            0 => Self::Hello,
            1 => Self::Identify,
            2 => Self::Identified,
            3 => Self::Reidentify,
            5 => Self::Event,
            6 => Self::Request,
            7 => Self::RequestResponse,
            8 => Self::RequestBatch,
            9 => Self::RequestBatchResponse,
            other => return Err(other),
        })
    }
}

impl fmt::Display for MixerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// Event subscription bitmask covering every non-high-volume category
/// (general, config, scenes, inputs, transitions, filters, outputs, scene
/// items, media inputs, vendors, ui).
pub const EVENT_SUBSCRIPTION_ALL: u32 = (1 << 11) - 1;
