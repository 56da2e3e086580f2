//! Interface types between the core and emulator runtimes.

/// One rendered video frame: row-major RGB bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, rows top to bottom.
    pub pixels: Vec<u8>,
}

impl Frame {
    /// A frame with either dimension zero — the runtime had nothing to
    /// render yet. Egress skips these.
    pub fn is_blank(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The pixel buffer length implied by the dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// The three device classes of a session's joypad-style input sink.
///
/// Each class is indexed by a small non-negative id and accepts a signed
/// 16-bit value: digital buttons use 0/1, sticks the full range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputDevice {
    Button,
    LeftStick,
    RightStick,
}

impl InputDevice {
    /// Maps the wire-level device kind to a device class.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "button" => Some(Self::Button),
            "leftStick" => Some(Self::LeftStick),
            "rightStick" => Some(Self::RightStick),
            _ => None,
        }
    }

    /// The largest valid id for this device class.
    pub fn max_id(self) -> i16 {
        match self {
            Self::Button => 15,
            Self::LeftStick | Self::RightStick => 1,
        }
    }

    /// Whether `id` indexes a real control of this class.
    pub fn accepts_id(self, id: i16) -> bool {
        (0..=self.max_id()).contains(&id)
    }
}
