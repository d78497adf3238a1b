/// Volume control
///
/// Maps the engine's 0..=100 volume onto the hardware's native range.

/// Engine volume level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeEffect {
    /// Volume on the 0..=100 scale
    level: i32,
}

impl VolumeEffect {
    /// Create a new volume effect
    pub fn new(level: i32) -> Self {
        Self {
            level: level.clamp(0, 100),
        }
    }

    /// Hardware volume for a port whose 0 dB value is `hardware_max`.
    /// Both sub-channels always get this same value.
    pub fn to_hardware(&self, hardware_max: i32) -> i32 {
        self.level * (hardware_max / 100)
    }
}

impl Default for VolumeEffect {
    fn default() -> Self {
        Self { level: 100 }
    }
}
