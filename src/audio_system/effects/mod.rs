/// Audio effects module
///
/// Volume fades tracked by decoders, and the engine-to-hardware volume mapping.

pub mod fade;
pub mod volume;

pub use fade::FadeEffect;
pub use volume::VolumeEffect;
