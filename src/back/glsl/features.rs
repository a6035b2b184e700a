use super::{Error, Version};
use std::fmt::Write;

bitflags::bitflags! {
    /// Language features used by a module, to be checked against the target
    /// version and turned into `#extension` directives where possible.
    pub struct Features: u32 {
        /// 64-bit floats.
        const DOUBLE_TYPE = 1;
        /// Buffer-backed storage (SSBO).
        const BUFFER_STORAGE = 1 << 1;
        /// Workgroup shared storage.
        const SHARED_STORAGE = 1 << 2;
        /// Compute shaders.
        const COMPUTE_SHADER = 1 << 3;
        /// Image load/store.
        const IMAGE_LOAD_STORE = 1 << 4;
        /// Multisampled textures.
        const MULTISAMPLED_TEXTURES = 1 << 5;
        /// Multisampled texture arrays.
        const MULTISAMPLED_TEXTURE_ARRAYS = 1 << 6;
        /// Arrayed textures of non-2D dimension.
        const NON_2D_TEXTURE_ARRAYS = 1 << 7;
        /// Cube map texture arrays.
        const CUBE_TEXTURES_ARRAY = 1 << 8;
        /// Fused multiply-add.
        const FMA = 1 << 9;
        /// Integer bit-manipulation functions.
        const INTEGER_FUNCTIONS = 1 << 10;
        /// `textureQueryLevels`.
        const TEXTURE_LEVELS = 1 << 11;
        /// `textureSamples`.
        const TEXTURE_SAMPLES = 1 << 12;
        /// Atomic functions.
        const ATOMIC_FUNCTIONS = 1 << 13;
        /// Explicit `layout(location = ..)` on `in`/`out` interface blocks.
        const EXPLICIT_LOCATIONS = 1 << 14;
        /// Sample-rate interpolation qualifiers.
        const SAMPLE_QUALIFIER = 1 << 15;
    }
}

/// Records the features a module uses, then verifies them against the target
/// version and writes the `#extension` lines the output needs.
pub struct FeaturesManager(Features);

impl FeaturesManager {
    pub fn new() -> Self {
        FeaturesManager(Features::empty())
    }

    /// Mark a feature as used.
    pub fn request(&mut self, features: Features) {
        self.0 |= features
    }

    /// The minimum version that supports every requested feature, which may
    /// exceed the requested one.
    pub fn minimum_version(&self, version: Version) -> Version {
        let mut minimum = version;
        let mut raise = |v: Version| {
            if minimum < v {
                minimum = v;
            }
        };
        match version {
            Version::Desktop(_) => {
                if self.0.contains(Features::DOUBLE_TYPE) {
                    raise(Version::Desktop(400));
                }
                if self.0.intersects(
                    Features::BUFFER_STORAGE
                        | Features::COMPUTE_SHADER
                        | Features::SHARED_STORAGE
                        | Features::ATOMIC_FUNCTIONS,
                ) {
                    raise(Version::Desktop(430));
                }
                if self.0.contains(Features::IMAGE_LOAD_STORE) {
                    raise(Version::Desktop(420));
                }
                if self
                    .0
                    .intersects(Features::FMA | Features::INTEGER_FUNCTIONS | Features::TEXTURE_LEVELS)
                {
                    raise(Version::Desktop(400));
                }
                if self.0.contains(Features::TEXTURE_SAMPLES) {
                    raise(Version::Desktop(450));
                }
                if self.0.contains(Features::CUBE_TEXTURES_ARRAY) {
                    raise(Version::Desktop(400));
                }
            }
            Version::Embedded(_) => {
                if self.0.intersects(
                    Features::BUFFER_STORAGE
                        | Features::COMPUTE_SHADER
                        | Features::SHARED_STORAGE
                        | Features::IMAGE_LOAD_STORE
                        | Features::MULTISAMPLED_TEXTURES
                        | Features::FMA
                        | Features::INTEGER_FUNCTIONS
                        | Features::ATOMIC_FUNCTIONS,
                ) {
                    raise(Version::Embedded(310));
                }
                if self.0.intersects(
                    Features::MULTISAMPLED_TEXTURE_ARRAYS
                        | Features::CUBE_TEXTURES_ARRAY
                        | Features::TEXTURE_LEVELS
                        | Features::TEXTURE_SAMPLES,
                ) {
                    raise(Version::Embedded(320));
                }
            }
        }
        minimum
    }

    /// Fail if any requested feature is out of reach of the target version,
    /// even with extensions.
    pub fn check_availability(&self, version: Version) -> Result<(), Error> {
        let unsupported = match version {
            Version::Desktop(_) => Features::empty(),
            Version::Embedded(_) => Features::DOUBLE_TYPE | Features::NON_2D_TEXTURE_ARRAYS,
        };
        let collision = self.0 & unsupported;
        if !collision.is_empty() {
            return Err(Error::UnsupportedFeatures(collision));
        }
        let minimum = self.minimum_version(version);
        if version < minimum {
            return Err(Error::VersionTooLow {
                requested: version,
                required: minimum,
            });
        }
        Ok(())
    }

    /// Write the `#extension` directives for features that the core version
    /// does not include but an extension provides.
    pub fn write_extensions(&self, version: Version, out: &mut String) -> Result<(), Error> {
        match version {
            Version::Desktop(v) => {
                if self.0.contains(Features::COMPUTE_SHADER) && v < 460 {
                    writeln!(out, "#extension GL_ARB_compute_shader : require")?;
                }
                if self.0.contains(Features::EXPLICIT_LOCATIONS) && v < 410 {
                    writeln!(
                        out,
                        "#extension GL_ARB_explicit_attrib_location : require"
                    )?;
                }
                if self.0.contains(Features::BUFFER_STORAGE) && v < 440 {
                    writeln!(
                        out,
                        "#extension GL_ARB_shader_storage_buffer_object : require"
                    )?;
                }
                if self.0.contains(Features::CUBE_TEXTURES_ARRAY) && v < 460 {
                    writeln!(out, "#extension GL_ARB_texture_cube_map_array : require")?;
                }
            }
            Version::Embedded(v) => {
                if self.0.contains(Features::CUBE_TEXTURES_ARRAY) && v < 320 {
                    writeln!(out, "#extension GL_EXT_texture_cube_map_array : require")?;
                }
                if self.0.contains(Features::MULTISAMPLED_TEXTURE_ARRAYS) && v < 320 {
                    writeln!(
                        out,
                        "#extension GL_OES_texture_storage_multisample_2d_array : require"
                    )?;
                }
                if self.0.contains(Features::SAMPLE_QUALIFIER) && v < 320 {
                    writeln!(out, "#extension GL_OES_shader_multisample_interpolation : require")?;
                }
            }
        }
        Ok(())
    }
}
