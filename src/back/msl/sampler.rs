use std::fmt::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Coord {
    Normalized,
    Pixel,
}

impl Default for Coord {
    fn default() -> Self {
        Self::Normalized
    }
}

impl Coord {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Normalized => "normalized",
            Self::Pixel => "pixel",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Address {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToZero,
    ClampToBorder,
}

impl Default for Address {
    fn default() -> Self {
        Self::ClampToEdge
    }
}

impl Address {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Repeat => "repeat",
            Self::MirroredRepeat => "mirrored_repeat",
            Self::ClampToEdge => "clamp_to_edge",
            Self::ClampToZero => "clamp_to_zero",
            Self::ClampToBorder => "clamp_to_border",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

impl Default for BorderColor {
    fn default() -> Self {
        Self::TransparentBlack
    }
}

impl BorderColor {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::TransparentBlack => "transparent_black",
            Self::OpaqueBlack => "opaque_black",
            Self::OpaqueWhite => "opaque_white",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Filter {
    Nearest,
    Linear,
}

impl Filter {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::Nearest
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompareFunc {
    Never,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    Always,
}

impl Default for CompareFunc {
    fn default() -> Self {
        Self::Never
    }
}

impl CompareFunc {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Never => "never",
            Self::Less => "less",
            Self::LessEqual => "less_equal",
            Self::Greater => "greater",
            Self::GreaterEqual => "greater_equal",
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Always => "always",
        }
    }
}

/// The state of a `constexpr sampler`, substituted for a sampler binding by
/// the per-entry-point pipeline options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InlineSampler {
    pub coord: Coord,
    pub address: [Address; 3],
    pub border_color: BorderColor,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mip_filter: Option<Filter>,
    pub compare_func: CompareFunc,
}

impl InlineSampler {
    /// Write the argument list of the `constexpr sampler(..)` declaration.
    pub fn write_arguments(&self, out: &mut impl Write) -> fmt::Result {
        write!(out, "coord::{}", self.coord.as_str())?;
        write!(
            out,
            ", s_address::{}, t_address::{}, r_address::{}",
            self.address[0].as_str(),
            self.address[1].as_str(),
            self.address[2].as_str(),
        )?;
        if self
            .address
            .iter()
            .any(|&address| address == Address::ClampToBorder)
        {
            write!(out, ", border_color::{}", self.border_color.as_str())?;
        }
        write!(
            out,
            ", mag_filter::{}, min_filter::{}",
            self.mag_filter.as_str(),
            self.min_filter.as_str(),
        )?;
        if let Some(mip_filter) = self.mip_filter {
            write!(out, ", mip_filter::{}", mip_filter.as_str())?;
        }
        if self.compare_func != CompareFunc::Never {
            write!(out, ", compare_func::{}", self.compare_func.as_str())?;
        }
        Ok(())
    }
}
