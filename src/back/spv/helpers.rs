use spirv::Word;

/// Pack a byte sequence into little-endian words, padding with zeros.
pub(super) fn bytes_to_words(bytes: &[u8]) -> Vec<Word> {
    bytes
        .chunks(4)
        .map(|chars| chars.iter().rev().fold(0u32, |u, c| (u << 8) | *c as u32))
        .collect()
}

/// Pack a string into NUL-terminated little-endian words.
///
/// At least one terminating NUL is always present, even when the string
/// length is a multiple of four.
pub(super) fn string_to_words(input: &str) -> Vec<Word> {
    let bytes = input.as_bytes();
    let mut words = bytes_to_words(bytes);

    if bytes.len() % 4 == 0 {
        // nul-termination
        words.push(0x0);
    }

    words
}

/// Map an IR address space to the SPIR-V storage class.
///
/// Storage buffers use the `StorageBuffer` class unconditionally; versions
/// below 1.3 get the `SPV_KHR_storage_buffer_storage_class` extension
/// declared by the writer.
pub(super) fn map_address_space(space: crate::AddressSpace) -> spirv::StorageClass {
    match space {
        crate::AddressSpace::Function => spirv::StorageClass::Function,
        crate::AddressSpace::Private => spirv::StorageClass::Private,
        crate::AddressSpace::WorkGroup => spirv::StorageClass::Workgroup,
        crate::AddressSpace::Uniform => spirv::StorageClass::Uniform,
        crate::AddressSpace::Storage { .. } => spirv::StorageClass::StorageBuffer,
        crate::AddressSpace::Handle => spirv::StorageClass::UniformConstant,
        crate::AddressSpace::PushConstant => spirv::StorageClass::PushConstant,
    }
}

/// Map an IR image dimension to SPIR-V.
pub(super) fn map_dim(dim: crate::ImageDimension) -> spirv::Dim {
    match dim {
        crate::ImageDimension::D1 => spirv::Dim::Dim1D,
        crate::ImageDimension::D2 => spirv::Dim::Dim2D,
        crate::ImageDimension::D3 => spirv::Dim::Dim3D,
        crate::ImageDimension::Cube => spirv::Dim::DimCube,
    }
}

/// Map an IR storage format to the SPIR-V image format.
pub(super) fn map_storage_format(format: crate::StorageFormat) -> spirv::ImageFormat {
    use crate::StorageFormat as Sf;
    use spirv::ImageFormat as If;
    match format {
        Sf::R8Unorm => If::R8,
        Sf::R8Snorm => If::R8Snorm,
        Sf::R8Uint => If::R8ui,
        Sf::R8Sint => If::R8i,
        Sf::R16Uint => If::R16ui,
        Sf::R16Sint => If::R16i,
        Sf::R16Float => If::R16f,
        Sf::Rg8Unorm => If::Rg8,
        Sf::Rg8Snorm => If::Rg8Snorm,
        Sf::Rg8Uint => If::Rg8ui,
        Sf::Rg8Sint => If::Rg8i,
        Sf::R32Uint => If::R32ui,
        Sf::R32Sint => If::R32i,
        Sf::R32Float => If::R32f,
        Sf::Rg16Uint => If::Rg16ui,
        Sf::Rg16Sint => If::Rg16i,
        Sf::Rg16Float => If::Rg16f,
        Sf::Rgba8Unorm => If::Rgba8,
        Sf::Rgba8Snorm => If::Rgba8Snorm,
        Sf::Rgba8Uint => If::Rgba8ui,
        Sf::Rgba8Sint => If::Rgba8i,
        Sf::Rgb10a2Unorm => If::Rgb10A2,
        Sf::Rg11b10Float => If::R11fG11fB10f,
        Sf::Rg32Uint => If::Rg32ui,
        Sf::Rg32Sint => If::Rg32i,
        Sf::Rg32Float => If::Rg32f,
        Sf::Rgba16Uint => If::Rgba16ui,
        Sf::Rgba16Sint => If::Rgba16i,
        Sf::Rgba16Float => If::Rgba16f,
        Sf::Rgba32Uint => If::Rgba32ui,
        Sf::Rgba32Sint => If::Rgba32i,
        Sf::Rgba32Float => If::Rgba32f,
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_string_to_words() {
        let words = super::string_to_words("DATA");
        assert_eq!(words, [0x41544144, 0x0000_0000]);
    }

    #[test]
    fn test_short_string_to_words() {
        let words = super::string_to_words("ab");
        assert_eq!(words, [0x0000_6261]);
    }
}
