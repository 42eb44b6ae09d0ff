use bevy::log::warn;


pub const MAX_TEXTURE_LOG2: u32 = 24;
pub const MAX_SPLAT_COUNT: usize = 4096 * 2048;

pub const SH_C0: f32 = 0.282_094_8;


pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn sh_dc_to_color(dc: f32) -> f32 {
    (0.5 + SH_C0 * dc).clamp(0.0, 1.0)
}


const fn quantization_range(bits: u32) -> u32 {
    (1u32 << bits) - 1
}

pub fn quantize(x: f32, bits: u32, min: f32, max: f32) -> u32 {
    let range = quantization_range(bits) as f32;
    let normalized = ((x - min) / (max - min)).clamp(0.0, 1.0);

    (normalized * range).round() as u32
}

pub fn dequantize(value: u32, bits: u32, min: f32, max: f32) -> f32 {
    let range = quantization_range(bits);

    value.min(range) as f32 / range as f32 * (max - min) + min
}

pub fn quantize_u8(x: f32, min: f32, max: f32) -> u8 {
    quantize(x, 8, min, max) as u8
}

pub fn dequantize_u8(value: u8, min: f32, max: f32) -> f32 {
    dequantize(value as u32, 8, min, max)
}


pub fn clamp_splat_count(count: usize) -> usize {
    if count > MAX_SPLAT_COUNT {
        warn!(count, max = MAX_SPLAT_COUNT, "splat count exceeds texel grid capacity, clamping");
        return MAX_SPLAT_COUNT;
    }

    count
}

/// smallest power-of-two grid holding `texels`, square for even exponents and 2:1 otherwise
pub fn texture_size(texels: usize) -> (usize, usize) {
    let mut log2 = if texels <= 1 {
        0
    } else {
        usize::BITS - (texels - 1).leading_zeros()
    };

    if log2 > MAX_TEXTURE_LOG2 {
        warn!(texels, "texel count exceeds 4096x4096, clamping");
        log2 = MAX_TEXTURE_LOG2;
    }

    let height = 1usize << (log2 / 2);
    if log2 % 2 == 0 {
        (height, height)
    } else {
        (height * 2, height)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_size() {
        assert_eq!(texture_size(0), (1, 1));
        assert_eq!(texture_size(1), (1, 1));
        assert_eq!(texture_size(2), (2, 1));
        assert_eq!(texture_size(256), (16, 16));
        assert_eq!(texture_size(257), (32, 16));
        assert_eq!(texture_size(512), (32, 16));
        assert_eq!(texture_size(1 << 30), (4096, 4096));
    }

    #[test]
    fn test_quantize_bounds() {
        assert_eq!(quantize_u8(-3.0, -1.0, 1.0), 0);
        assert_eq!(quantize_u8(3.0, -1.0, 1.0), 255);
        assert_eq!(quantize(1.0, 11, 0.0, 1.0), 2047);
        assert_eq!(dequantize(4000, 11, 0.0, 1.0), 1.0);
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(20.0) > 0.999);
    }
}
