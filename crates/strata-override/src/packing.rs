//! Byte encoding of f32 values for an RGBA8 texture.
//!
//! Layout per float: `[biased exponent, sign << 7 | mantissa[22..16],
//! mantissa[15..8], mantissa[7..0]]`. Zero and subnormals encode as four zero
//! bytes; every other value (including infinities and NaN) round-trips
//! bit-exactly.

pub const BYTES_PER_FLOAT: usize = 4;

const MANTISSA_MASK: u32 = 0x007f_ffff;

#[must_use]
pub fn pack_float(value: f32) -> [u8; BYTES_PER_FLOAT] {
    let bits = value.to_bits();
    let exponent = (bits >> 23) & 0xff;
    if exponent == 0 {
        return [0; BYTES_PER_FLOAT];
    }
    let sign = bits >> 31;
    let mantissa = bits & MANTISSA_MASK;
    [
        exponent as u8,
        ((sign << 7) | (mantissa >> 16)) as u8,
        (mantissa >> 8) as u8,
        mantissa as u8,
    ]
}

#[must_use]
pub fn unpack_float(bytes: [u8; BYTES_PER_FLOAT]) -> f32 {
    let exponent = u32::from(bytes[0]);
    if exponent == 0 {
        return 0.0;
    }
    let sign = u32::from(bytes[1] >> 7);
    let mantissa =
        (u32::from(bytes[1] & 0x7f) << 16) | (u32::from(bytes[2]) << 8) | u32::from(bytes[3]);
    f32::from_bits((sign << 31) | (exponent << 23) | mantissa)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_all_zero_bytes() {
        assert_eq!(pack_float(0.0), [0, 0, 0, 0]);
        assert_eq!(pack_float(-0.0), [0, 0, 0, 0]);
        assert_eq!(unpack_float([0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn test_one_layout() {
        // 1.0 = exponent 127, sign 0, mantissa 0.
        assert_eq!(pack_float(1.0), [127, 0, 0, 0]);
        // -2.5 = exponent 128, sign 1, mantissa 0x200000.
        assert_eq!(pack_float(-2.5), [128, 0x80 | 0x20, 0, 0]);
    }

    #[test]
    fn test_normal_values_roundtrip_exactly() {
        let values = [
            1.0,
            -1.0,
            0.1,
            -123.456,
            std::f32::consts::PI,
            1.0e-30,
            3.0e38,
            f32::MIN_POSITIVE,
            f32::MAX,
            f32::INFINITY,
            f32::NEG_INFINITY,
        ];
        for value in values {
            assert_eq!(unpack_float(pack_float(value)).to_bits(), value.to_bits());
        }
        assert!(unpack_float(pack_float(f32::NAN)).is_nan());
    }

    #[test]
    fn test_subnormal_flushes_to_zero() {
        let tiny = f32::MIN_POSITIVE / 4.0;
        assert!(tiny > 0.0);
        assert_eq!(unpack_float(pack_float(tiny)), 0.0);
    }
}
