use once_cell::sync::Lazy;

/// Expand every possible pattern byte into its eight bit values so tile
/// rasterization never shifts per pixel. Index: [byte][pixel 0 = leftmost].
pub static BIT_EXPAND: Lazy<[[u8; 8]; 256]> = Lazy::new(|| {
    let mut table = [[0u8; 8]; 256];
    for (byte, row) in table.iter_mut().enumerate() {
        for (bit, out) in row.iter_mut().enumerate() {
            *out = ((byte >> (7 - bit)) & 1) as u8;
        }
    }
    table
});

/// 2C02 master palette, RGBA byte order.
#[rustfmt::skip]
const MASTER_PALETTE_RGB: [(u8, u8, u8); 64] = [
    (0x66, 0x66, 0x66), (0x00, 0x2A, 0x88), (0x14, 0x12, 0xA7), (0x3B, 0x00, 0xA4),
    (0x5C, 0x00, 0x7E), (0x6E, 0x00, 0x40), (0x6C, 0x06, 0x00), (0x56, 0x1D, 0x00),
    (0x33, 0x35, 0x00), (0x0B, 0x48, 0x00), (0x00, 0x52, 0x00), (0x00, 0x4F, 0x08),
    (0x00, 0x40, 0x4D), (0x00, 0x00, 0x00), (0x00, 0x00, 0x00), (0x00, 0x00, 0x00),
    (0xAD, 0xAD, 0xAD), (0x15, 0x5F, 0xD9), (0x42, 0x40, 0xFF), (0x75, 0x27, 0xFE),
    (0xA0, 0x1A, 0xCC), (0xB7, 0x1E, 0x7B), (0xB5, 0x31, 0x20), (0x99, 0x4E, 0x00),
    (0x6B, 0x6D, 0x00), (0x38, 0x87, 0x00), (0x0C, 0x93, 0x00), (0x00, 0x8F, 0x32),
    (0x00, 0x7C, 0x8D), (0x00, 0x00, 0x00), (0x00, 0x00, 0x00), (0x00, 0x00, 0x00),
    (0xFF, 0xFE, 0xFF), (0x64, 0xB0, 0xFF), (0x92, 0x90, 0xFF), (0xC6, 0x76, 0xFF),
    (0xF3, 0x6A, 0xFF), (0xFE, 0x6E, 0xCC), (0xFE, 0x81, 0x70), (0xEA, 0x9E, 0x22),
    (0xBC, 0xBE, 0x00), (0x88, 0xD8, 0x00), (0x5C, 0xE4, 0x30), (0x45, 0xE0, 0x82),
    (0x48, 0xCD, 0xDE), (0x4F, 0x4F, 0x4F), (0x00, 0x00, 0x00), (0x00, 0x00, 0x00),
    (0xFF, 0xFE, 0xFF), (0xC0, 0xDF, 0xFF), (0xD3, 0xD2, 0xFF), (0xE8, 0xC8, 0xFF),
    (0xFB, 0xC2, 0xFF), (0xFE, 0xC4, 0xEA), (0xFE, 0xCC, 0xC5), (0xF7, 0xD8, 0xA5),
    (0xE4, 0xE5, 0x94), (0xCF, 0xEF, 0x96), (0xBD, 0xF4, 0xAB), (0xB3, 0xF3, 0xCC),
    (0xB5, 0xEB, 0xF2), (0xB8, 0xB8, 0xB8), (0x00, 0x00, 0x00), (0x00, 0x00, 0x00),
];

pub static MASTER_PALETTE: Lazy<[u32; 64]> = Lazy::new(|| {
    let mut table = [0u32; 64];
    for (i, &(r, g, b)) in MASTER_PALETTE_RGB.iter().enumerate() {
        table[i] = u32::from_le_bytes([r, g, b, 0xFF]);
    }
    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_expand_matches_shifting() {
        for byte in 0..=255usize {
            for bit in 0..8 {
                assert_eq!(BIT_EXPAND[byte][bit], ((byte >> (7 - bit)) & 1) as u8);
            }
        }
    }

    #[test]
    fn palette_is_opaque_rgba() {
        for &color in MASTER_PALETTE.iter() {
            assert_eq!(color.to_le_bytes()[3], 0xFF);
        }
    }
}
