use once_cell::sync::Lazy;

/// Expand every pattern byte into its eight bit values so tile
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
