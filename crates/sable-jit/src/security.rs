//! Code checksums and at-rest masking of stored native code

/// Key for the XOR mask applied to stored code
pub const CODE_MASK_KEY: u8 = 0xAA;

/// 32-bit rolling checksum: rotate right by one, then add the byte
pub fn checksum(code: &[u8]) -> u32 {
    code.iter()
        .fold(0u32, |acc, &byte| acc.rotate_right(1).wrapping_add(u32::from(byte)))
}

/// XOR every byte with `key` in place. Applying it twice restores the input.
pub fn mask_in_place(code: &mut [u8], key: u8) {
    for byte in code {
        *byte ^= key;
    }
}

/// Masked copy of `code`
pub fn masked(code: &[u8], key: u8) -> Vec<u8> {
    let mut copy = code.to_vec();
    mask_in_place(&mut copy, key);
    copy
}
