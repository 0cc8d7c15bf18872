//! Rolling weak checksum.
//!
//! An Adler-32 style checksum that can slide over its input one byte at a
//! time in O(1): the byte leaving the window is removed and the byte entering
//! it is added. It is cheap but collides easily, so every hit must be
//! confirmed with a strong hash.

/// Largest prime below 2^16, as used by Adler-32.
const MODULUS: u64 = 65521;

/// Weak checksum over a fixed-size window.
#[derive(Debug, Clone)]
pub struct RollingChecksum {
    a: u64,
    b: u64,
    window: u64,
}

impl RollingChecksum {
    /// Compute the checksum of `block`; its length becomes the window size.
    pub fn new(block: &[u8]) -> Self {
        let mut a: u64 = 1;
        let mut b: u64 = 0;
        for &byte in block {
            a = (a + byte as u64) % MODULUS;
            b = (b + a) % MODULUS;
        }
        Self {
            a,
            b,
            window: block.len() as u64,
        }
    }

    /// Slide the window one byte: `out` leaves at the front, `incoming` enters at the back.
    pub fn roll(&mut self, out: u8, incoming: u8) {
        let out = out as u64;
        let incoming = incoming as u64;
        self.a = (self.a + MODULUS - out + incoming) % MODULUS;
        let removed = (self.window % MODULUS * out + 1) % MODULUS;
        self.b = (self.b + MODULUS - removed + self.a) % MODULUS;
    }

    /// Current checksum value.
    pub fn value(&self) -> u32 {
        ((self.b << 16) | self.a) as u32
    }
}

/// One-shot weak checksum of a block.
pub fn weak_checksum(block: &[u8]) -> u32 {
    RollingChecksum::new(block).value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_adler32_reference() {
        // Adler-32 of "Wikipedia" is 0x11E60398
        assert_eq!(weak_checksum(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(weak_checksum(&[]), 1);
    }

    #[test]
    fn test_roll_equals_recompute() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 37 % 251) as u8).collect();
        let window = 16;
        let mut rolling = RollingChecksum::new(&data[..window]);
        for start in 1..=(data.len() - window) {
            rolling.roll(data[start - 1], data[start + window - 1]);
            assert_eq!(rolling.value(), weak_checksum(&data[start..start + window]));
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_rolling_matches_from_scratch(
                data in proptest::collection::vec(any::<u8>(), 2..600),
                window in 1usize..64
            ) {
                prop_assume!(window < data.len());
                let mut rolling = RollingChecksum::new(&data[..window]);
                for start in 1..=(data.len() - window) {
                    rolling.roll(data[start - 1], data[start + window - 1]);
                    prop_assert_eq!(rolling.value(), weak_checksum(&data[start..start + window]));
                }
            }
        }
    }
}
