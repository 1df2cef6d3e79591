//! "Rolling rocks": the word-mixing keystream behind `BPFTCAM` images.
//!
//! The network has no shorter equivalent; every rotate, add and swap below is
//! load-bearing for bit-exact output.

const EXPAND: u32 = 69069;
const ROUNDS: usize = 4;
const STEPS: usize = 4;

#[derive(Debug, Clone)]
pub struct RollingRocks {
    a: [u32; 4],
    b: [u32; 4],
    x: [u32; 4],
    c1: u32,
    c2: u32,
    c3: u32,
    r: [u32; 8],
}

impl RollingRocks {
    pub fn new(seed: u32) -> Self {
        let mut key = [0u32; 12];
        key[0] = seed;
        for i in 1..key.len() {
            key[i] = key[i - 1].wrapping_mul(EXPAND).wrapping_add(1);
        }

        let mix = |i: usize| {
            let turn = i as u32 + 1;
            key[i].rotate_left(turn) ^ key[i + 4].rotate_right(turn)
        };
        let c1 = mix(0) % 3;
        let c2 = (mix(1).wrapping_mul(EXPAND) ^ mix(2)) % 3;
        let c3 = (mix(2) ^ (mix(3) >> 16)) % 3;

        let mut r = [0u32; 8];
        for (i, slot) in r.iter_mut().enumerate() {
            let word = key[i];
            *slot = ((word.rotate_left(i as u32 + 1) ^ word.wrapping_mul(EXPAND)) % 0x1f) + 1;
        }

        RollingRocks {
            a: [key[0], key[1], key[2], key[3]],
            b: [key[4], key[5], key[6], key[7]],
            x: [key[8], key[9], key[10], key[11]],
            c1,
            c2,
            c3,
            r,
        }
    }

    pub fn next_byte(&mut self) -> u8 {
        let Self {
            a,
            b,
            x,
            c1,
            c2,
            c3,
            r,
        } = self;

        for round in 0..ROUNDS {
            for step in 0..STEPS {
                let j = (round + step) % 3;
                let k = (j + 1) % 3;
                let shift = 2 * step as u32;

                x[0] = if (x[2] >> shift) & 3 > *c1 {
                    (x[0] ^ a[j]).rotate_left(r[step]).wrapping_add(a[j + 1])
                } else {
                    x[0].wrapping_add(a[j]).rotate_left(r[step]) ^ a[j + 1]
                };
                x[1] = if (x[3] >> shift) & 3 > *c2 {
                    (x[1] ^ b[k]).rotate_left(r[step + 4]).wrapping_add(b[k + 1])
                } else {
                    x[1].wrapping_add(b[k]).rotate_left(r[step + 4]) ^ b[k + 1]
                };

                if (x[0] ^ x[1]) & 3 > *c3 {
                    x[2] = x[2].wrapping_add(x[0]);
                    x[3] = x[3].wrapping_add(x[1]);
                } else {
                    x[2] ^= x[0];
                    x[3] ^= x[1];
                }

                x.swap(0, 2);
                x.swap(1, 3);
            }
        }

        x[0] as u8
    }

    /// XORs `data` in place with the next `data.len()` keystream bytes.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte ^= self.next_byte();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reproduces_golden_keystream() {
        let mut rocks = RollingRocks::new(0x0000_C577);
        let produced: Vec<u8> = (0..16).map(|_| rocks.next_byte()).collect();
        assert_eq!(produced, GOLDEN_C577);
    }

    #[test]
    fn second_golden_seed() {
        let mut rocks = RollingRocks::new(0xDEAD_BEEF);
        let produced: Vec<u8> = (0..16).map(|_| rocks.next_byte()).collect();
        assert_eq!(produced, GOLDEN_DEADBEEF);
    }

    #[test]
    fn derived_parameters_stay_in_range() {
        for seed in [0u32, 1, 0x2008, 0xFFFF_FFFF] {
            let rocks = RollingRocks::new(seed);
            assert!(rocks.c1 < 3 && rocks.c2 < 3 && rocks.c3 < 3);
            assert!(rocks.r.iter().all(|&rot| (1..=31).contains(&rot)));
        }
    }

    #[test]
    fn apply_is_an_involution_for_a_fresh_stream() {
        let plain = b"rolling rocks keystream".to_vec();
        let mut data = plain.clone();
        RollingRocks::new(42).apply(&mut data);
        assert_ne!(data, plain);
        RollingRocks::new(42).apply(&mut data);
        assert_eq!(data, plain);
    }

    const GOLDEN_C577: [u8; 16] = [
        53, 44, 62, 26, 121, 185, 158, 219, 202, 21, 205, 227, 221, 114, 133, 33,
    ];
    const GOLDEN_DEADBEEF: [u8; 16] = [
        189, 212, 4, 101, 212, 154, 253, 155, 236, 199, 210, 165, 83, 114, 93, 170,
    ];
}
