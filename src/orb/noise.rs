//! Seeded 3D simplex noise.
//!
//! Output lies in roughly [-1, 1]. The permutation table is shuffled once
//! from the seed, so the same seed always yields the same field.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const GRAD3: [[f64; 3]; 12] = [
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [-1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, -1.0],
    [0.0, -1.0, -1.0],
];

const F3: f64 = 1.0 / 3.0;
const G3: f64 = 1.0 / 6.0;

#[derive(Clone)]
pub struct Simplex3 {
    seed: u64,
    perm: [u8; 512],
}

impl std::fmt::Debug for Simplex3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simplex3").field("seed", &self.seed).finish()
    }
}

impl Simplex3 {
    pub fn new(seed: u64) -> Self {
        let mut table: Vec<u8> = (0..=255).collect();
        table.shuffle(&mut StdRng::seed_from_u64(seed));
        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = table[i & 255];
        }
        Self { seed, perm }
    }

    /// Fresh random seed.
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn sample(&self, x: f64, y: f64, z: f64) -> f64 {
        let s = (x + y + z) * F3;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let k = (z + s).floor();
        let t = (i + j + k) * G3;
        let x0 = x - (i - t);
        let y0 = y - (j - t);
        let z0 = z - (k - t);

        // Which simplex of the skewed cube we are in.
        let (i1, j1, k1, i2, j2, k2) = if x0 >= y0 {
            if y0 >= z0 {
                (1, 0, 0, 1, 1, 0)
            } else if x0 >= z0 {
                (1, 0, 0, 1, 0, 1)
            } else {
                (0, 0, 1, 1, 0, 1)
            }
        } else if y0 < z0 {
            (0, 0, 1, 0, 1, 1)
        } else if x0 < z0 {
            (0, 1, 0, 0, 1, 1)
        } else {
            (0, 1, 0, 1, 1, 0)
        };

        let x1 = x0 - f64::from(i1) + G3;
        let y1 = y0 - f64::from(j1) + G3;
        let z1 = z0 - f64::from(k1) + G3;
        let x2 = x0 - f64::from(i2) + 2.0 * G3;
        let y2 = y0 - f64::from(j2) + 2.0 * G3;
        let z2 = z0 - f64::from(k2) + 2.0 * G3;
        let x3 = x0 - 1.0 + 3.0 * G3;
        let y3 = y0 - 1.0 + 3.0 * G3;
        let z3 = z0 - 1.0 + 3.0 * G3;

        let ii = (i as i64 & 255) as usize;
        let jj = (j as i64 & 255) as usize;
        let kk = (k as i64 & 255) as usize;
        let gi0 = self.hash(ii, jj, kk);
        let gi1 = self.hash(ii + i1 as usize, jj + j1 as usize, kk + k1 as usize);
        let gi2 = self.hash(ii + i2 as usize, jj + j2 as usize, kk + k2 as usize);
        let gi3 = self.hash(ii + 1, jj + 1, kk + 1);

        let n0 = corner(gi0, x0, y0, z0);
        let n1 = corner(gi1, x1, y1, z1);
        let n2 = corner(gi2, x2, y2, z2);
        let n3 = corner(gi3, x3, y3, z3);
        32.0 * (n0 + n1 + n2 + n3)
    }

    fn hash(&self, i: usize, j: usize, k: usize) -> usize {
        let p = &self.perm;
        usize::from(p[i + usize::from(p[j + usize::from(p[k])])]) % 12
    }
}

fn corner(gradient: usize, x: f64, y: f64, z: f64) -> f64 {
    let t = 0.6 - x * x - y * y - z * z;
    if t < 0.0 {
        return 0.0;
    }
    let g = GRAD3[gradient];
    let t2 = t * t;
    t2 * t2 * (g[0] * x + g[1] * y + g[2] * z)
}
