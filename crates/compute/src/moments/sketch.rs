//! AMS sign sketch of the betweenness counts.
//!
//! Let `C_p[a][b]` be the number of projections in which `a` precedes `p`
//! and `b` follows it. With independent Rademacher vectors `sl`, `sr` the
//! bilinear form `slᵀ·C_p·sr` is built in `O(n)` per projection from prefix
//! sums of `sl` and suffix sums of `sr`, without materializing `C_p`.
//!
//! A pass contributes the accumulated `Σ amsl·amsr` itself
//! ([`SketchMode::Raw`], the default) or its square ([`SketchMode::Squared`]),
//! whose expectation is `Σ_ab C_p[a][b]²`.
//!
//! The signs must stay fixed across all projections of one pass; drawing
//! new ones per projection would break the bilinear form.

use anglevar_core::{AngleVarError, Result, SketchMode};
use rand::Rng;
use rayon::prelude::*;

use super::check_projections;
use crate::projection::Projection;

/// A vector of `±1` values, one per point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignVector(Vec<i8>);

impl SignVector {
    /// Draw `n` independent fair signs.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Self {
        Self((0..n).map(|_| if rng.gen::<bool>() { 1 } else { -1 }).collect())
    }

    /// Wrap explicit signs. Every entry must be `1` or `-1`.
    pub fn from_signs(signs: Vec<i8>) -> Result<Self> {
        if let Some(pos) = signs.iter().position(|&s| s != 1 && s != -1) {
            return Err(AngleVarError::invalid(format!(
                "sign vector entry {pos} is {}, expected +1 or -1",
                signs[pos]
            )));
        }
        Ok(Self(signs))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.0
    }

    /// Signs reindexed so that entry `i` is entry `order[i]` of `self`.
    pub fn reordered(&self, order: &[usize]) -> Self {
        Self(order.iter().map(|&i| self.0[i]).collect())
    }

    #[inline]
    fn get(&self, point: usize) -> i64 {
        self.0[point] as i64
    }
}

/// The `(sl, sr)` pair used by one sketch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignPair {
    pub left: SignVector,
    pub right: SignVector,
}

impl SignPair {
    pub fn new(left: SignVector, right: SignVector) -> Result<Self> {
        if left.len() != right.len() {
            return Err(AngleVarError::invalid(format!(
                "sign vectors differ in length: {} vs {}",
                left.len(),
                right.len()
            )));
        }
        Ok(Self { left, right })
    }

    pub fn draw<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Self {
        let left = SignVector::draw(rng, n);
        let right = SignVector::draw(rng, n);
        Self { left, right }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Per-point `Σ amsl·amsr` for one sketch pass, plus rank-indexed scratch.
#[derive(Debug, Clone)]
pub struct SketchAccumulator {
    raw: Vec<i64>,
    left: Vec<i64>,
    right: Vec<i64>,
}

impl SketchAccumulator {
    pub fn new(n: usize) -> Self {
        Self {
            raw: vec![0; n],
            left: vec![0; n],
            right: vec![0; n],
        }
    }

    /// Fold one projection in.
    ///
    /// `left[j]` is the sum of `sl` over ranks `< j` and `right[j]` the sum of
    /// `sr` over ranks `> j`; the point at rank `j` gains `left[j]·right[j]`.
    pub fn add(&mut self, projection: &Projection, signs: &SignPair) {
        let order = projection.order();
        let n = order.len();
        if n == 0 {
            return;
        }

        self.left[0] = 0;
        for j in 1..n {
            self.left[j] = self.left[j - 1] + signs.left.get(order[j - 1]);
        }
        self.right[n - 1] = 0;
        for j in (0..n - 1).rev() {
            self.right[j] = self.right[j + 1] + signs.right.get(order[j + 1]);
        }
        for (j, &point) in order.iter().enumerate() {
            self.raw[point] += self.left[j] * self.right[j];
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.raw.iter_mut().zip(other.raw) {
            *a += b;
        }
        self
    }

    /// The accumulated bilinear form `slᵀ·C_p·sr` per point.
    pub fn raw(&self) -> &[i64] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<i64> {
        self.raw
    }

    /// The pass's contribution to the trial average.
    pub fn estimate(&self, mode: SketchMode) -> Vec<f64> {
        pass_estimate(&self.raw, mode)
    }
}

fn pass_estimate(raw: &[i64], mode: SketchMode) -> Vec<f64> {
    match mode {
        SketchMode::Raw => raw.iter().map(|&v| v as f64).collect(),
        SketchMode::Squared => raw
            .iter()
            .map(|&v| {
                let v = v as f64;
                v * v
            })
            .collect(),
    }
}

fn check_signs(signs: &SignPair, n: usize) -> Result<()> {
    if n < 2 {
        return Err(AngleVarError::invalid(format!(
            "sign sketch needs at least 2 points, got {n}"
        )));
    }
    if signs.len() != n {
        return Err(AngleVarError::invalid(format!(
            "sign vectors have length {}, expected {}",
            signs.len(),
            n
        )));
    }
    Ok(())
}

/// One sketch pass over all projections with fixed signs, unsquared.
pub fn sign_sketch_pass(
    projections: &[Projection],
    n: usize,
    signs: &SignPair,
    parallel: bool,
) -> Result<Vec<i64>> {
    check_signs(signs, n)?;
    check_projections(projections, n)?;

    let acc = if parallel {
        projections
            .par_iter()
            .fold(
                || SketchAccumulator::new(n),
                |mut acc, p| {
                    acc.add(p, signs);
                    acc
                },
            )
            .reduce(|| SketchAccumulator::new(n), SketchAccumulator::merge)
    } else {
        let mut acc = SketchAccumulator::new(n);
        for p in projections {
            acc.add(p, signs);
        }
        acc
    };

    Ok(acc.into_raw())
}

/// One sketch pass converted to its contribution under `mode`.
pub fn sketch_estimate(
    projections: &[Projection],
    n: usize,
    signs: &SignPair,
    mode: SketchMode,
    parallel: bool,
) -> Result<Vec<f64>> {
    let raw = sign_sketch_pass(projections, n, signs, parallel)?;
    Ok(pass_estimate(&raw, mode))
}

/// One sketch pass, squared: an unbiased estimate of `Σ_ab C_p[a][b]²` per point.
pub fn frobenius_estimate(
    projections: &[Projection],
    n: usize,
    signs: &SignPair,
    parallel: bool,
) -> Result<Vec<f64>> {
    sketch_estimate(projections, n, signs, SketchMode::Squared, parallel)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn order(index: usize, o: &[usize]) -> Projection {
        Projection::from_order(index, o.to_vec()).unwrap()
    }

    fn signs(left: &[i8], right: &[i8]) -> SignPair {
        SignPair::new(
            SignVector::from_signs(left.to_vec()).unwrap(),
            SignVector::from_signs(right.to_vec()).unwrap(),
        )
        .unwrap()
    }

    /// `C_p[a][b]` built by brute force from the orderings.
    fn between_matrix(projections: &[Projection], n: usize, p: usize) -> Vec<Vec<i64>> {
        let mut c = vec![vec![0i64; n]; n];
        for proj in projections {
            let rank_of_p = proj.order().iter().position(|&x| x == p).unwrap();
            for &a in &proj.order()[..rank_of_p] {
                for &b in &proj.order()[rank_of_p + 1..] {
                    c[a][b] += 1;
                }
            }
        }
        c
    }

    fn sign_patterns(n: usize) -> Vec<Vec<i8>> {
        (0..1u32 << n)
            .map(|mask| {
                (0..n)
                    .map(|i| if mask & (1 << i) != 0 { 1 } else { -1 })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn single_projection_by_hand() {
        // order 0,1,2,3 with sl = [+,-,+,+], sr = [+,+,-,+]
        let s = signs(&[1, -1, 1, 1], &[1, 1, -1, 1]);
        let raw = sign_sketch_pass(&[order(0, &[0, 1, 2, 3])], 4, &s, false).unwrap();
        // left prefix:  0, 1, 0, 1
        // right suffix: 1, 0, 1, 0
        assert_eq!(raw, vec![0, 0, 0, 0]);

        let raw = sign_sketch_pass(&[order(0, &[3, 2, 1, 0])], 4, &s, false).unwrap();
        // ranks hold points 3,2,1,0
        // left prefix:  0, sl3=1, 1+sl2=2, 2+sl1=1
        // right suffix: sr2+sr1+sr0=1, sr1+sr0=2, sr0=1, 0
        // products by rank: 0, 2, 2, 0 → points 3,2,1,0
        assert_eq!(raw, vec![0, 2, 2, 0]);
    }

    #[test]
    fn raw_equals_bilinear_form() {
        let projections = vec![
            order(0, &[0, 1, 2, 3, 4]),
            order(1, &[2, 0, 4, 1, 3]),
            order(2, &[4, 3, 2, 1, 0]),
        ];
        let s = signs(&[1, -1, -1, 1, 1], &[-1, 1, 1, 1, -1]);
        let raw = sign_sketch_pass(&projections, 5, &s, false).unwrap();
        for p in 0..5 {
            let c = between_matrix(&projections, 5, p);
            let mut expected = 0i64;
            for a in 0..5 {
                for b in 0..5 {
                    expected += s.left.as_slice()[a] as i64 * c[a][b] * s.right.as_slice()[b] as i64;
                }
            }
            assert_eq!(raw[p], expected, "point {p}");
        }
    }

    #[test]
    fn estimate_is_exactly_unbiased_over_all_signs() {
        // Averaging the squared form over every sign pattern yields Σ C².
        let n = 5;
        let projections = vec![
            order(0, &[0, 1, 2, 3, 4]),
            order(1, &[1, 3, 0, 4, 2]),
            order(2, &[3, 4, 1, 2, 0]),
            order(3, &[2, 1, 0, 4, 3]),
        ];
        let patterns = sign_patterns(n);
        let mut sums = vec![0.0; n];
        for l in &patterns {
            for r in &patterns {
                let est = frobenius_estimate(&projections, n, &signs(l, r), false).unwrap();
                for (s, e) in sums.iter_mut().zip(est) {
                    *s += e;
                }
            }
        }
        let total = (patterns.len() * patterns.len()) as f64;
        for p in 0..n {
            let c = between_matrix(&projections, n, p);
            let frob: i64 = c.iter().flatten().map(|v| v * v).sum();
            assert!(
                (sums[p] / total - frob as f64).abs() < 1e-9,
                "point {p}: {} vs {}",
                sums[p] / total,
                frob
            );
        }
    }

    #[test]
    fn raw_mode_keeps_the_sign_of_the_pass() {
        let projections = vec![order(0, &[3, 2, 1, 0]), order(1, &[0, 2, 1, 3])];
        let s = signs(&[1, -1, 1, 1], &[1, 1, -1, 1]);
        let raw = sign_sketch_pass(&projections, 4, &s, false).unwrap();
        let as_is = sketch_estimate(&projections, 4, &s, SketchMode::Raw, false).unwrap();
        let squared = sketch_estimate(&projections, 4, &s, SketchMode::Squared, false).unwrap();
        for p in 0..4 {
            assert_eq!(as_is[p], raw[p] as f64);
            assert_eq!(squared[p], (raw[p] * raw[p]) as f64);
        }

        let mut acc = SketchAccumulator::new(4);
        for p in &projections {
            acc.add(p, &s);
        }
        assert_eq!(acc.estimate(SketchMode::Raw), as_is);
        assert_eq!(acc.estimate(SketchMode::Squared), squared);
    }

    #[test]
    fn raw_estimate_is_exactly_centered_over_all_signs() {
        // E[sl[a]·sr[b]] = 0 for independent sign vectors.
        let n = 4;
        let projections = vec![order(0, &[0, 1, 2, 3]), order(1, &[2, 0, 3, 1])];
        let patterns = sign_patterns(n);
        let mut sums = vec![0i64; n];
        for l in &patterns {
            for r in &patterns {
                let raw = sign_sketch_pass(&projections, n, &signs(l, r), false).unwrap();
                for (s, v) in sums.iter_mut().zip(raw) {
                    *s += v;
                }
            }
        }
        assert_eq!(sums, vec![0; n]);
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let n = 9;
        let projections: Vec<Projection> = (0..50)
            .map(|i| {
                let mut o: Vec<usize> = (0..n).collect();
                o.rotate_left(i % n);
                if i % 3 == 0 {
                    o.swap(0, n - 1);
                }
                order(i, &o)
            })
            .collect();
        let s = SignPair::draw(&mut rng, n);
        let seq = sign_sketch_pass(&projections, n, &s, false).unwrap();
        let par = sign_sketch_pass(&projections, n, &s, true).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn drawn_signs_are_plus_minus_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let v = SignVector::draw(&mut rng, 500);
        assert!(v.as_slice().iter().all(|&s| s == 1 || s == -1));
        let plus = v.as_slice().iter().filter(|&&s| s == 1).count();
        assert!(plus > 150 && plus < 350);
    }

    #[test]
    fn zero_signs_rejected() {
        assert!(SignVector::from_signs(vec![1, 0, -1]).is_err());
        assert!(SignVector::from_signs(vec![2]).is_err());
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let s = signs(&[1, 1, 1], &[1, 1, 1]);
        assert!(sign_sketch_pass(&[order(0, &[0, 1, 2, 3])], 4, &s, false).is_err());
        let short = SignPair::new(
            SignVector::from_signs(vec![1, 1]).unwrap(),
            SignVector::from_signs(vec![1]).unwrap(),
        );
        assert!(short.is_err());
    }

    #[test]
    fn extreme_points_contribute_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let s = SignPair::draw(&mut rng, 6);
        let projections = vec![order(0, &[5, 0, 1, 2, 3, 4]), order(1, &[4, 3, 2, 1, 0, 5])];
        let raw = sign_sketch_pass(&projections, 6, &s, false).unwrap();
        assert_eq!(raw[5], 0);
    }
}
