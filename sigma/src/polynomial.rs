//! Polynomials over the scalar field, used to share a threshold node's
//! challenge among its children.

use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};

/// Polynomial `c0 + c1·x + … + cd·x^d`, lowest coefficient first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    pub fn from_coefficients(coefficients: Vec<Scalar>) -> Self {
        Polynomial { coefficients }
    }

    /// Random polynomial of the given degree with `p(0) = constant`.
    pub fn random_with_constant<R: RngCore + CryptoRng>(
        constant: Scalar,
        degree: usize,
        rng: &mut R,
    ) -> Self {
        let coefficients = core::iter::once(constant)
            .chain((0..degree).map(|_| Scalar::random(rng)))
            .collect();
        Polynomial { coefficients }
    }

    /// Lagrange interpolation through the given points. Returns `None` if two
    /// points share an x coordinate.
    pub fn interpolate(points: &[(Scalar, Scalar)]) -> Option<Self> {
        if points.is_empty() {
            return Some(Polynomial::from_coefficients(Vec::new()));
        }

        // N(x) = Π (x - x_i)
        let mut product = vec![Scalar::one()];
        for (xi, _) in points {
            product = multiply_by_root(&product, xi);
        }

        let mut result = vec![Scalar::zero(); points.len()];
        for (i, (xi, yi)) in points.iter().enumerate() {
            // N(x) / (x - x_i), then scaled to be 1 at x_i and 0 at other x_j
            let basis = divide_by_root(&product, xi);
            let denominator: Scalar = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, (xj, _))| xi - xj)
                .product();
            if denominator == Scalar::zero() {
                return None;
            }
            let scale = yi * denominator.invert();
            for (acc, c) in result.iter_mut().zip(basis.iter()) {
                *acc += scale * c;
            }
        }

        Some(Polynomial::from_coefficients(result))
    }

    pub fn evaluate(&self, x: &Scalar) -> Scalar {
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::zero(), |acc, c| acc * x + c)
    }

    pub fn coefficients(&self) -> &[Scalar] {
        &self.coefficients
    }

    /// Value at zero.
    pub fn constant(&self) -> Scalar {
        self.coefficients.first().copied().unwrap_or_else(Scalar::zero)
    }

    /// Number of coefficients minus one; the zero polynomial reports zero.
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }
}

/// Evaluation point of the `i`-th child of a threshold node (0-based).
pub(crate) fn child_point(i: usize) -> Scalar {
    Scalar::from((i as u64) + 1)
}

// p(x) * (x - root)
fn multiply_by_root(p: &[Scalar], root: &Scalar) -> Vec<Scalar> {
    let mut out = vec![Scalar::zero(); p.len() + 1];
    for (i, c) in p.iter().enumerate() {
        out[i + 1] += c;
        out[i] -= root * c;
    }
    out
}

// p(x) / (x - root), assuming the division is exact
fn divide_by_root(p: &[Scalar], root: &Scalar) -> Vec<Scalar> {
    let n = p.len() - 1;
    let mut out = vec![Scalar::zero(); n];
    let mut carry = Scalar::zero();
    for i in (0..n).rev() {
        carry = p[i + 1] + carry * root;
        out[i] = carry;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn s(n: u64) -> Scalar {
        Scalar::from(n)
    }

    #[test]
    fn evaluate_uses_horner() {
        // 3 + 2x + x^2
        let p = Polynomial::from_coefficients(vec![s(3), s(2), s(1)]);
        assert_eq!(p.evaluate(&s(0)), s(3));
        assert_eq!(p.evaluate(&s(2)), s(11));
        assert_eq!(p.degree(), 2);
        assert_eq!(p.constant(), s(3));
    }

    #[test]
    fn interpolation_recovers_random_polynomial() {
        let mut rng = thread_rng();
        for degree in 0..8 {
            let p = Polynomial::random_with_constant(Scalar::random(&mut rng), degree, &mut rng);
            let points: Vec<_> = (0..=degree)
                .map(|i| {
                    let x = child_point(i);
                    (x, p.evaluate(&x))
                })
                .collect();
            let q = Polynomial::interpolate(&points).unwrap();
            assert_eq!(q, p);
        }
    }

    #[test]
    fn interpolation_through_zero_fixes_constant() {
        let mut rng = thread_rng();
        let e = Scalar::random(&mut rng);
        let points = vec![
            (Scalar::zero(), e),
            (child_point(1), Scalar::random(&mut rng)),
            (child_point(4), Scalar::random(&mut rng)),
        ];
        let p = Polynomial::interpolate(&points).unwrap();
        assert_eq!(p.constant(), e);
        for (x, y) in &points {
            assert_eq!(p.evaluate(x), *y);
        }
    }

    #[test]
    fn duplicate_points_are_rejected() {
        let points = vec![(s(1), s(2)), (s(1), s(3))];
        assert!(Polynomial::interpolate(&points).is_none());
    }
}
