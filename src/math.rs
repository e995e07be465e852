use crate::my_types::*;

/// 2x3 rotation + translation matrix
/// [cos, -sin, dx]
/// [sin,  cos, dy]
pub fn rigid_transform(dx: f64, dy: f64, theta: f64) -> Matrix23d {
    let (sin, cos) = theta.sin_cos();
    Matrix23d::new(cos, -sin, dx, sin, cos, dy)
}

/// Split a (partial) affine transform into translation and rotation angle.
/// Any scale or shear is ignored.
pub fn decompose(m: &Matrix23d) -> (f64, f64, f64) {
    (m[(0, 2)], m[(1, 2)], m[(1, 0)].atan2(m[(0, 0)]))
}

/// Inverse of an affine transform, None when the linear part is singular
pub fn invert_affine(m: &Matrix23d) -> Option<Matrix23d> {
    let linear = m.fixed_view::<2, 2>(0, 0).into_owned();
    let inv = linear.try_inverse()?;
    let t = -(inv * m.fixed_view::<2, 1>(0, 2));
    Some(Matrix23d::new(
        inv[(0, 0)],
        inv[(0, 1)],
        t[0],
        inv[(1, 0)],
        inv[(1, 1)],
        t[1],
    ))
}

#[inline(always)]
pub fn transform_point(m: &Matrix23d, p: &Point2d) -> Point2d {
    Point2d::new(
        m[(0, 0)] * p.x + m[(0, 1)] * p.y + m[(0, 2)],
        m[(1, 0)] * p.x + m[(1, 1)] * p.y + m[(1, 2)],
    )
}

/// Clamp into [-bound, bound]
#[inline]
pub fn clamp_symmetric(value: f64, bound: f64) -> f64 {
    value.clamp(-bound, bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_decompose_rigid() {
        let m = rigid_transform(4.0, -2.5, 0.3);
        let (dx, dy, theta) = decompose(&m);
        assert_approx_eq!(dx, 4.0);
        assert_approx_eq!(dy, -2.5);
        assert_approx_eq!(theta, 0.3);
    }

    #[test]
    fn test_invert_affine() {
        let m = rigid_transform(10.0, 5.0, -0.7);
        let inv = invert_affine(&m).unwrap();
        let p = Point2d::new(12.0, -3.0);
        let back = transform_point(&inv, &transform_point(&m, &p));
        assert!((back - p).norm() < 1e-9);

        let singular = Matrix23d::new(1., 2., 0., 2., 4., 0.);
        assert!(invert_affine(&singular).is_none());
    }

    #[test]
    fn test_clamp_symmetric() {
        assert_eq!(clamp_symmetric(1e9, 30.), 30.);
        assert_eq!(clamp_symmetric(-1e9, 30.), -30.);
        assert_eq!(clamp_symmetric(12., 30.), 12.);
        assert_eq!(clamp_symmetric(12., 0.), 0.);
    }
}
