//! Column-major 4x4 matrices in the layout shader uniforms expect.

use std::ops::Mul;

use crate::foundation::error::{LayercastError, LayercastResult};

/// 16 contiguous floats, column-major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4(pub [f32; 16]);

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// The identity matrix.
    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Raw column-major storage.
    pub fn as_array(&self) -> &[f32; 16] {
        &self.0
    }

    /// Element at `row`, `col`.
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.0[col * 4 + row]
    }

    /// Orthographic projection mapping the given box onto the unit cube.
    ///
    /// Equal `left`/`right`, `bottom`/`top` or `near`/`far` describe a degenerate
    /// frustum and are rejected.
    pub fn orthographic(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> LayercastResult<Self> {
        if left == right || bottom == top || near == far {
            tracing::error!(left, right, bottom, top, near, far, "degenerate orthographic frustum");
            return Err(LayercastError::config(format!(
                "degenerate orthographic frustum: left={left} right={right} bottom={bottom} top={top} near={near} far={far}"
            )));
        }

        let r_width = 1.0 / (right - left);
        let r_height = 1.0 / (top - bottom);
        let r_depth = 1.0 / (far - near);

        let mut m = [0.0f32; 16];
        m[0] = 2.0 * r_width;
        m[5] = 2.0 * r_height;
        m[10] = -2.0 * r_depth;
        m[12] = -(right + left) * r_width;
        m[13] = -(top + bottom) * r_height;
        m[14] = -(far + near) * r_depth;
        m[15] = 1.0;
        Ok(Self(m))
    }

    /// View matrix looking from `eye` towards `center` with `up` as the vertical hint.
    pub fn look_at(eye: [f32; 3], center: [f32; 3], up: [f32; 3]) -> Self {
        let f = normalize(sub(center, eye));
        let s = normalize(cross(f, up));
        let u = cross(s, f);

        let rm = Self([
            s[0], u[0], -f[0], 0.0, //
            s[1], u[1], -f[1], 0.0, //
            s[2], u[2], -f[2], 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        rm.translate(-eye[0], -eye[1], -eye[2])
    }

    /// `a * b`: applies `b` first, then `a`.
    pub fn multiply(a: &Self, b: &Self) -> Self {
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut acc = 0.0;
                for k in 0..4 {
                    acc += a.0[k * 4 + row] * b.0[col * 4 + k];
                }
                out[col * 4 + row] = acc;
            }
        }
        Self(out)
    }

    /// Rotation of `angle_deg` degrees around `axis`.
    ///
    /// Unit x/y/z axes take an exact path; other axes are normalized first and a
    /// zero axis yields the identity.
    pub fn rotation(angle_deg: f32, axis: [f32; 3]) -> Self {
        let a = angle_deg.to_radians();
        let (s, c) = a.sin_cos();
        let [x, y, z] = axis;
        let mut rm = Self::IDENTITY.0;

        if x == 1.0 && y == 0.0 && z == 0.0 {
            rm[5] = c;
            rm[10] = c;
            rm[6] = s;
            rm[9] = -s;
        } else if x == 0.0 && y == 1.0 && z == 0.0 {
            rm[0] = c;
            rm[10] = c;
            rm[8] = s;
            rm[2] = -s;
        } else if x == 0.0 && y == 0.0 && z == 1.0 {
            rm[0] = c;
            rm[5] = c;
            rm[1] = s;
            rm[4] = -s;
        } else {
            let len = length(axis);
            if len == 0.0 {
                return Self::IDENTITY;
            }
            let (x, y, z) = (x / len, y / len, z / len);
            let nc = 1.0 - c;
            let (xy, yz, zx) = (x * y, y * z, z * x);
            let (xs, ys, zs) = (x * s, y * s, z * s);
            rm[0] = x * x * nc + c;
            rm[4] = xy * nc - zs;
            rm[8] = zx * nc + ys;
            rm[1] = xy * nc + zs;
            rm[5] = y * y * nc + c;
            rm[9] = yz * nc - xs;
            rm[2] = zx * nc - ys;
            rm[6] = yz * nc + xs;
            rm[10] = z * z * nc + c;
        }
        Self(rm)
    }

    /// `self * rotation(angle_deg, axis)`.
    pub fn rotate(&self, angle_deg: f32, axis: [f32; 3]) -> Self {
        Self::multiply(self, &Self::rotation(angle_deg, axis))
    }

    /// `self * translation(dx, dy, dz)`.
    pub fn translate(&self, dx: f32, dy: f32, dz: f32) -> Self {
        let mut m = self.0;
        for i in 0..4 {
            m[12 + i] += m[i] * dx + m[4 + i] * dy + m[8 + i] * dz;
        }
        Self(m)
    }

    /// Apply to a homogeneous point.
    pub fn transform_point(&self, p: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        for (row, slot) in out.iter_mut().enumerate() {
            *slot = (0..4).map(|k| self.0[k * 4 + row] * p[k]).sum();
        }
        out
    }

    /// Component-wise comparison within `eps`.
    pub fn approx_eq(&self, other: &Self, eps: f32) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl Mul for Matrix4 {
    type Output = Matrix4;

    fn mul(self, rhs: Matrix4) -> Matrix4 {
        Matrix4::multiply(&self, &rhs)
    }
}

/// Map a pixel position (origin top-left, y down) to normalized coordinates
/// spanning `[-x_boundary, x_boundary]` by `[-y_boundary, y_boundary]` (y up).
pub fn pixel_to_normalized(
    px: f32,
    py: f32,
    surface_w: f32,
    surface_h: f32,
    x_boundary: f32,
    y_boundary: f32,
) -> (f32, f32) {
    (
        pixel_x_to_normalized(px, surface_w, x_boundary),
        pixel_y_to_normalized(py, surface_h, y_boundary),
    )
}

/// Horizontal half of [`pixel_to_normalized`].
pub fn pixel_x_to_normalized(px: f32, surface_w: f32, x_boundary: f32) -> f32 {
    (ratio(px, surface_w) * 2.0 - 1.0) * x_boundary
}

/// Vertical half of [`pixel_to_normalized`].
pub fn pixel_y_to_normalized(py: f32, surface_h: f32, y_boundary: f32) -> f32 {
    (1.0 - ratio(py, surface_h) * 2.0) * y_boundary
}

fn ratio(p: f32, extent: f32) -> f32 {
    if extent > 0.0 { p / extent } else { 0.0 }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn length(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = length(v);
    if len == 0.0 {
        return v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

#[cfg(test)]
#[path = "../../tests/unit/transform/matrix.rs"]
mod tests;
