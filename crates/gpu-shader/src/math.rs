use bytemuck::{Pod, Zeroable};

/// Order in which a row-major 4×4 matrix is written into a uniform block so the GPU reads it
/// column-major.
pub const INDICES_BY_COLUMNS_4X4: [usize; 16] = [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];

/// Row-major 4×4 float matrix.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Mat4(pub [[f32; 4]; 4]);

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    pub fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Mat4(rows)
    }

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.0[0][3] = x;
        m.0[1][3] = y;
        m.0[2][3] = z;
        m
    }

    /// Cell at row-major linear `index` (`row * 4 + column`).
    pub fn get_at_index(&self, index: usize) -> f32 {
        self.0[index / 4][index % 4]
    }

    pub fn set_at_index(&mut self, index: usize, value: f32) {
        self.0[index / 4][index % 4] = value;
    }

    pub fn transpose(&self) -> Self {
        let mut out = Mat4::zeroed();
        for r in 0..4 {
            for c in 0..4 {
                out.0[c][r] = self.0[r][c];
            }
        }
        out
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}
