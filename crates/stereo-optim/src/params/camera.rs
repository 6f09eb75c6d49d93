use stereo_core::{BrownConrady5, FxFyCxCySkew, PinholeCamera, Real};

/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`; skew is held at zero.
pub const CAMERA_BLOCK_LEN: usize = 9;

/// Offsets of the individual coefficients inside a camera block.
#[derive(Debug, Clone, Copy)]
pub struct CameraBlock;

impl CameraBlock {
    pub const FX: usize = 0;
    pub const FY: usize = 1;
    pub const CX: usize = 2;
    pub const CY: usize = 3;
    pub const K1: usize = 4;
    pub const K2: usize = 5;
    pub const P1: usize = 6;
    pub const P2: usize = 7;
    pub const K3: usize = 8;

    pub fn pack(camera: &PinholeCamera) -> [Real; CAMERA_BLOCK_LEN] {
        let k = &camera.k;
        let d = &camera.dist;
        [k.fx, k.fy, k.cx, k.cy, d.k1, d.k2, d.p1, d.p2, d.k3]
    }

    pub fn unpack(block: &[Real]) -> PinholeCamera {
        PinholeCamera::new(
            FxFyCxCySkew {
                fx: block[Self::FX],
                fy: block[Self::FY],
                cx: block[Self::CX],
                cy: block[Self::CY],
                skew: 0.0,
            },
            BrownConrady5 {
                k1: block[Self::K1],
                k2: block[Self::K2],
                k3: block[Self::K3],
                p1: block[Self::P1],
                p2: block[Self::P2],
                iters: 0,
            },
        )
    }

    /// Block offsets the solver leaves untouched under the given flags.
    pub fn fixed_offsets(fix_k3: bool, fix_tangential: bool) -> Vec<usize> {
        let mut fixed = Vec::new();
        if fix_tangential {
            fixed.extend([Self::P1, Self::P2]);
        }
        if fix_k3 {
            fixed.push(Self::K3);
        }
        fixed
    }
}
