use std::time::Duration;

use bytemuck::{Pod, Zeroable};

/// Per-frame uniform block at set 0, binding 0.
///
/// std140 layout, 32 bytes:
/// `vec3 iResolution; float iTime; vec4 iMouse;`
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub i_resolution: [f32; 3],
    pub i_time: f32,
    pub i_mouse: [f32; 4],
}

impl FrameUniforms {
    pub fn new(width: u32, height: u32, elapsed: Duration) -> Self {
        Self {
            i_resolution: [width as f32, height as f32, 1.0],
            i_time: elapsed.as_secs_f32(),
            // No pointer device is wired up.
            i_mouse: [0.0; 4],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn matches_std140_block_layout() {
        assert_eq!(size_of::<FrameUniforms>(), 32);
        assert_eq!(offset_of!(FrameUniforms, i_time), 12);
        assert_eq!(offset_of!(FrameUniforms, i_mouse), 16);
        assert!(align_of::<FrameUniforms>() <= 16);
    }

    #[test]
    fn fills_resolution_and_time() {
        let uniforms = FrameUniforms::new(1920, 1080, Duration::from_millis(1500));
        assert_eq!(uniforms.i_resolution, [1920.0, 1080.0, 1.0]);
        assert!((uniforms.i_time - 1.5).abs() < f32::EPSILON);
        assert_eq!(uniforms.i_mouse, [0.0; 4]);

        let bytes = uniforms.as_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[8..12], &1.0f32.to_ne_bytes());
    }
}
