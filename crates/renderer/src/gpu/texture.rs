use image::{Rgba, RgbaImage};
use wgpu::util::{DeviceExt, TextureDataOrder};

pub const TEXTURE_SIZE: u32 = 256;
const CELL_SIZE: u32 = 32;
const LIGHT: Rgba<u8> = Rgba([200, 180, 160, 255]);
const DARK: Rgba<u8> = Rgba([50, 60, 80, 255]);

/// The checkerboard every program samples at binding 1/2.
pub(crate) struct StaticTexture {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

pub fn checkerboard() -> RgbaImage {
    RgbaImage::from_fn(TEXTURE_SIZE, TEXTURE_SIZE, |x, y| {
        if (x / CELL_SIZE + y / CELL_SIZE) % 2 == 0 {
            LIGHT
        } else {
            DARK
        }
    })
}

pub(crate) fn create_static_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> StaticTexture {
    let image = checkerboard();
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("static texture"),
            size: wgpu::Extent3d {
                width: image.width(),
                height: image.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        image.as_raw(),
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("static texture sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    StaticTexture {
        _texture: texture,
        view,
        sampler,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_every_cell() {
        let image = checkerboard();
        assert_eq!(image.dimensions(), (TEXTURE_SIZE, TEXTURE_SIZE));
        assert_eq!(*image.get_pixel(0, 0), LIGHT);
        assert_eq!(*image.get_pixel(31, 31), LIGHT);
        assert_eq!(*image.get_pixel(32, 0), DARK);
        assert_eq!(*image.get_pixel(0, 32), DARK);
        assert_eq!(*image.get_pixel(32, 32), LIGHT);
        assert_eq!(*image.get_pixel(255, 255), LIGHT);
        assert_eq!(image.as_raw().len(), (TEXTURE_SIZE * TEXTURE_SIZE * 4) as usize);
    }
}
