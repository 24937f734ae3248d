//! Framebuffer Backend - Linux `/dev/fb*` devices
//!
//! Queries the device geometry and pixel layout through the fbdev ioctls and
//! writes dirty rows straight into the device with positioned writes. The
//! device resolution is fixed, so it is reported to the toolkit as a resize
//! on the first pump regardless of the configured window size.

use super::*;
use crate::config::Settings;
use crate::toolkit::{Frame, Toolkit};
use byteorder::{ByteOrder, NativeEndian};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;

/// Environment variable selecting the framebuffer device
pub const ENV_DEVICE: &str = "LV_LINUX_FBDEV_DEVICE";
pub const DEFAULT_DEVICE: &str = "/dev/fb0";

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FbBitField {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbVarScreenInfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitField,
    green: FbBitField,
    blue: FbBitField,
    transp: FbBitField,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbFixScreenInfo {
    id: [u8; 16],
    smem_start: std::ffi::c_ulong,
    smem_len: u32,
    fb_type: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: std::ffi::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

nix::ioctl_read_bad!(fbioget_vscreeninfo, 0x4600, FbVarScreenInfo);
nix::ioctl_read_bad!(fbioget_fscreeninfo, 0x4602, FbFixScreenInfo);

/// How one pixel is laid out in device memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub bits_per_pixel: u32,
    pub red: FbBitField,
    pub green: FbBitField,
    pub blue: FbBitField,
}

impl PixelLayout {
    /// 16-bit RGB565
    pub const RGB565: PixelLayout = PixelLayout {
        bits_per_pixel: 16,
        red: FbBitField {
            offset: 11,
            length: 5,
            msb_right: 0,
        },
        green: FbBitField {
            offset: 5,
            length: 6,
            msb_right: 0,
        },
        blue: FbBitField {
            offset: 0,
            length: 5,
            msb_right: 0,
        },
    };

    /// 32-bit XRGB8888
    pub const XRGB8888: PixelLayout = PixelLayout {
        bits_per_pixel: 32,
        red: FbBitField {
            offset: 16,
            length: 8,
            msb_right: 0,
        },
        green: FbBitField {
            offset: 8,
            length: 8,
            msb_right: 0,
        },
        blue: FbBitField {
            offset: 0,
            length: 8,
            msb_right: 0,
        },
    };

    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel / 8) as usize
    }

    fn channel(value: u32, field: FbBitField) -> u32 {
        if field.length == 0 || field.length > 8 {
            return 0;
        }
        (value >> (8 - field.length)) << field.offset
    }

    /// Convert one XRGB8888 pixel to the device format
    pub fn convert(&self, xrgb: u32) -> u32 {
        let r = (xrgb >> 16) & 0xff;
        let g = (xrgb >> 8) & 0xff;
        let b = xrgb & 0xff;
        Self::channel(r, self.red) | Self::channel(g, self.green) | Self::channel(b, self.blue)
    }

    /// Pack a run of XRGB8888 pixels into `out` (resized as needed)
    pub fn pack(&self, src: &[u32], out: &mut Vec<u8>) {
        let bpp = self.bytes_per_pixel();
        out.resize(src.len() * bpp, 0);
        for (pixel, dst) in src.iter().zip(out.chunks_exact_mut(bpp)) {
            let value = self.convert(*pixel);
            match bpp {
                2 => NativeEndian::write_u16(dst, value as u16),
                3 => NativeEndian::write_u24(dst, value),
                _ => NativeEndian::write_u32(dst, value),
            }
        }
    }
}

pub struct FbdevBackend {
    path: String,
    device: Option<File>,
    width: u32,
    height: u32,
    line_length: u32,
    xoffset: u32,
    yoffset: u32,
    layout: PixelLayout,
    row: Vec<u8>,
    pending: Vec<BackendEvent>,
}

impl FbdevBackend {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            device: None,
            width: 0,
            height: 0,
            line_length: 0,
            xoffset: 0,
            yoffset: 0,
            layout: PixelLayout::XRGB8888,
            row: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn from_env() -> Self {
        let path = std::env::var(ENV_DEVICE).unwrap_or_else(|_| DEFAULT_DEVICE.to_string());
        Self::new(&path)
    }
}

impl Backend for FbdevBackend {
    fn init(&mut self, settings: &Settings) -> BackendResult<()> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| format!("Failed to open framebuffer device {}: {}", self.path, e))?;
        let fd = device.as_raw_fd();

        let mut var_info = FbVarScreenInfo::default();
        // SAFETY: var_info matches struct fb_var_screeninfo
        unsafe { fbioget_vscreeninfo(fd, &mut var_info) }
            .map_err(|e| format!("FBIOGET_VSCREENINFO on {}: {}", self.path, e))?;

        let mut fix_info = FbFixScreenInfo::default();
        // SAFETY: fix_info matches struct fb_fix_screeninfo
        unsafe { fbioget_fscreeninfo(fd, &mut fix_info) }
            .map_err(|e| format!("FBIOGET_FSCREENINFO on {}: {}", self.path, e))?;

        if !matches!(var_info.bits_per_pixel, 16 | 24 | 32) {
            return Err(format!(
                "Unsupported framebuffer depth: {} bpp",
                var_info.bits_per_pixel
            )
            .into());
        }

        self.width = var_info.xres;
        self.height = var_info.yres;
        self.line_length = fix_info.line_length;
        self.xoffset = var_info.xoffset;
        self.yoffset = var_info.yoffset;
        self.layout = PixelLayout {
            bits_per_pixel: var_info.bits_per_pixel,
            red: var_info.red,
            green: var_info.green,
            blue: var_info.blue,
        };
        self.device = Some(device);

        if settings.fullscreen() || settings.maximize() {
            log::debug!("fbdev is always full screen, window flags ignored");
        }
        log::info!(
            "Framebuffer {}: {}x{} {} bpp, stride {}",
            self.path,
            self.width,
            self.height,
            var_info.bits_per_pixel,
            self.line_length
        );

        self.pending.push(BackendEvent::Resize {
            width: self.width,
            height: self.height,
        });
        Ok(())
    }

    fn deinit(&mut self) -> BackendResult<()> {
        self.device = None;
        self.pending.clear();
        log::debug!("Closed framebuffer {}", self.path);
        Ok(())
    }

    fn pump(&mut self, toolkit: &mut dyn Toolkit) -> BackendResult<PumpStatus> {
        Ok(deliver(self.pending.drain(..), toolkit))
    }

    fn present(&mut self, frame: &Frame<'_>) -> BackendResult<()> {
        let device = self.device.as_ref().ok_or("Backend not initialized")?;
        let dirty = frame
            .dirty
            .clamp_to(frame.width.min(self.width), frame.height.min(self.height));
        let bpp = self.layout.bytes_per_pixel() as u64;

        for y in dirty.y..dirty.bottom() {
            let row = frame.row(y);
            let span = &row[dirty.x as usize..dirty.right() as usize];
            self.layout.pack(span, &mut self.row);

            let offset = u64::from(y + self.yoffset) * u64::from(self.line_length)
                + u64::from(dirty.x + self.xoffset) * bpp;
            device
                .write_all_at(&self.row, offset)
                .map_err(|e| format!("Framebuffer write failed: {}", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb565_conversion() {
        let layout = PixelLayout::RGB565;
        assert_eq!(layout.convert(0x00ff_0000), 0xf800);
        assert_eq!(layout.convert(0x0000_ff00), 0x07e0);
        assert_eq!(layout.convert(0x0000_00ff), 0x001f);
        assert_eq!(layout.convert(0x00ff_ffff), 0xffff);
    }

    #[test]
    fn test_xrgb_passthrough() {
        let layout = PixelLayout::XRGB8888;
        assert_eq!(layout.convert(0x0012_3456), 0x0012_3456);
    }

    #[test]
    fn test_pack_writes_device_bytes() {
        let mut out = Vec::new();
        PixelLayout::RGB565.pack(&[0x00ff_0000, 0x0000_00ff], &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(NativeEndian::read_u16(&out[0..2]), 0xf800);
        assert_eq!(NativeEndian::read_u16(&out[2..4]), 0x001f);

        PixelLayout::XRGB8888.pack(&[0x0011_2233], &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(NativeEndian::read_u32(&out), 0x0011_2233);
    }

    #[test]
    fn test_missing_device_fails_init() {
        let mut backend = FbdevBackend::new("/nonexistent/fb9");
        let settings = Settings::default();
        let err = backend.init(&settings).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fb9"));
    }
}
