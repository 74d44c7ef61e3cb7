//! Linear framebuffer behind the display's memory BAR, 32 bits per pixel
//! in XRGB order, plus the `embedded-graphics` glue so text and primitives
//! can draw straight into it.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;

pub struct Framebuffer {
    base: *mut u32,
    width: usize,
    height: usize,
}

impl Framebuffer {
    /// # Safety
    ///
    /// `base` must point at a mapped framebuffer of at least
    /// `width * height` 32-bit pixels, and nothing else may write to it.
    pub unsafe fn new(base: *mut u32, width: usize, height: usize) -> Self {
        Self {
            base,
            width,
            height,
        }
    }

    /// Draws one pixel; coordinates outside the display are dropped.
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Rgb888) {
        if x >= self.width || y >= self.height {
            return;
        }
        let value = u32::from(color.r()) << 16 | u32::from(color.g()) << 8 | u32::from(color.b());
        unsafe {
            self.base.add(y * self.width + x).write_volatile(value);
        }
    }
}

impl DrawTarget for Framebuffer {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if let (Ok(x), Ok(y)) = (usize::try_from(coord.x), usize::try_from(coord.y)) {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}
