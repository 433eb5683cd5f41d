use bytes::Bytes;
use image::{imageops, DynamicImage, ImageOutputFormat};
use std::io::Cursor;

use crate::{Error, Result};

/// Splits one image holding a `rows x cols` grid of equally sized views into
/// row-major PNG crops.
///
/// Cell size is `(dimension - padding * (count - 1)) / count`, truncated. No
/// check is made that the grid divides evenly; leftover pixels are dropped.
pub fn split_grid_image(grid: &[u8], rows: u32, cols: u32, padding: u32) -> Result<Vec<Bytes>> {
    if rows == 0 || cols == 0 {
        return Err(Error::validation("Grid rows and cols must be positive"));
    }
    let img = image::load_from_memory(grid)
        .map_err(|e| Error::validation(format!("Unreadable grid image: {}", e)))?
        .to_rgba8();
    let (w, h) = img.dimensions();
    let cell_w = w.saturating_sub(padding.saturating_mul(cols - 1)) / cols;
    let cell_h = h.saturating_sub(padding.saturating_mul(rows - 1)) / rows;
    if cell_w == 0 || cell_h == 0 {
        return Err(Error::validation(format!(
            "Grid {}x{} with padding {} does not fit a {}x{} image",
            rows, cols, padding, w, h
        )));
    }

    let mut views = Vec::with_capacity((rows * cols) as usize);
    for r in 0..rows {
        for c in 0..cols {
            let left = c * (cell_w + padding);
            let top = r * (cell_h + padding);
            let crop = imageops::crop_imm(&img, left, top, cell_w, cell_h).to_image();
            let mut buf = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(crop)
                .write_to(&mut buf, ImageOutputFormat::Png)
                .map_err(|e| Error::validation(format!("PNG encode failed: {}", e)))?;
            views.push(Bytes::from(buf.into_inner()));
        }
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_split_300x200_into_six() {
        let views = split_grid_image(&png(300, 200), 2, 3, 0).unwrap();
        assert_eq!(views.len(), 6);
        for v in &views {
            let img = image::load_from_memory(v).unwrap();
            assert_eq!((img.width(), img.height()), (100, 100));
        }
        // Row-major: the second view starts at x=100.
        let second = image::load_from_memory(&views[1]).unwrap().to_rgba8();
        assert_eq!(second.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn test_padding_shrinks_cells() {
        let views = split_grid_image(&png(320, 210), 2, 3, 10).unwrap();
        let img = image::load_from_memory(&views[5]).unwrap();
        assert_eq!((img.width(), img.height()), (100, 100));
    }

    #[test]
    fn test_uneven_grid_truncates() {
        let views = split_grid_image(&png(301, 201), 2, 3, 0).unwrap();
        let img = image::load_from_memory(&views[0]).unwrap();
        assert_eq!((img.width(), img.height()), (100, 100));
    }

    #[test]
    fn test_zero_rows_rejected() {
        assert!(split_grid_image(&png(10, 10), 0, 3, 0).is_err());
        assert!(split_grid_image(b"not an image", 1, 1, 0).is_err());
    }
}
