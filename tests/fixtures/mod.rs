//! Crop fixtures for the dispatch flow tests

use std::io::Cursor;

/// A crop submission and the layout it targets
#[derive(Debug, Clone)]
pub struct CropFixture {
    pub layout_name: &'static str,
    pub payload: Vec<u8>,
    pub description: &'static str,
}

/// Layouts every test cluster is started with
pub const LAYOUTS: &[&str] = &["site-A", "site-B"];

/// Payload the stub detector rejects
pub const FAILING_PAYLOAD: &[u8] = b"fail";

/// `site-A` with a 100-byte payload of `x`
pub fn basic_crop() -> CropFixture {
    CropFixture {
        layout_name: "site-A",
        payload: vec![b'x'; 100],
        description: "100 bytes of x against site-A",
    }
}

/// A small PNG crop against `site-B`
pub fn png_crop() -> CropFixture {
    let img = image::GrayImage::from_fn(8, 4, |x, y| image::Luma([(x * y) as u8]));
    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .expect("encode png fixture");

    CropFixture {
        layout_name: "site-B",
        payload: png,
        description: "8x4 grayscale PNG against site-B",
    }
}

/// Distinct crops whose results can be told apart by byte count
pub fn numbered_crops(count: usize) -> Vec<CropFixture> {
    (1..=count)
        .map(|n| CropFixture {
            layout_name: LAYOUTS[n % LAYOUTS.len()],
            payload: vec![n as u8; n],
            description: "numbered crop",
        })
        .collect()
}
