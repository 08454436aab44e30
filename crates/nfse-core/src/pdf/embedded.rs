//! Page images decoded from the scans embedded in a PDF, using lopdf.
//!
//! Scanned invoices usually carry one full-page image per page. Decoding it
//! directly avoids an external renderer; the DPI setting does not apply and
//! pages come back at the scan's native resolution.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, trace};

use super::{Rasterizer, Result};
use crate::error::RasterError;
use crate::models::config::PdfConfig;

/// Rasterizer backed by the images embedded in each page.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedImageRasterizer;

impl EmbeddedImageRasterizer {
    pub fn new() -> Self {
        Self
    }

    /// Load a document, decrypting it when it uses an empty password.
    pub fn load(path: &Path) -> Result<Document> {
        let mut doc = Document::load(path).map_err(|e| RasterError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(RasterError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        if doc.get_pages().is_empty() {
            return Err(RasterError::NoPages);
        }
        Ok(doc)
    }

    /// Largest decodable image on a page.
    pub fn page_image(doc: &Document, page: u32, page_id: ObjectId) -> Result<DynamicImage> {
        let mut best: Option<DynamicImage> = None;

        if let Some(resources) = page_resources(doc, page_id) {
            if let Ok(xobjects) = resources.get(b"XObject") {
                if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
                    for (_name, obj_ref) in xobj_dict.iter() {
                        let Ok((_, obj)) = doc.dereference(obj_ref) else {
                            continue;
                        };
                        if let Some(img) = decode_image(doc, obj) {
                            let area = img.width() as u64 * img.height() as u64;
                            let best_area = best
                                .as_ref()
                                .map(|b| b.width() as u64 * b.height() as u64)
                                .unwrap_or(0);
                            if area > best_area {
                                best = Some(img);
                            }
                        }
                    }
                }
            }
        }

        best.ok_or(RasterError::NoImage(page))
    }
}

impl Rasterizer for EmbeddedImageRasterizer {
    fn rasterize(&self, path: &Path, config: &PdfConfig) -> Result<Vec<DynamicImage>> {
        let doc = Self::load(path)?;
        let pages = doc.get_pages();
        let limit = if config.max_pages == 0 {
            pages.len()
        } else {
            config.max_pages
        };

        let mut images = Vec::with_capacity(limit.min(pages.len()));
        for (&number, &page_id) in pages.iter().take(limit) {
            let image = Self::page_image(&doc, number, page_id)?;
            trace!("Page {}: {}x{}", number, image.width(), image.height());
            images.push(if config.grayscale {
                DynamicImage::ImageLuma8(image.to_luma8())
            } else {
                image
            });
        }

        info!("Decoded {} embedded page image(s) from {}", images.len(), path.display());
        Ok(images)
    }
}

fn decode_image(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.last().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            Some(b"DCTDecode") => {
                trace!("Decoding JPEG page image");
                return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                    .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Unsupported image filter {:?}", filter_name);
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    decode_raw(&data, width, height, color_space, bits)
}

fn decode_raw(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
    bits_per_component: i64,
) -> Option<DynamicImage> {
    let pixels = width as usize * height as usize;

    match (color_space, bits_per_component) {
        (b"DeviceGray" | b"G", 8) if data.len() >= pixels => {
            GrayImage::from_raw(width, height, data[..pixels].to_vec()).map(DynamicImage::ImageLuma8)
        }
        (b"DeviceGray" | b"G", 1) => {
            // Rows are padded to whole bytes; a set bit is white.
            let row_bytes = (width as usize).div_ceil(8);
            if data.len() < row_bytes * height as usize {
                return None;
            }
            Some(DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
                let byte = data[y as usize * row_bytes + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                image::Luma([if bit == 1 { 255 } else { 0 }])
            })))
        }
        (b"DeviceRGB" | b"RGB", 8) if data.len() >= pixels * 3 => {
            RgbImage::from_raw(width, height, data[..pixels * 3].to_vec()).map(DynamicImage::ImageRgb8)
        }
        _ => {
            trace!(
                "Could not decode image: {}x{}, colorspace={:?}, bits={}, data_len={}",
                width,
                height,
                String::from_utf8_lossy(color_space),
                bits_per_component,
                data.len()
            );
            None
        }
    }
}

/// Resources dictionary of a page, following inheritance up the page tree.
fn page_resources(doc: &Document, node_id: ObjectId) -> Option<Dictionary> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
        return None;
    };

    if let Ok(resources) = dict.get(b"Resources") {
        if let Ok((_, Object::Dictionary(res_dict))) = doc.dereference(resources) {
            return Some(res_dict.clone());
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => page_resources(doc, *parent_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    /// Single-page PDF whose page draws one raw grayscale image.
    fn scanned_pdf(width: u32, height: u32) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let pixels: Vec<u8> = (0..width * height).map(|i| (i % 256) as u8).collect();
        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            pixels,
        );
        let image_id = doc.add_object(image);

        let content_id = doc.add_object(Stream::new(dictionary! {}, b"q 612 0 0 792 0 0 cm /Im0 Do Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn test_embedded_page_image_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        scanned_pdf(24, 16).save(&path).unwrap();

        let pages = EmbeddedImageRasterizer::new()
            .rasterize(&path, &PdfConfig::default())
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!((pages[0].width(), pages[0].height()), (24, 16));
    }

    #[test]
    fn test_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let result = EmbeddedImageRasterizer::new().rasterize(&path, &PdfConfig::default());
        assert!(matches!(result, Err(RasterError::Parse(_))));
    }

    #[test]
    fn test_one_bit_gray_decoded() {
        let image = decode_raw(&[0b1010_0000, 0b0101_0000], 4, 2, b"DeviceGray", 1).unwrap();
        let gray = image.to_luma8();
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        assert_eq!(gray.get_pixel(1, 0)[0], 0);
        assert_eq!(gray.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn test_short_rgb_data_rejected() {
        assert!(decode_raw(&[0u8; 5], 2, 2, b"DeviceRGB", 8).is_none());
    }
}
