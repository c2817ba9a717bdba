use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bincode::Options;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::{Document, Layer, LayerKind, PixelSurface};
use crate::compositor::BlendMode;
use crate::error::{EditorError, EditorResult};

// ============================================================================
// PCORE PROJECT FILE FORMAT
// ============================================================================

pub const PROJECT_MIMETYPE: &str = "application/x-paintcore";
pub const FORMAT_VERSION: &str = "1.0";
pub const PROJECT_EXTENSION: &str = "pcore";

/// Maximum supported canvas dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted project files.
pub const MAX_CANVAS_DIM: u32 = 32_768;
/// Maximum number of layers in a project file.
pub const MAX_LAYERS: usize = 256;

/// Longest side of the stored thumbnail.
pub const THUMBNAIL_SIZE: u32 = 256;

const MAX_HEADER_BYTES: u64 = 4 * 1024;
const MAX_THUMBNAIL_BYTES: u64 = 4 * 1024 * 1024;
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024 * 1024;

/// Fixed-width little-endian integers; length prefixes are checked against
/// `limit` before anything is allocated.
fn codec(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
}

/// Written first and decoded on its own, so a newer body layout is rejected
/// by version rather than by a decode error.
#[derive(Serialize, Deserialize)]
struct ProjectHeader {
    mimetype: String,
    format_version: String,
    generator: String,
}

/// PNG-encoded composite; the thumbnail and the full merged preview are
/// each written as one of these between the header and the body.
#[derive(Serialize, Deserialize)]
struct PreviewImage {
    width: u32,
    height: u32,
    png: Vec<u8>,
}

impl PreviewImage {
    fn encode(img: &RgbaImage) -> EditorResult<Self> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            ColorType::Rgba8,
        )?;
        Ok(Self {
            width: img.width(),
            height: img.height(),
            png,
        })
    }

    fn decode(&self) -> EditorResult<RgbaImage> {
        let img = image::load_from_memory_with_format(&self.png, ImageFormat::Png)?.to_rgba8();
        if img.dimensions() != (self.width, self.height) {
            return Err(EditorError::format(format!(
                "preview is {}x{}, header says {}x{}",
                img.width(),
                img.height(),
                self.width,
                self.height
            )));
        }
        Ok(img)
    }
}

/// Size that fits `width`x`height` inside `max`x`max` keeping the aspect
/// ratio. Never upscales; each side is at least one pixel.
pub fn thumbnail_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    let scale = (max as f64 / width.max(1) as f64)
        .min(max as f64 / height.max(1) as f64)
        .min(1.0);
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

#[derive(Serialize, Deserialize)]
struct ProjectBody {
    id: Uuid,
    name: String,
    width: u32,
    height: u32,
    resolution: f32,
    created_at: u64,
    modified_at: u64,
    active_layer: Option<Uuid>,
    /// Bottom to top.
    layers: Vec<LayerData>,
    /// Raw RGBA8 keyed by layer id.
    pixels: HashMap<Uuid, Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct LayerData {
    id: Uuid,
    name: String,
    kind: LayerKind,
    visible: bool,
    locked: bool,
    opacity: u8,
    blend_mode: u8,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

pub fn write_project<W: Write>(mut writer: W, doc: &Document) -> EditorResult<()> {
    let header = ProjectHeader {
        mimetype: PROJECT_MIMETYPE.to_string(),
        format_version: FORMAT_VERSION.to_string(),
        generator: format!("PaintCore {}", env!("CARGO_PKG_VERSION")),
    };
    let body = ProjectBody {
        id: doc.id,
        name: doc.name.clone(),
        width: doc.width(),
        height: doc.height(),
        resolution: doc.resolution,
        created_at: doc.created_at,
        modified_at: doc.modified_at,
        active_layer: doc.active_layer_id(),
        layers: doc
            .layers()
            .iter()
            .map(|l| LayerData {
                id: l.id,
                name: l.name.clone(),
                kind: l.kind,
                visible: l.visible,
                locked: l.locked,
                opacity: l.opacity,
                blend_mode: l.blend_mode.to_u8(),
                x: l.x,
                y: l.y,
                width: l.width(),
                height: l.height(),
            })
            .collect(),
        pixels: doc
            .layers()
            .iter()
            .map(|l| (l.id, l.surface().as_bytes().to_vec()))
            .collect(),
    };
    let merged = doc
        .flatten()
        .to_rgba_image()
        .ok_or_else(|| EditorError::invalid_buffer("composite size mismatch"))?;
    let (tw, th) = thumbnail_dimensions(merged.width(), merged.height(), THUMBNAIL_SIZE);
    let thumbnail = image::imageops::thumbnail(&merged, tw, th);

    codec(MAX_HEADER_BYTES).serialize_into(&mut writer, &header)?;
    codec(MAX_THUMBNAIL_BYTES).serialize_into(&mut writer, &PreviewImage::encode(&thumbnail)?)?;
    codec(MAX_BODY_BYTES).serialize_into(&mut writer, &PreviewImage::encode(&merged)?)?;
    codec(MAX_BODY_BYTES).serialize_into(&mut writer, &body)?;
    writer.flush()?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> EditorResult<ProjectHeader> {
    let header: ProjectHeader = codec(MAX_HEADER_BYTES)
        .deserialize_from(&mut *reader)
        .map_err(|e| EditorError::format(format!("unreadable header: {}", e)))?;
    if header.mimetype != PROJECT_MIMETYPE {
        return Err(EditorError::format(format!(
            "expected mimetype '{}', got '{}'",
            PROJECT_MIMETYPE, header.mimetype
        )));
    }
    check_version(&header.format_version)?;
    Ok(header)
}

fn read_preview<R: Read>(reader: &mut R, limit: u64, what: &str) -> EditorResult<PreviewImage> {
    codec(limit)
        .deserialize_from(&mut *reader)
        .map_err(|e| EditorError::format(format!("unreadable {}: {}", what, e)))
}

/// Decode just the header and the thumbnail, without touching layer data.
pub fn read_thumbnail<R: Read>(mut reader: R) -> EditorResult<RgbaImage> {
    read_header(&mut reader)?;
    read_preview(&mut reader, MAX_THUMBNAIL_BYTES, "thumbnail")?.decode()
}

/// The full-size flattened image stored alongside the layers.
pub fn read_merged_preview<R: Read>(mut reader: R) -> EditorResult<RgbaImage> {
    read_header(&mut reader)?;
    read_preview(&mut reader, MAX_THUMBNAIL_BYTES, "thumbnail")?;
    read_preview(&mut reader, MAX_BODY_BYTES, "merged preview")?.decode()
}

pub fn read_project<R: Read>(mut reader: R) -> EditorResult<Document> {
    read_header(&mut reader)?;
    // Previews are derived data; layers are rebuilt from the body.
    read_preview(&mut reader, MAX_THUMBNAIL_BYTES, "thumbnail")?;
    read_preview(&mut reader, MAX_BODY_BYTES, "merged preview")?;

    let mut body: ProjectBody = codec(MAX_BODY_BYTES)
        .deserialize_from(&mut reader)
        .map_err(|e| EditorError::format(format!("unreadable body: {}", e)))?;
    validate_dimensions(body.width, body.height)?;
    if body.layers.len() > MAX_LAYERS {
        return Err(EditorError::format(format!(
            "{} layers exceeds the limit of {}",
            body.layers.len(),
            MAX_LAYERS
        )));
    }

    let mut layers = Vec::with_capacity(body.layers.len());
    for data in body.layers {
        validate_dimensions(data.width, data.height)?;
        let surface = match body.pixels.remove(&data.id) {
            Some(bytes) => match PixelSurface::from_raw(data.width, data.height, bytes) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("io: layer {} pixels rejected ({}), loading transparent", data.id, e);
                    PixelSurface::new(data.width, data.height)
                }
            },
            None => {
                log::warn!("io: layer {} has no pixel data, loading transparent", data.id);
                PixelSurface::new(data.width, data.height)
            }
        };
        let mut layer = Layer::with_surface(data.name, surface);
        layer.id = data.id;
        layer.kind = data.kind;
        layer.visible = data.visible;
        layer.locked = data.locked;
        layer.opacity = data.opacity.min(100);
        layer.blend_mode = BlendMode::from_u8(data.blend_mode);
        layer.x = data.x;
        layer.y = data.y;
        layers.push(layer);
    }
    if layers.is_empty() {
        return Err(EditorError::format("project has no layers"));
    }

    let mut doc = Document::from_layers(body.id, body.name, body.width, body.height, layers);
    doc.resolution = body.resolution;
    if let Some(active) = body.active_layer
        && doc.set_active_layer(active).is_err()
    {
        log::warn!("io: saved active layer {} is missing", active);
    }
    doc.created_at = body.created_at;
    doc.modified_at = body.modified_at;
    Ok(doc)
}

fn check_version(version: &str) -> EditorResult<()> {
    let major: u32 = version
        .split('.')
        .next()
        .and_then(|m| m.parse().ok())
        .ok_or_else(|| EditorError::format(format!("malformed version '{}'", version)))?;
    if major > 1 {
        return Err(EditorError::format(format!(
            "unsupported format version {}",
            version
        )));
    }
    Ok(())
}

fn validate_dimensions(width: u32, height: u32) -> EditorResult<()> {
    if width == 0 || height == 0 || width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
        return Err(EditorError::format(format!(
            "dimensions {}x{} outside 1..={}",
            width, height, MAX_CANVAS_DIM
        )));
    }
    Ok(())
}

// ============================================================================
// PATH-BASED LOAD / SAVE
// ============================================================================

pub fn is_project_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PROJECT_EXTENSION))
}

/// Load a `.pcore` project, or any raster format `image` decodes as a
/// single-layer document.
pub fn load_document(path: &Path) -> EditorResult<Document> {
    let mut doc = if is_project_path(path) {
        read_project(BufReader::new(File::open(path)?))?
    } else {
        let img = image::open(path)?.to_rgba8();
        validate_dimensions(img.width(), img.height())?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Background")
            .to_string();
        let layer = Layer::with_surface(name.clone(), PixelSurface::from_rgba_image(&img));
        Document::from_layers(Uuid::new_v4(), name, img.width(), img.height(), vec![layer])
    };
    doc.source_path = Some(path.to_path_buf());
    log::info!(
        "io: loaded {} ({}x{}, {} layers)",
        path.display(),
        doc.width(),
        doc.height(),
        doc.layer_count()
    );
    Ok(doc)
}

/// Write a project for `.pcore`, otherwise export the flattened image in the
/// format implied by the extension.
pub fn save_document(doc: &Document, path: &Path) -> EditorResult<()> {
    if is_project_path(path) {
        write_project(BufWriter::new(File::create(path)?), doc)?;
    } else {
        let img = doc
            .flatten()
            .to_rgba_image()
            .ok_or_else(|| EditorError::invalid_buffer("composite size mismatch"))?;
        img.save(path)?;
    }
    log::info!("io: saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_doc() -> Document {
        let mut doc = Document::new("Sample", 8, 6);
        let paint = doc.add_layer("Paint");
        let layer = doc.layer_mut(paint).unwrap();
        layer.opacity = 40;
        layer.blend_mode = BlendMode::Multiply;
        layer.x = 3;
        layer.y = -2;
        layer.surface_mut().put_pixel(1, 1, [10, 20, 30, 40]);
        doc
    }

    fn encode(header: &ProjectHeader, body: &[u8]) -> Vec<u8> {
        let mut buf = bincode::serialize(header).unwrap();
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn project_round_trip() {
        let doc = sample_doc();
        let mut buf = Vec::new();
        write_project(&mut buf, &doc).unwrap();
        let back = read_project(Cursor::new(buf)).unwrap();

        assert_eq!(back.id, doc.id);
        assert_eq!((back.width(), back.height()), (8, 6));
        assert_eq!(back.layer_count(), 2);
        assert_eq!(back.active_layer_id(), doc.active_layer_id());
        let (a, b) = (&doc.layers()[1], &back.layers()[1]);
        assert_eq!(b.id, a.id);
        assert_eq!(b.opacity, 40);
        assert_eq!(b.blend_mode, BlendMode::Multiply);
        assert_eq!((b.x, b.y), (3, -2));
        assert_eq!(b.surface(), a.surface());
    }

    #[test]
    fn wrong_mimetype_is_rejected() {
        let header = ProjectHeader {
            mimetype: "image/png".into(),
            format_version: FORMAT_VERSION.into(),
            generator: String::new(),
        };
        let err = read_project(Cursor::new(encode(&header, &[]))).unwrap_err();
        assert!(matches!(err, EditorError::FormatValidation(_)));
    }

    #[test]
    fn newer_major_version_fails_closed() {
        let header = ProjectHeader {
            mimetype: PROJECT_MIMETYPE.into(),
            format_version: "2.0".into(),
            generator: String::new(),
        };
        let err = read_project(Cursor::new(encode(&header, &[0xff; 8]))).unwrap_err();
        assert!(matches!(err, EditorError::FormatValidation(_)));
        assert!(check_version("1.7").is_ok());
        assert!(check_version("x").is_err());
    }

    #[test]
    fn huge_length_prefix_fails_without_allocating() {
        let err = read_project(Cursor::new(vec![0xff; 64])).unwrap_err();
        assert!(matches!(err, EditorError::FormatValidation(_)));
    }

    #[test]
    fn mismatched_layer_bytes_load_transparent() {
        let doc = sample_doc();
        let mut buf = Vec::new();
        write_project(&mut buf, &doc).unwrap();
        let mut cursor = Cursor::new(buf);
        let header: ProjectHeader = bincode::deserialize_from(&mut cursor).unwrap();
        let thumb: PreviewImage = bincode::deserialize_from(&mut cursor).unwrap();
        let merged: PreviewImage = bincode::deserialize_from(&mut cursor).unwrap();
        let mut body: ProjectBody = bincode::deserialize_from(&mut cursor).unwrap();
        let paint = body.layers[1].id;
        body.pixels.insert(paint, vec![1, 2, 3]);

        let mut rest = bincode::serialize(&thumb).unwrap();
        rest.extend(bincode::serialize(&merged).unwrap());
        rest.extend(bincode::serialize(&body).unwrap());
        let reencoded = encode(&header, &rest);
        let back = read_project(Cursor::new(reencoded)).unwrap();
        let layer = back.layer(paint).unwrap();
        assert_eq!((layer.width(), layer.height()), (8, 6));
        assert!(layer.surface().as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn truncated_body_is_a_format_error() {
        let mut buf = Vec::new();
        write_project(&mut buf, &sample_doc()).unwrap();
        buf.truncate(buf.len() - 10);
        let err = read_project(Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, EditorError::FormatValidation(_)), "{:?}", err);
    }

    #[test]
    fn thumbnail_fits_without_upscaling() {
        assert_eq!(thumbnail_dimensions(1024, 512, 256), (256, 128));
        assert_eq!(thumbnail_dimensions(300, 1200, 256), (64, 256));
        assert_eq!(thumbnail_dimensions(8, 6, 256), (8, 6));
        assert_eq!(thumbnail_dimensions(10_000, 1, 256), (256, 1));
    }

    #[test]
    fn merged_preview_matches_flatten() {
        let doc = sample_doc();
        let mut buf = Vec::new();
        write_project(&mut buf, &doc).unwrap();
        let merged = read_merged_preview(Cursor::new(&buf)).unwrap();
        assert_eq!(PixelSurface::from_rgba_image(&merged), doc.flatten());
        let thumb = read_thumbnail(Cursor::new(&buf)).unwrap();
        assert_eq!(thumb.dimensions(), (8, 6));
    }

    #[test]
    fn oversized_canvas_is_rejected() {
        assert!(validate_dimensions(MAX_CANVAS_DIM, 1).is_ok());
        assert!(validate_dimensions(MAX_CANVAS_DIM + 1, 1).is_err());
        assert!(validate_dimensions(0, 10).is_err());
    }

    #[test]
    fn project_extension_detection() {
        assert!(is_project_path(Path::new("art/cat.PCORE")));
        assert!(!is_project_path(Path::new("art/cat.png")));
        assert!(!is_project_path(Path::new("art/cat")));
    }
}
