//! Hashing & metadata adapters (C1, spec §4.1).
//!
//! Stateless pure functions. No adapter mutates state or fails the pipeline
//! by itself; callers decide whether to continue on a structured error.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{EtError, EtResult};
use crate::schema::EvidenceType;

const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming SHA-256 of a file's contents. Memory use is bounded by
/// `CHUNK_SIZE` regardless of file size (spec §4.1).
pub fn sha256_file(path: &Path) -> EtResult<String> {
    let mut file = std::fs::File::open(path).map_err(EtError::Io)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(EtError::Io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory byte slice (used for prompt hashing, entity keys,
/// and tests exercising P1 without touching disk).
pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];
const EMAIL_EXTENSIONS: &[&str] = &["eml", "msg", "mbox", "mbx"];
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md", "rtf", "doc", "docx", "pdf"];

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Extension + magic-byte MIME guess. Returns `application/octet-stream` on
/// unknown types (spec §4.1).
pub fn mime_guess(path: &Path) -> String {
    let ext = extension_of(path);
    match ext.as_str() {
        "txt" | "md" => "text/plain",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "rtf" => "application/rtf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "webp" => "image/webp",
        "eml" => "message/rfc822",
        "msg" => "application/vnd.ms-outlook",
        "mbox" | "mbx" => "application/mbox",
        _ => sniff_magic_bytes(path).unwrap_or("application/octet-stream"),
    }
    .to_string()
}

/// Read the first few bytes and sniff common magic numbers when the
/// extension alone is inconclusive.
fn sniff_magic_bytes(path: &Path) -> Option<&'static str> {
    let mut buf = [0u8; 8];
    let mut file = std::fs::File::open(path).ok()?;
    let n = file.read(&mut buf).ok()?;
    if n >= 4 && &buf[0..4] == b"%PDF" {
        return Some("application/pdf");
    }
    if n >= 8 && buf[0..8] == [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a] {
        return Some("image/png");
    }
    if n >= 3 && buf[0..3] == [0xFF, 0xD8, 0xFF] {
        return Some("image/jpeg");
    }
    None
}

/// Classify an evidence file (spec §4.1): image/email extensions or MIME
/// route directly; PDFs are probed for extractable text; everything else
/// falls back to the extension table, then `other`.
pub fn classify(path: &Path) -> EvidenceType {
    let ext = extension_of(path);
    let mime = mime_guess(path);

    if EMAIL_EXTENSIONS.contains(&ext.as_str()) || mime.starts_with("message/") || mime == "application/mbox" {
        return EvidenceType::Email;
    }

    if ext == "pdf" {
        return if has_extractable_pdf_text(path) {
            EvidenceType::Document
        } else {
            EvidenceType::Image
        };
    }

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) || mime.starts_with("image/") {
        return EvidenceType::Image;
    }

    if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) || mime.starts_with("text/") || mime.contains("document") {
        return EvidenceType::Document;
    }

    EvidenceType::Other
}

/// Open the PDF, extract the first page, and require >= 50 non-whitespace
/// characters (spec §4.1). Any failure (encrypted, corrupted, image-only)
/// is treated as "not extractable" rather than propagated.
pub fn has_extractable_pdf_text(path: &Path) -> bool {
    match pdf_extract::extract_text(path) {
        Ok(text) => {
            let first_page = text.split('\u{c}').next().unwrap_or(&text);
            first_page.chars().filter(|c| !c.is_whitespace()).count() >= 50
        }
        Err(_) => false,
    }
}

/// EXIF extraction, tolerant of malformed data (spec §4.1). Never fails the
/// pipeline: any decode error yields an empty map.
pub fn extract_exif(path: &Path) -> indexmap::IndexMap<String, String> {
    let mut out = indexmap::IndexMap::new();
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return out,
    };
    let mut bufreader = std::io::BufReader::new(file);
    let exif_reader = exif::Reader::new();
    let Ok(fields) = exif_reader.read_from_container(&mut bufreader) else {
        return out;
    };
    for field in fields.fields() {
        let tag = field.tag.to_string();
        let value = decode_exif_value(&field.value);
        out.insert(tag, value);
    }
    out
}

fn decode_exif_value(value: &exif::Value) -> String {
    // Decode as UTF-8 with a latin-1 fallback so a single malformed byte
    // string doesn't abort extraction for the whole image (spec §4.1).
    let display = value.display_as(exif::Tag::Unknown(0)).to_string();
    if display.is_ascii() || std::str::from_utf8(display.as_bytes()).is_ok() {
        display
    } else {
        display.chars().map(|c| if c as u32 > 255 { '\u{FFFD}' } else { c }).collect()
    }
}

/// 64-bit perceptual hash via a DCT on a 32x32 greyscale resample (spec
/// §4.1): sign-bits of the top-left 8x8 DCT block (minus the DC term)
/// against the block median.
pub fn perceptual_hash(path: &Path) -> EtResult<String> {
    let img = image::open(path).map_err(|e| EtError::Input(format!("cannot decode image: {e}")))?;
    let grey = img.to_luma8();
    let resized = image::imageops::resize(&grey, 32, 32, image::imageops::FilterType::Lanczos3);

    let mut pixels = [[0.0f64; 32]; 32];
    for y in 0..32u32 {
        for x in 0..32u32 {
            pixels[y as usize][x as usize] = resized.get_pixel(x, y).0[0] as f64;
        }
    }

    let dct = dct_2d(&pixels);

    // Collect the top-left 8x8 block excluding the DC coefficient (0,0).
    let mut block = Vec::with_capacity(63);
    for y in 0..8 {
        for x in 0..8 {
            if x == 0 && y == 0 {
                continue;
            }
            block.push(dct[y][x]);
        }
    }
    let mut sorted = block.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = sorted[sorted.len() / 2];

    let mut bits: u64 = 0;
    for (i, value) in block.iter().enumerate() {
        if *value > median {
            bits |= 1 << i;
        }
    }
    Ok(format!("{bits:016x}"))
}

/// Naive O(n^2) 2D DCT-II over a 32x32 block; the image is small enough that
/// an FFT-based transform isn't warranted.
fn dct_2d(pixels: &[[f64; 32]; 32]) -> [[f64; 32]; 32] {
    const N: usize = 32;
    let mut rows = [[0.0f64; N]; N];
    for y in 0..N {
        rows[y] = dct_1d(&pixels[y]);
    }
    let mut out = [[0.0f64; N]; N];
    for x in 0..N {
        let column: [f64; N] = std::array::from_fn(|y| rows[y][x]);
        let transformed = dct_1d(&column);
        for y in 0..N {
            out[y][x] = transformed[y];
        }
    }
    out
}

fn dct_1d(input: &[f64; 32]) -> [f64; 32] {
    const N: usize = 32;
    let mut out = [0.0f64; N];
    for (k, slot) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (n, value) in input.iter().enumerate() {
            sum += value
                * ((std::f64::consts::PI / N as f64) * (n as f64 + 0.5) * k as f64).cos();
        }
        let scale = if k == 0 { (1.0 / N as f64).sqrt() } else { (2.0 / N as f64).sqrt() };
        *slot = scale * sum;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sha256_bytes_is_64_lowercase_hex_chars() {
        let hash = sha256_bytes(b"Hello.");
        assert_eq!(hash.len(), 64);
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn sha256_file_matches_sha256_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"Hello.").unwrap();
        tmp.flush().unwrap();
        assert_eq!(sha256_file(tmp.path()).unwrap(), sha256_bytes(b"Hello."));
    }

    #[test]
    fn mime_guess_falls_back_to_octet_stream() {
        let path = Path::new("mystery.bin");
        assert_eq!(mime_guess(path), "application/octet-stream");
    }

    #[test]
    fn classify_routes_text_files_as_document() {
        assert_eq!(classify(Path::new("letter.txt")), EvidenceType::Document);
        assert_eq!(classify(Path::new("photo.jpg")), EvidenceType::Image);
        assert_eq!(classify(Path::new("thread.eml")), EvidenceType::Email);
        assert_eq!(classify(Path::new("data.bin")), EvidenceType::Other);
    }
}
