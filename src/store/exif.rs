//! Capture time embedded in the JPEG as an EXIF `DateTime` tag.
//!
//! Only the marker segments before the scan are touched; entropy-coded data
//! is copied through verbatim.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

use crate::core::CaptureTime;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const TEM: u8 = 0x01;

const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";
const TAG_DATETIME: u16 = 0x0132;
const TYPE_ASCII: u16 = 2;
// 19 characters plus the terminating NUL
const DATETIME_LEN: usize = 20;

// TIFF header (8) + entry count (2) + one entry (12) + next IFD offset (4)
const DATETIME_OFFSET: usize = 26;
const TIFF_LEN: usize = DATETIME_OFFSET + DATETIME_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExifError {
    #[error("not a JPEG image")]
    NotJpeg,
    #[error("truncated JPEG segment at offset {0}")]
    Truncated(usize),
}

struct Segment<'a> {
    marker: u8,
    start: usize,
    end: usize,
    payload: &'a [u8],
}

impl Segment<'_> {
    fn is_exif(&self) -> bool {
        self.marker == APP1 && self.payload.starts_with(EXIF_HEADER)
    }
}

/// Marker segments up to the scan, and the offset where the rest begins.
fn segments(jpeg: &[u8]) -> Result<(Vec<Segment<'_>>, usize), ExifError> {
    if !jpeg.starts_with(&SOI) {
        return Err(ExifError::NotJpeg);
    }

    let mut out = Vec::new();
    let mut pos = SOI.len();

    while pos < jpeg.len() {
        if jpeg[pos] != 0xFF {
            return Err(ExifError::Truncated(pos));
        }

        let start = pos;
        // fill bytes
        while pos + 1 < jpeg.len() && jpeg[pos + 1] == 0xFF {
            pos += 1;
        }
        let marker = *jpeg.get(pos + 1).ok_or(ExifError::Truncated(start))?;

        if marker == SOS || marker == EOI {
            return Ok((out, start));
        }

        if marker == TEM || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            out.push(Segment {
                marker,
                start,
                end: pos,
                payload: &[],
            });
            continue;
        }

        let len_bytes = jpeg
            .get(pos + 2..pos + 4)
            .ok_or(ExifError::Truncated(start))?;
        let length = BigEndian::read_u16(len_bytes) as usize;
        let end = pos + 2 + length;
        if length < 2 || end > jpeg.len() {
            return Err(ExifError::Truncated(start));
        }

        out.push(Segment {
            marker,
            start,
            end,
            payload: &jpeg[pos + 4..end],
        });
        pos = end;
    }

    Ok((out, jpeg.len()))
}

fn build_app1(time: CaptureTime) -> Vec<u8> {
    let mut tiff = [0u8; TIFF_LEN];
    tiff[0..2].copy_from_slice(b"MM");
    BigEndian::write_u16(&mut tiff[2..4], 42);
    BigEndian::write_u32(&mut tiff[4..8], 8);
    BigEndian::write_u16(&mut tiff[8..10], 1);
    BigEndian::write_u16(&mut tiff[10..12], TAG_DATETIME);
    BigEndian::write_u16(&mut tiff[12..14], TYPE_ASCII);
    BigEndian::write_u32(&mut tiff[14..18], DATETIME_LEN as u32);
    BigEndian::write_u32(&mut tiff[18..22], DATETIME_OFFSET as u32);
    // next IFD offset stays 0

    let text = time.to_string();
    let n = text.len().min(DATETIME_LEN - 1);
    tiff[DATETIME_OFFSET..DATETIME_OFFSET + n].copy_from_slice(&text.as_bytes()[..n]);

    let length = 2 + EXIF_HEADER.len() + TIFF_LEN;
    let mut segment = Vec::with_capacity(2 + length);
    segment.extend_from_slice(&[0xFF, APP1]);
    let mut len_bytes = [0u8; 2];
    BigEndian::write_u16(&mut len_bytes, length as u16);
    segment.extend_from_slice(&len_bytes);
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(&tiff);
    segment
}

/// Returns `jpeg` with an EXIF segment carrying `time`. Any existing EXIF
/// segment is replaced, so embedding is idempotent. The new segment follows
/// a leading JFIF APP0 so JFIF readers still find it first.
pub fn embed_capture_time(jpeg: &[u8], time: CaptureTime) -> Result<Vec<u8>, ExifError> {
    let (segs, rest) = segments(jpeg)?;
    let app1 = build_app1(time);

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&SOI);

    let mut inserted = false;
    for seg in segs.iter().filter(|s| !s.is_exif()) {
        if !inserted && seg.marker != APP0 {
            out.extend_from_slice(&app1);
            inserted = true;
        }
        out.extend_from_slice(&jpeg[seg.start..seg.end]);
    }
    if !inserted {
        out.extend_from_slice(&app1);
    }

    out.extend_from_slice(&jpeg[rest..]);
    Ok(out)
}

/// Reads the capture time back. `None` if the image carries none.
pub fn read_capture_time(jpeg: &[u8]) -> Option<CaptureTime> {
    let (segs, _) = segments(jpeg).ok()?;
    segs.iter()
        .filter(|s| s.is_exif())
        .find_map(|s| datetime_from_tiff(&s.payload[EXIF_HEADER.len()..]))
}

fn datetime_from_tiff(tiff: &[u8]) -> Option<CaptureTime> {
    match tiff.get(0..2)? {
        b"II" => datetime_from_ifd0::<LittleEndian>(tiff),
        b"MM" => datetime_from_ifd0::<BigEndian>(tiff),
        _ => None,
    }
}

fn datetime_from_ifd0<B: ByteOrder>(tiff: &[u8]) -> Option<CaptureTime> {
    if B::read_u16(tiff.get(2..4)?) != 42 {
        return None;
    }
    let ifd = B::read_u32(tiff.get(4..8)?) as usize;
    let count = B::read_u16(tiff.get(ifd..ifd.checked_add(2)?)?) as usize;

    for i in 0..count {
        let at = ifd + 2 + i * 12;
        let entry = tiff.get(at..at + 12)?;
        if B::read_u16(&entry[0..2]) != TAG_DATETIME {
            continue;
        }
        if B::read_u16(&entry[2..4]) != TYPE_ASCII {
            return None;
        }
        let n = B::read_u32(&entry[4..8]) as usize;
        let value = if n <= 4 {
            &entry[8..8 + n]
        } else {
            let offset = B::read_u32(&entry[8..12]) as usize;
            tiff.get(offset..offset.checked_add(n)?)?
        };
        return CaptureTime::parse(std::str::from_utf8(value).ok()?);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(text: &str) -> CaptureTime {
        CaptureTime::parse(text).expect("valid time")
    }

    // SOI, JFIF APP0, a quantization table stub, SOS with two bytes of scan data, EOI
    fn sample_jpeg() -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x07, b'J', b'F', b'I', b'F', 0x00]);
        jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x04, 0x01, 0x02]);
        jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0x12, 0x34, 0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn embed_then_read_returns_time() {
        let t = time("2019-06-04 12:00:01");
        let tagged = embed_capture_time(&sample_jpeg(), t).expect("embed");
        assert_eq!(read_capture_time(&tagged), Some(t));
        assert!(tagged.ends_with(&[0xFF, 0xDA, 0x00, 0x02, 0x12, 0x34, 0xFF, 0xD9]));
    }

    #[test]
    fn exif_follows_jfif_header() {
        let tagged = embed_capture_time(&sample_jpeg(), time("2019-06-04 12:00:01")).unwrap();
        assert_eq!(&tagged[2..4], &[0xFF, 0xE0]);
        assert_eq!(&tagged[11..13], &[0xFF, 0xE1]);
    }

    #[test]
    fn embedding_twice_replaces_the_tag() {
        let first = embed_capture_time(&sample_jpeg(), time("2019-06-04 12:00:01")).unwrap();
        let second = embed_capture_time(&first, time("2020-01-01 00:00:00")).unwrap();
        assert_eq!(read_capture_time(&second), Some(time("2020-01-01 00:00:00")));
        assert_eq!(second.len(), first.len());

        let again = embed_capture_time(&second, time("2020-01-01 00:00:00")).unwrap();
        assert_eq!(again, second);
    }

    #[test]
    fn minimal_jpeg_without_segments() {
        let t = time("2021-03-04 05:06:07");
        let tagged = embed_capture_time(&[0xFF, 0xD8, 0xFF, 0xD9], t).unwrap();
        assert_eq!(read_capture_time(&tagged), Some(t));
        assert!(tagged.ends_with(&[0xFF, 0xD9]));
    }

    #[test]
    fn reads_little_endian_exif_from_other_writers() {
        let mut tiff = vec![b'I', b'I', 42, 0, 8, 0, 0, 0, 1, 0];
        tiff.extend_from_slice(&[0x32, 0x01, 2, 0, 20, 0, 0, 0, 26, 0, 0, 0]);
        tiff.extend_from_slice(&[0, 0, 0, 0]);
        tiff.extend_from_slice(b"2018:12:31 23:59:58\0");

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        let len = (2 + EXIF_HEADER.len() + tiff.len()) as u16;
        jpeg.extend_from_slice(&len.to_be_bytes());
        jpeg.extend_from_slice(EXIF_HEADER);
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        assert_eq!(read_capture_time(&jpeg), Some(time("2018-12-31 23:59:58")));
    }

    #[test]
    fn rejects_non_jpeg_and_truncated_segments() {
        assert_eq!(
            embed_capture_time(b"GIF89a", time("2019-06-04 12:00:01")),
            Err(ExifError::NotJpeg)
        );
        assert_eq!(
            embed_capture_time(&[0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x40, 0x01], time("2019-06-04 12:00:01")),
            Err(ExifError::Truncated(2))
        );
        assert_eq!(read_capture_time(&sample_jpeg()), None);
    }
}
