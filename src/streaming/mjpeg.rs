use bytes::{Bytes, BytesMut};
use log::warn;

pub const BOUNDARY: &str = "frame";

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// Wraps one JPEG as a part of a `multipart/x-mixed-replace` body.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--");
    part.extend_from_slice(BOUNDARY.as_bytes());
    part.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part.freeze()
}

/// Cuts a raw MJPEG byte stream (concatenated JPEGs, as written by
/// `ffmpeg -f mjpeg`) into individual images.
pub struct MjpegSplitter {
    buf: BytesMut,
    /// Where to resume looking for the end marker.
    scan_from: usize,
    max_frame_len: usize,
}

impl MjpegSplitter {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scan_from: 0,
            max_frame_len,
        }
    }

    /// Feeds a chunk and returns every image it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut images = Vec::new();

        loop {
            // Anything before a start marker is noise.
            match find(&self.buf, &SOI, 0) {
                Some(0) => {}
                Some(start) => {
                    let _ = self.buf.split_to(start);
                    self.scan_from = 0;
                }
                None => {
                    // Keep a trailing 0xFF, it may begin the next marker.
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let _ = self.buf.split_to(self.buf.len() - keep);
                    self.scan_from = 0;
                    break;
                }
            }

            match find(&self.buf, &EOI, self.scan_from.max(SOI.len())) {
                Some(end) => {
                    images.push(self.buf.split_to(end + EOI.len()).freeze());
                    self.scan_from = 0;
                }
                None => {
                    if self.buf.len() > self.max_frame_len {
                        warn!(
                            "Discarding {} bytes of MJPEG without an end marker",
                            self.buf.len()
                        );
                        self.buf.clear();
                        self.scan_from = 0;
                    } else {
                        self.scan_from = self.buf.len().saturating_sub(1);
                    }
                    break;
                }
            }
        }
        images
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &[u8] = &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9];
    const B: &[u8] = &[0xFF, 0xD8, 9, 0xFF, 0x00, 8, 0xFF, 0xD9];

    #[test]
    fn parts_follow_the_multipart_layout() {
        let part = multipart_part(A);
        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(A);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(&part[..], &expected[..]);
        assert_eq!(content_type(), "multipart/x-mixed-replace; boundary=frame");
    }

    #[test]
    fn splits_concatenated_images() {
        let mut splitter = MjpegSplitter::new(1024);
        let stream = [A, B].concat();
        let images = splitter.push(&stream);
        assert_eq!(images, vec![Bytes::from_static(A), Bytes::from_static(B)]);
    }

    #[test]
    fn images_may_span_chunks_and_markers_may_be_cut() {
        let mut splitter = MjpegSplitter::new(1024);
        let stream = [b"junk".as_slice(), A, B].concat();
        let mut images = Vec::new();
        for byte in stream.chunks(1) {
            images.extend(splitter.push(byte));
        }
        assert_eq!(images, vec![Bytes::from_static(A), Bytes::from_static(B)]);
    }

    #[test]
    fn runaway_image_is_discarded() {
        let mut splitter = MjpegSplitter::new(8);
        assert!(splitter.push(&[0xFF, 0xD8, 0, 0, 0, 0, 0, 0, 0, 0]).is_empty());
        assert_eq!(splitter.push(A), vec![Bytes::from_static(A)]);
    }
}
