//! Shared fakes and fixtures for the inline test modules.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::storage::BlobStore;
use crate::vision::{VisionClient, VisionError};

/// Encodes a small gradient PNG usable as a captured frame.
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    });
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("png encode");
    Bytes::from(buf.into_inner())
}

/// Wraps a payload in the fence the extractor looks for.
pub fn fenced(json: &str) -> String {
    format!("```json\n{json}\n```")
}

/// Accepts every put and answers with deterministic store URLs.
pub struct FakeBlobs;

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn put_object(&self, _key: &str, _body: Bytes, _ct: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn resolve_url(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://store/{key}"))
    }
}

/// Returns a canned reply, optionally failing one call (by arrival order).
pub struct ScriptedVision {
    reply: String,
    calls: AtomicUsize,
    fail_on: Option<usize>,
}

impl ScriptedVision {
    pub fn new(reply: String) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            fail_on: None,
        }
    }

    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }
}

#[async_trait]
impl VisionClient for ScriptedVision {
    async fn analyze(&self, _image_url: &str) -> Result<String, VisionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(call) {
            return Err(VisionError::Model {
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        Ok(self.reply.clone())
    }
}
