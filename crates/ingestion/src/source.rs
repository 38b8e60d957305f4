//! Detection sources

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Stdin};
use std::path::Path;
use std::time::Duration;

use contracts::{Detection, FrameDetections};
use tracing::debug;

use crate::{IngestionError, Result};

/// Source label for camera index `index`
pub fn camera_id(index: u32) -> String {
    format!("CAM_{index:02}")
}

/// Producer of per-frame detection batches
///
/// Pulled from a dedicated producer thread, so implementations may block.
pub trait DetectionSource: Send {
    fn name(&self) -> &str;

    /// Next frame, `Ok(None)` at end of stream
    ///
    /// # Errors
    /// `Parse` errors are recoverable: the producer counts them and keeps
    /// pulling. Anything else ends the stream.
    fn next_frame(&mut self) -> Result<Option<FrameDetections>>;
}

/// One frame per line, JSON encoded
///
/// ```text
/// {"frame_index": 12, "timestamp": 0.4, "detections": [{"class": "car", "confidence": 0.9, "bbox": {"x": 0.1, "y": 0.2, "w": 0.05, "h": 0.04}}]}
/// ```
pub struct JsonlSource<R> {
    name: String,
    reader: R,
    line_no: u64,
    last_frame: Option<u64>,
    buf: String,
}

impl JsonlSource<BufReader<File>> {
    /// Replay a recorded detection log
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self::from_reader(path.display().to_string(), BufReader::new(file)))
    }
}

impl JsonlSource<BufReader<Stdin>> {
    /// Detections streamed on stdin by the detector bound to camera `index`
    pub fn stdin(index: u32) -> Self {
        Self::from_reader(camera_id(index), BufReader::new(io::stdin()))
    }
}

impl<R: BufRead + Send> JsonlSource<R> {
    pub fn from_reader(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
            line_no: 0,
            last_frame: None,
            buf: String::new(),
        }
    }

    fn parse_error(&self, message: impl Into<String>) -> IngestionError {
        IngestionError::Parse {
            source_name: self.name.clone(),
            line: self.line_no,
            message: message.into(),
        }
    }
}

impl<R: BufRead + Send> DetectionSource for JsonlSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            let frame: FrameDetections =
                serde_json::from_str(line).map_err(|e| self.parse_error(e.to_string()))?;

            if let Some(last) = self.last_frame {
                if frame.frame_index <= last {
                    return Err(self.parse_error(format!(
                        "frame index {} not after {}",
                        frame.frame_index, last
                    )));
                }
            }
            self.last_frame = Some(frame.frame_index);

            return Ok(Some(frame.stamped()));
        }
    }
}

/// Scripted in-process source
pub struct MockSource {
    name: String,
    frames: VecDeque<FrameDetections>,
    interval: Option<Duration>,
}

impl MockSource {
    pub fn new(name: impl Into<String>, frames: impl IntoIterator<Item = FrameDetections>) -> Self {
        Self {
            name: name.into(),
            frames: frames.into_iter().collect(),
            interval: None,
        }
    }

    /// `count` frames at `fps`, detections produced per frame index
    pub fn generate<F>(name: impl Into<String>, count: u64, fps: f64, mut detections: F) -> Self
    where
        F: FnMut(u64) -> Vec<Detection>,
    {
        let frames = (0..count)
            .map(|i| FrameDetections::new(i, i as f64 / fps, detections(i)))
            .collect::<Vec<_>>();
        Self::new(name, frames)
    }

    /// Sleep between frames (simulates a live camera)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>> {
        let frame = self.frames.pop_front();
        if let (Some(interval), Some(_)) = (self.interval, &frame) {
            std::thread::sleep(interval);
        }
        if frame.is_none() {
            debug!(source = %self.name, "mock source exhausted");
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BBox;
    use std::io::{Cursor, Write};

    const LINES: &str = r#"{"frame_index": 0, "timestamp": 0.0, "detections": [{"class": "car", "confidence": 0.9, "bbox": {"x": 0.1, "y": 0.2, "w": 0.05, "h": 0.04}}]}
not json

{"frame_index": 1, "timestamp": 0.033, "detections": []}
{"frame_index": 1, "timestamp": 0.033, "detections": []}
{"frame_index": 2, "timestamp": 0.066}
"#;

    #[test]
    fn test_camera_id_format() {
        assert_eq!(camera_id(1), "CAM_01");
        assert_eq!(camera_id(12), "CAM_12");
    }

    #[test]
    fn test_jsonl_skips_bad_lines() {
        let mut source = JsonlSource::from_reader("test", Cursor::new(LINES));

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.frame_index, 0);
        assert_eq!(first.detections[0].class_label, "car");
        assert_eq!(first.detections[0].frame_index, 0);

        match source.next_frame() {
            Err(IngestionError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }

        assert_eq!(source.next_frame().unwrap().unwrap().frame_index, 1);
        // repeated index is rejected
        assert!(matches!(source.next_frame(), Err(IngestionError::Parse { line: 5, .. })));

        let last = source.next_frame().unwrap().unwrap();
        assert_eq!(last.frame_index, 2);
        assert!(last.is_empty());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"frame_index": 3, "timestamp": 0.1, "detections": []}}"#).unwrap();

        let mut source = JsonlSource::open(file.path()).unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap().frame_index, 3);
        assert!(source.next_frame().unwrap().is_none());

        assert!(matches!(
            JsonlSource::open("/nonexistent/detections.jsonl"),
            Err(IngestionError::Io(_))
        ));
    }

    #[test]
    fn test_mock_generate() {
        let mut source = MockSource::generate("mock", 3, 30.0, |i| {
            vec![Detection::new("car", 0.9, BBox::centered(0.5, 0.1 * i as f64 + 0.2, 0.1, 0.1))]
        });
        assert_eq!(source.remaining(), 3);

        let frames: Vec<_> = std::iter::from_fn(|| source.next_frame().unwrap()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].detections[0].frame_index, 2);
        assert!((frames[1].timestamp - 1.0 / 30.0).abs() < 1e-12);
    }
}
