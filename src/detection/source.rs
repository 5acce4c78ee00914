// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测源 (检测器边界)
//! Detector boundary: per-frame detection lists in, one call per frame

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::info;

use super::types::{BoundingBox, Detection};

/// 一帧的检测结果
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionFrame {
    pub frame_number: u64,
    pub detections: Vec<Detection>,
}

/// 检测源 Trait
///
/// 模型推理或离线检测文件都实现此接口
pub trait DetectionSource {
    /// 下一帧; `Ok(None)` 表示视频结束 (正常终止)
    fn next_frame(&mut self) -> anyhow::Result<Option<DetectionFrame>>;

    /// 定位到指定帧, 下一次 `next_frame` 从该帧开始
    fn seek(&mut self, frame_number: u64) -> anyhow::Result<()>;
}

/// 框的两种存储格式: 对象 {x1,y1,x2,y2} 或原始坐标数组
#[derive(Deserialize)]
#[serde(untagged)]
enum WireBox {
    Coords([f32; 4]),
    Named(BoundingBox),
}

impl From<WireBox> for BoundingBox {
    fn from(wire: WireBox) -> Self {
        match wire {
            WireBox::Coords(coords) => BoundingBox::from_coords(coords),
            WireBox::Named(bbox) => bbox,
        }
    }
}

#[derive(Deserialize)]
struct WireDetection {
    #[serde(rename = "class")]
    class_label: String,
    confidence: f32,
    bbox: WireBox,
}

#[derive(Deserialize)]
struct WireFrame {
    frame: u64,
    #[serde(default)]
    detections: Vec<WireDetection>,
}

/// 预先录制的检测结果 (JSON Lines, 每行一帧)
#[derive(Clone, Debug, Default)]
pub struct RecordedDetections {
    frames: Vec<DetectionFrame>,
    cursor: usize,
}

impl RecordedDetections {
    pub fn from_frames(mut frames: Vec<DetectionFrame>) -> Self {
        frames.sort_by_key(|f| f.frame_number);
        Self { frames, cursor: 0 }
    }

    /// 解析JSON Lines文本
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut frames = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let wire: WireFrame = serde_json::from_str(line)
                .with_context(|| format!("line {}: malformed detection frame", idx + 1))?;
            let mut detections = Vec::with_capacity(wire.detections.len());
            for d in wire.detections {
                if !(0.0..=1.0).contains(&d.confidence) {
                    bail!(
                        "line {}: confidence {} outside [0, 1]",
                        idx + 1,
                        d.confidence
                    );
                }
                detections.push(Detection::new(d.class_label, d.confidence, d.bbox.into()));
            }
            frames.push(DetectionFrame {
                frame_number: wire.frame,
                detections,
            });
        }
        Ok(Self::from_frames(frames))
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read detections from {}", path.display()))?;
        let source = Self::parse(&text)?;
        info!("📂 已加载 {} 帧检测结果: {}", source.frames.len(), path.display());
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl DetectionSource for RecordedDetections {
    fn next_frame(&mut self) -> anyhow::Result<Option<DetectionFrame>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, frame_number: u64) -> anyhow::Result<()> {
        self.cursor = self
            .frames
            .partition_point(|f| f.frame_number < frame_number);
        Ok(())
    }
}
