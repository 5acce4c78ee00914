// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 逐帧记录与导出
//! Per-frame annotation record and the JSON export artifact

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

use super::remap::IdRemap;
use crate::detection::BoundingBox;
use crate::error::AnnotationResult;

/// 手动框固定置信度
pub const MANUAL_CONFIDENCE: f32 = 100.0;

/// 框来源 (仅用于显示)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxSource {
    Detector,
    Manual,
}

/// 一帧中的一个标注
#[derive(Clone, Debug, PartialEq)]
pub struct FrameEntry {
    pub id: u32,
    pub class_label: String,
    /// 置信度 0–100
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub source: BoxSource,
}

/// 导出格式中的框 (整数像素坐标)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ExportBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl From<&BoundingBox> for ExportBox {
    fn from(b: &BoundingBox) -> Self {
        Self {
            x1: b.x1 as i32,
            y1: b.y1 as i32,
            x2: b.x2 as i32,
            y2: b.y2 as i32,
        }
    }
}

/// 导出格式中的一条记录
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportEntry {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "class")]
    pub class_label: String,
    #[serde(rename = "Confidence Level")]
    pub confidence: f32,
    pub bbox: ExportBox,
}

/// 帧号 → 记录; 键为整数, 迭代顺序即数值顺序 ("2" < "9" < "10")
pub type ExportArtifact = BTreeMap<u64, Vec<ExportEntry>>;

#[derive(Clone, Debug, Default)]
pub struct FrameRecorder {
    frames: BTreeMap<u64, Vec<FrameEntry>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一帧; 重复处理同一帧时替换该帧记录
    pub fn record(&mut self, frame_number: u64, entries: Vec<FrameEntry>) {
        if self.frames.insert(frame_number, entries).is_some() {
            debug!("帧 {} 重新处理, 替换原记录", frame_number);
        }
    }

    pub fn frame(&self, frame_number: u64) -> Option<&[FrameEntry]> {
        self.frames.get(&frame_number).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 生成导出映射, 按帧号数值排序, ID经重映射解析
    pub fn export(&self, remap: &IdRemap) -> AnnotationResult<ExportArtifact> {
        let mut artifact = ExportArtifact::new();
        for (&frame, entries) in &self.frames {
            let mut out = Vec::with_capacity(entries.len());
            for entry in entries {
                out.push(ExportEntry {
                    id: remap.resolve(entry.id)?,
                    class_label: entry.class_label.clone(),
                    confidence: entry.confidence,
                    bbox: ExportBox::from(&entry.bbox),
                });
            }
            artifact.insert(frame, out);
        }
        Ok(artifact)
    }

    /// 序列化为缩进JSON文本
    pub fn to_json(&self, remap: &IdRemap, indent: usize) -> anyhow::Result<String> {
        let artifact = self.export(remap)?;
        let indent = " ".repeat(indent);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        artifact
            .serialize(&mut ser)
            .context("failed to serialize frame records")?;
        String::from_utf8(buf).context("frame records are not valid UTF-8")
    }

    /// 写出导出文件
    pub fn write_json(&self, path: impl AsRef<Path>, remap: &IdRemap, indent: usize) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = self.to_json(remap, indent)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("💾 {} 帧标注已保存到 {}", self.frames.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, conf: f32) -> FrameEntry {
        FrameEntry {
            id,
            class_label: "person".to_string(),
            confidence: conf,
            bbox: BoundingBox::new(1.9, 2.0, 30.5, 40.0),
            source: BoxSource::Detector,
        }
    }

    #[test]
    fn test_export_orders_frames_numerically() {
        let mut recorder = FrameRecorder::new();
        recorder.record(9, vec![entry(1, 90.0)]);
        recorder.record(10, vec![entry(1, 91.0)]);
        recorder.record(2, vec![entry(1, 92.0)]);

        let artifact = recorder.export(&IdRemap::new()).unwrap();
        assert_eq!(artifact.keys().copied().collect::<Vec<_>>(), vec![2, 9, 10]);

        let json = recorder.to_json(&IdRemap::new(), 4).unwrap();
        let p2 = json.find("\"2\"").unwrap();
        let p9 = json.find("\"9\"").unwrap();
        let p10 = json.find("\"10\"").unwrap();
        assert!(p2 < p9 && p9 < p10);
    }

    #[test]
    fn test_json_layout() {
        let mut recorder = FrameRecorder::new();
        recorder.record(0, vec![entry(3, 87.5)]);
        let json = recorder.to_json(&IdRemap::new(), 4).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let item = &value["0"][0];
        assert_eq!(item["ID"], 3);
        assert_eq!(item["class"], "person");
        assert_eq!(item["Confidence Level"], 87.5);
        assert_eq!(item["bbox"]["x1"], 1);
        assert_eq!(item["bbox"]["x2"], 30);
        assert!(json.contains("\n    \"0\": ["));
    }

    #[test]
    fn test_export_applies_remap() {
        let mut recorder = FrameRecorder::new();
        recorder.record(0, vec![entry(3, 50.0)]);
        let mut remap = IdRemap::new();
        remap.insert(3, 7).unwrap();

        let artifact = recorder.export(&remap).unwrap();
        assert_eq!(artifact[&0][0].id, 7);
        // 内部记录不被改写
        assert_eq!(recorder.frame(0).unwrap()[0].id, 3);
    }

    #[test]
    fn test_rerecord_replaces_frame() {
        let mut recorder = FrameRecorder::new();
        recorder.record(4, vec![entry(1, 10.0)]);
        recorder.record(5, vec![entry(1, 10.0)]);
        recorder.record(4, vec![entry(2, 20.0), entry(3, 30.0)]);

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.frame(4).unwrap().len(), 2);
        assert_eq!(recorder.frame(4).unwrap()[0].id, 2);
    }

    #[test]
    fn test_write_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracked_objects.json");
        let mut recorder = FrameRecorder::new();
        recorder.record(1, vec![entry(1, 99.0)]);
        recorder.write_json(&path, &IdRemap::new(), 4).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["1"][0]["ID"], 1);
    }
}
