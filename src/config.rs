// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 标注器配置 - 通过JSON文件调整参数

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 标注器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    // === 检测参数 ===
    pub confidence_threshold_percent: f32, // 置信度阈值 (0-100)
    pub iou_match_threshold: f32,          // 帧间匹配IOU阈值 (严格大于)

    // === 画面 ===
    pub frame_width: u32,
    pub frame_height: u32,

    // === 手动框 ===
    pub default_box_duration: u32, // 默认持续帧数

    // === 类别与导出 ===
    pub classes_path: Option<String>, // 类别词表文件, 每行一个
    pub export_path: String,
    pub export_indent: usize,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold_percent: 25.0,
            iou_match_threshold: 0.5,

            frame_width: 1920,
            frame_height: 1080,

            default_box_duration: 30,

            classes_path: Some("coco.txt".to_string()),
            export_path: "tracked_objects.json".to_string(),
            export_indent: 4,
        }
    }
}

impl AnnotatorConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出并返回默认配置; 内容无法解析时报错, 批处理不会悄悄换成默认值。
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                return Ok(config);
            }
            Err(e) => return Err(e).with_context(|| format!("failed to read config {}", path.display())),
        };
        let config = serde_json::from_str(&json)
            .with_context(|| format!("malformed config {}", path.display()))?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️  当前标注器配置:");
        info!("  置信度阈值: {:.1}%", self.confidence_threshold_percent);
        info!("  匹配IOU阈值: {:.2}", self.iou_match_threshold);
        info!("  画面尺寸: {}x{}", self.frame_width, self.frame_height);
        info!("  手动框默认持续: {} 帧", self.default_box_duration);
        info!("  导出文件: {}", self.export_path);
    }
}

/// 加载类别词表 (每行一个类别); 文件缺失时返回空词表
pub fn load_class_vocabulary(path: impl AsRef<Path>) -> Vec<String> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => {
            let classes: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            info!("📚 已加载 {} 个类别: {}", classes.len(), path.display());
            classes
        }
        Err(_) => {
            warn!(
                "⚠️  类别文件 {} 不存在, 类别过滤可能无法正常工作",
                path.display()
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotator.json");

        let config = AnnotatorConfig::load(&path).unwrap();
        assert_eq!(config, AnnotatorConfig::default());
        assert!(path.exists());
        assert_eq!(AnnotatorConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotator.json");
        fs::write(&path, r#"{"frame_width": 640, "frame_height": 480}"#).unwrap();

        let config = AnnotatorConfig::load(&path).unwrap();
        assert_eq!(config.frame_width, 640);
        assert_eq!(config.confidence_threshold_percent, 25.0);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotator.json");
        fs::write(&path, "{ not json").unwrap();
        let err = AnnotatorConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("malformed config"));
        // 原文件保持不变
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_class_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coco.txt");
        fs::write(&path, "person\nbicycle\n\n car \n").unwrap();
        assert_eq!(load_class_vocabulary(&path), vec!["person", "bicycle", "car"]);
        assert!(load_class_vocabulary(dir.path().join("missing.txt")).is_empty());
    }
}
