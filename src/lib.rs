// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotation; // 标注核心: 存储/过滤/记录/编排
pub mod config; // 标注器配置参数
pub mod detection; // 检测边界与身份匹配
pub mod error; // 错误类型
pub mod session; // 批处理会话

use std::path::{Path, PathBuf};

pub use crate::annotation::{
    AnnotationStore, ClassFilter, Command, CommandOutcome, FrameOutcome, FrameProcessor,
    FrameRecorder,
};
pub use crate::config::AnnotatorConfig;
pub use crate::detection::{BoundingBox, Detection, DetectionSource, IdentityResolver};
pub use crate::error::{AnnotationError, AnnotationResult};
pub use crate::session::AnnotationSession;

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// 在文件名后追加时间戳: `tracked_objects.json` → `tracked_objects_2024_09_20_...json`
pub fn timestamped_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tracked_objects".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, gen_time_string("_"), ext.to_string_lossy()),
        None => format!("{}_{}", stem, gen_time_string("_")),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamped_path_keeps_extension() {
        let p = timestamped_path("out/tracked_objects.json");
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tracked_objects_"));
        assert!(name.ends_with(".json"));
        assert_eq!(p.parent().unwrap(), Path::new("out"));
    }
}
