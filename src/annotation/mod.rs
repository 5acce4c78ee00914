// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 标注核心 (Annotation core)
///
/// - store:     跟踪对象/手动框/ID重映射
/// - filter:    类别过滤
/// - recorder:  逐帧记录与导出
/// - command:   用户命令队列
/// - processor: 帧处理编排
pub mod command;
pub mod filter;
pub mod processor;
pub mod recorder;
pub mod remap;
pub mod store;

pub use command::{
    parse_command_script, Command, CommandOutcome, CommandQueue, ScheduledCommand,
};
pub use filter::ClassFilter;
pub use processor::{FrameOutcome, FrameProcessor};
pub use recorder::{BoxSource, ExportArtifact, ExportEntry, FrameEntry, FrameRecorder};
pub use remap::IdRemap;
pub use store::{AnnotationStore, ManualBoxEntry, ObjectOrigin, ObjectStatus, TrackedObject};
