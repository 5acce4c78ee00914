// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统边界 (Detection boundary)
///
/// - types:   检测框与几何运算
/// - tracker: 帧间身份匹配
/// - source:  检测结果来源
pub mod source;
pub mod tracker;
pub mod types;

pub use source::{DetectionFrame, DetectionSource, RecordedDetections};
pub use tracker::{IdentityResolver, PreviousBox, PreviousFrameBoxes};
pub use types::{compute_iou, BoundingBox, Detection, FrameSize, MoveDirection};
