// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧处理器 (编排)
//! Resolve → Filter → Record, one frame at a time
//!
//! 状态机: Idle → Resolving → Filtering → Recording → Idle。
//! `process` 与所有命令都以 `&mut self` 执行并完整返回, 命令只在 Idle 时生效。
//! 任一步骤出错时本帧不提交任何修改。

use std::collections::BTreeSet;
use std::path::Path;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use super::command::{Command, CommandOutcome, CommandQueue};
use super::filter::ClassFilter;
use super::recorder::{BoxSource, FrameEntry, FrameRecorder, MANUAL_CONFIDENCE};
use super::store::AnnotationStore;
use crate::config::AnnotatorConfig;
use crate::detection::{Detection, FrameSize, IdentityResolver, PreviousFrameBoxes};
use crate::error::{AnnotationError, AnnotationResult};

/// 默认置信度阈值 (百分比)
pub const DEFAULT_CONFIDENCE_PERCENT: f32 = 25.0;

/// 命令未指定持续帧数时手动框的默认窗口
pub const DEFAULT_BOX_DURATION: u32 = 30;

/// 单帧处理结果
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutcome {
    pub frame_number: u64,
    /// 显示并记录的框 (检测框在前, 手动框在后)
    pub entries: Vec<FrameEntry>,
}

impl FrameOutcome {
    pub fn ids(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.id).collect()
    }
}

pub struct FrameProcessor {
    store: AnnotationStore,
    resolver: IdentityResolver,
    filter: ClassFilter,
    recorder: FrameRecorder,
    previous: PreviousFrameBoxes,
    /// 当前显示帧的框
    displayed: Vec<FrameEntry>,
    /// 置信度阈值 [0, 1]
    confidence_threshold: f32,
    frame_size: FrameSize,
    /// 当前显示的帧号 (创建/移动框的起始帧)
    current_frame: u64,
    default_box_duration: u32,
    commands: CommandQueue,
}

impl FrameProcessor {
    pub fn new(frame_size: FrameSize) -> Self {
        Self {
            store: AnnotationStore::new(),
            resolver: IdentityResolver::default(),
            filter: ClassFilter::new(),
            recorder: FrameRecorder::new(),
            previous: PreviousFrameBoxes::new(),
            displayed: Vec::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_PERCENT / 100.0,
            frame_size,
            current_frame: 0,
            default_box_duration: DEFAULT_BOX_DURATION,
            commands: CommandQueue::new(),
        }
    }

    pub fn from_config(config: &AnnotatorConfig, vocabulary: Vec<String>) -> AnnotationResult<Self> {
        let mut processor = Self::new(FrameSize::new(config.frame_width, config.frame_height));
        processor.store = AnnotationStore::with_vocabulary(vocabulary);
        processor.resolver = IdentityResolver::new(config.iou_match_threshold);
        processor.default_box_duration = config.default_box_duration;
        processor.set_confidence_threshold(config.confidence_threshold_percent)?;
        Ok(processor)
    }

    // ========== 访问器 ==========

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn recorder(&self) -> &FrameRecorder {
        &self.recorder
    }

    pub fn filter(&self) -> &ClassFilter {
        &self.filter
    }

    pub fn previous_boxes(&self) -> &PreviousFrameBoxes {
        &self.previous
    }

    pub fn displayed(&self) -> &[FrameEntry] {
        &self.displayed
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    pub fn default_box_duration(&self) -> u32 {
        self.default_box_duration
    }

    pub fn confidence_threshold_percent(&self) -> f32 {
        self.confidence_threshold * 100.0
    }

    /// UI线程用的命令发送端
    pub fn command_sender(&self) -> Sender<Command> {
        self.commands.sender()
    }

    // ========== 帧处理 ==========

    /// 处理一帧检测结果
    pub fn process(&mut self, frame_number: u64, detections: &[Detection]) -> AnnotationResult<FrameOutcome> {
        // Resolving: 只读阶段, 失败时不留下任何修改
        let mut resolved = Vec::with_capacity(detections.len());
        for det in detections {
            if det.confidence < self.confidence_threshold {
                continue;
            }
            let matched = match self.resolver.best_match(&det.bbox, &self.previous) {
                Some(raw_id) => Some(self.store.resolve_id(raw_id)?),
                None => None,
            };
            resolved.push((det, matched));
        }

        // 提交ID, 同时构建下一帧的匹配快照 (过滤与删除之前)
        // 同一帧内每个ID只保留一个框, 后出现的检测覆盖先出现的
        let mut next_previous = PreviousFrameBoxes::new();
        let mut detector_boxes: Vec<(u32, &Detection)> = Vec::with_capacity(resolved.len());
        for (det, matched) in resolved {
            let id = match matched {
                Some(id) => {
                    self.store.observe(id, &det.class_label, det.bbox);
                    id
                }
                None => self.store.register_detection(&det.class_label, det.bbox),
            };
            next_previous.insert(id, det.class_label.clone(), det.bbox);
            match detector_boxes.iter_mut().find(|(seen, _)| *seen == id) {
                Some(slot) => {
                    debug!("帧 {}: 目标 #{} 匹配到多个检测框, 保留最后一个", frame_number, id);
                    slot.1 = det;
                }
                None => detector_boxes.push((id, det)),
            }
        }

        // Filtering
        let mut entries = Vec::new();
        for (id, det) in detector_boxes {
            if !self.filter.is_visible(&det.class_label) || self.store.is_deleted(id) {
                continue;
            }
            entries.push(FrameEntry {
                id,
                class_label: det.class_label.clone(),
                confidence: percent(det.confidence),
                bbox: det.bbox,
                source: BoxSource::Detector,
            });
        }
        for manual in self.store.active_manual_boxes(frame_number) {
            if !self.filter.is_visible(&manual.class_label) || self.store.is_deleted(manual.id) {
                continue;
            }
            entries.push(FrameEntry {
                id: manual.id,
                class_label: manual.class_label.clone(),
                confidence: MANUAL_CONFIDENCE,
                bbox: manual.bbox,
                source: BoxSource::Manual,
            });
        }

        // Recording
        self.recorder.record(frame_number, entries.clone());
        self.previous = next_previous;
        self.displayed = entries.clone();
        self.current_frame = frame_number;
        debug!("帧 {}: {} 个框", frame_number, entries.len());

        Ok(FrameOutcome {
            frame_number,
            entries,
        })
    }

    // ========== 命令 ==========

    pub fn enqueue(&self, command: Command) {
        self.commands.push(command);
    }

    /// 在两帧之间执行所有排队命令
    pub fn apply_pending(&mut self) -> Vec<(Command, AnnotationResult<CommandOutcome>)> {
        self.commands
            .drain()
            .into_iter()
            .map(|command| {
                let result = self.apply(command.clone());
                if let Err(e) = &result {
                    warn!("⚠️  命令 {:?} 失败: {}", command, e);
                }
                (command, result)
            })
            .collect()
    }

    /// 立即执行一条命令 (调用方须保证处于两帧之间)
    pub fn apply(&mut self, command: Command) -> AnnotationResult<CommandOutcome> {
        match command {
            Command::CreateBox {
                bbox,
                class_label,
                duration_frames,
            } => self
                .store
                .create_manual_box(
                    bbox,
                    &class_label,
                    self.current_frame,
                    duration_frames.unwrap_or(self.default_box_duration),
                )
                .map(CommandOutcome::Created),
            Command::DeleteBox(id) => self.store.delete(id).map(|_| CommandOutcome::Deleted(id)),
            Command::RestoreBox(id) => self.store.restore(id).map(|_| CommandOutcome::Restored(id)),
            Command::RenameBox {
                old_id,
                new_id,
                apply_to_future,
            } => {
                self.store.rename_id(old_id, new_id, apply_to_future)?;
                for entry in self.displayed.iter_mut().filter(|e| e.id == old_id) {
                    entry.id = new_id;
                }
                Ok(CommandOutcome::Renamed { old_id, new_id })
            }
            Command::MoveBox {
                id,
                direction,
                pixels,
                duration_frames,
            } => self
                .store
                .move_manual(
                    id,
                    direction,
                    pixels,
                    duration_frames.unwrap_or(self.default_box_duration),
                    self.current_frame,
                    self.frame_size,
                )
                .map(|new_id| CommandOutcome::Moved { old_id: id, new_id }),
            Command::SetConfidenceThreshold(percent) => {
                self.set_confidence_threshold(percent)?;
                Ok(CommandOutcome::ThresholdSet(percent))
            }
            Command::SetClassFilter(classes) => {
                self.set_class_filter(classes.clone())?;
                Ok(CommandOutcome::FilterSet(classes))
            }
            Command::Seek(frame) => {
                self.current_frame = frame;
                info!("⏩ 跳转到帧 {}", frame);
                Ok(CommandOutcome::Seeked(frame))
            }
        }
    }

    /// 设置置信度阈值 (百分比 0–100)
    pub fn set_confidence_threshold(&mut self, percent: f32) -> AnnotationResult<()> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(AnnotationError::invalid(format!(
                "confidence threshold must be within 0..=100, got {}",
                percent
            )));
        }
        self.confidence_threshold = percent / 100.0;
        info!("🎚️  置信度阈值: {:.1}%", percent);
        Ok(())
    }

    /// 设置类别过滤 (空集合 = 关闭)
    pub fn set_class_filter(&mut self, classes: BTreeSet<String>) -> AnnotationResult<()> {
        if !self.store.vocabulary().is_empty() {
            if let Some(unknown) = classes.iter().find(|c| !self.store.knows_class(c)) {
                return Err(AnnotationError::invalid(format!("unknown class '{}'", unknown)));
            }
        }
        if classes.is_empty() {
            info!("过滤已关闭, 显示所有类别");
            self.filter.clear();
        } else {
            info!("过滤类别: {}", classes.iter().cloned().collect::<Vec<_>>().join(", "));
            self.filter.set_filter(classes);
        }
        Ok(())
    }

    /// 导出JSON (帧号按数值排序)
    pub fn export_json(&self, path: impl AsRef<Path>, indent: usize) -> anyhow::Result<()> {
        self.recorder.write_json(path, self.store.remap(), indent)
    }
}

/// [0,1] → 0–100, 保留两位小数
fn percent(confidence: f32) -> f32 {
    (confidence * 100.0 * 100.0).round() / 100.0
}
