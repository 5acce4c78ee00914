// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 标注会话 (批处理主循环)
//!
//! 每一轮: Idle 时执行排队命令 → 从检测源取一帧 → 处理并记录。
//! 检测源结束即正常终止并导出; 任何一帧失败则会话停止, 已记录的帧保持不变。

use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

use anyhow::bail;
use tracing::{error, info};

use crate::annotation::{CommandOutcome, FrameOutcome, FrameProcessor, ScheduledCommand};
use crate::detection::DetectionSource;

/// 会话统计
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub commands_applied: u64,
    pub commands_failed: u64,
}

pub struct AnnotationSession<S: DetectionSource> {
    processor: FrameProcessor,
    source: S,
    /// 脚本命令 (按帧号排序), 在该帧显示后执行
    schedule: VecDeque<ScheduledCommand>,
    summary: SessionSummary,
    halted: bool,
}

impl<S: DetectionSource> AnnotationSession<S> {
    pub fn new(processor: FrameProcessor, source: S) -> Self {
        Self {
            processor,
            source,
            schedule: VecDeque::new(),
            summary: SessionSummary::default(),
            halted: false,
        }
    }

    pub fn with_schedule(mut self, mut schedule: Vec<ScheduledCommand>) -> Self {
        schedule.sort_by_key(|c| c.at_frame);
        self.schedule = schedule.into();
        self
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut FrameProcessor {
        &mut self.processor
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Idle: 执行所有排队命令, 跳转请求转发给检测源
    fn apply_idle_commands(&mut self) -> anyhow::Result<()> {
        for (_, result) in self.processor.apply_pending() {
            match result {
                Ok(outcome) => {
                    self.summary.commands_applied += 1;
                    if let CommandOutcome::Seeked(frame) = outcome {
                        self.source.seek(frame)?;
                    }
                }
                Err(_) => self.summary.commands_failed += 1,
            }
        }
        Ok(())
    }

    /// 处理下一帧; 检测源结束时返回 `Ok(None)`
    pub fn step(&mut self) -> anyhow::Result<Option<FrameOutcome>> {
        if self.halted {
            bail!("session halted after an earlier failure");
        }
        if let Err(e) = self.apply_idle_commands() {
            self.halted = true;
            return Err(e);
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) => {
                error!("❌ 读取帧失败: {:#}", e);
                self.halted = true;
                return Err(e);
            }
        };

        let outcome = match self.processor.process(frame.frame_number, &frame.detections) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("❌ 帧 {} 处理失败: {}", frame.frame_number, e);
                self.halted = true;
                return Err(e.into());
            }
        };
        self.summary.frames_processed += 1;

        // 当前帧显示期间 (暂停) 的脚本命令
        while let Some(next) = self.schedule.front() {
            if next.at_frame > frame.frame_number {
                break;
            }
            if let Some(scheduled) = self.schedule.pop_front() {
                self.processor.enqueue(scheduled.command);
            }
        }

        Ok(Some(outcome))
    }

    /// 处理到检测源结束
    pub fn run(&mut self) -> anyhow::Result<&SessionSummary> {
        let started = Instant::now();
        while self.step()?.is_some() {}
        // 最后一帧之后排队的命令
        self.apply_idle_commands()?;

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            "🏁 视频结束: {} 帧, 命令 {} 成功 / {} 失败, 耗时 {:.2}s",
            self.summary.frames_processed,
            self.summary.commands_applied,
            self.summary.commands_failed,
            elapsed
        );
        Ok(&self.summary)
    }

    /// 处理到结束并导出
    pub fn run_and_export(&mut self, path: impl AsRef<Path>, indent: usize) -> anyhow::Result<SessionSummary> {
        self.run()?;
        self.processor.export_json(path, indent)?;
        Ok(self.summary.clone())
    }
}
