// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧间身份匹配
//! Frame-over-frame identity resolution by IOU
//!
//! 只与上一帧的检测框做IOU比较, 不做运动预测:
//! 1. 与上一帧所有框计算IOU
//! 2. 取IOU严格大于阈值的最大者, 同分取最小ID
//! 3. 匹配结果经过ID重映射后返回, 否则分配新ID

use std::collections::BTreeMap;

use super::types::BoundingBox;
use crate::annotation::AnnotationStore;
use crate::error::AnnotationResult;

/// 默认匹配阈值 (严格大于)
pub const DEFAULT_MATCH_IOU: f32 = 0.5;

/// 上一帧的框 (仅检测器框)
#[derive(Clone, Debug, PartialEq)]
pub struct PreviousBox {
    pub class_label: String,
    pub bbox: BoundingBox,
}

/// 上一帧快照: id → 框, 每帧整体替换
#[derive(Clone, Debug, Default)]
pub struct PreviousFrameBoxes {
    boxes: BTreeMap<u32, PreviousBox>,
}

impl PreviousFrameBoxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, class_label: impl Into<String>, bbox: BoundingBox) {
        self.boxes.insert(
            id,
            PreviousBox {
                class_label: class_label.into(),
                bbox,
            },
        );
    }

    pub fn get(&self, id: u32) -> Option<&PreviousBox> {
        self.boxes.get(&id)
    }

    /// 按ID升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (u32, &PreviousBox)> {
        self.boxes.iter().map(|(id, b)| (*id, b))
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// 身份解析器
#[derive(Clone, Debug)]
pub struct IdentityResolver {
    /// 匹配IOU阈值 (严格大于)
    iou_threshold: f32,
}

impl IdentityResolver {
    pub fn new(iou_threshold: f32) -> Self {
        Self { iou_threshold }
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    /// 在上一帧中寻找最佳匹配 (未经重映射的原始ID)
    ///
    /// 类别不参与匹配: 跨类别的短时匹配是允许的。
    pub fn best_match(&self, bbox: &BoundingBox, previous: &PreviousFrameBoxes) -> Option<u32> {
        let mut best: Option<(u32, f32)> = None;
        for (id, prev) in previous.iter() {
            let iou = bbox.iou(&prev.bbox);
            if iou <= self.iou_threshold {
                continue;
            }
            // 升序遍历 + 严格大于 => 同分时保留最小ID
            if best.map_or(true, |(_, best_iou)| iou > best_iou) {
                best = Some((id, iou));
            }
        }
        best.map(|(id, _)| id)
    }

    /// 解析一个检测框的ID
    ///
    /// 匹配成功时经过重映射返回; 否则在 `store` 中登记新对象。
    pub fn resolve(
        &self,
        class_label: &str,
        bbox: BoundingBox,
        previous: &PreviousFrameBoxes,
        store: &mut AnnotationStore,
    ) -> AnnotationResult<u32> {
        match self.best_match(&bbox, previous) {
            Some(raw_id) => {
                let id = store.resolve_id(raw_id)?;
                store.observe(id, class_label, bbox);
                Ok(id)
            }
            None => Ok(store.register_detection(class_label, bbox)),
        }
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_IOU)
    }
}
