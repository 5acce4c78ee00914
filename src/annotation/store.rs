// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 标注存储
//! Owns the tracked-object table, manual boxes, id remap and class vocabulary
//!
//! 调用约定: 所有修改操作必须在播放暂停 (两帧之间) 时执行,
//! `FrameProcessor::process` 读取这些表时不加锁。

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::remap::IdRemap;
use crate::detection::{BoundingBox, FrameSize, MoveDirection};
use crate::error::{AnnotationError, AnnotationResult};

/// 对象状态 (软删除)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectStatus {
    Active,
    Deleted,
}

/// 对象来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectOrigin {
    Detector,
    Manual,
}

/// 跟踪对象 (每个已知ID一行, 永不物理删除)
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    pub id: u32,
    pub class_label: String,
    /// 最近一次看到的位置
    pub bbox: BoundingBox,
    pub status: ObjectStatus,
    pub origin: ObjectOrigin,
}

impl TrackedObject {
    pub fn is_deleted(&self) -> bool {
        self.status == ObjectStatus::Deleted
    }
}

/// 手动框 (仅在 start_frame..=end_frame 内可见, end_frame 创建后不变)
#[derive(Clone, Debug, PartialEq)]
pub struct ManualBoxEntry {
    pub id: u32,
    pub bbox: BoundingBox,
    pub class_label: String,
    pub start_frame: u64,
    pub end_frame: u64,
}

impl ManualBoxEntry {
    pub fn is_visible_at(&self, frame: u64) -> bool {
        self.start_frame <= frame && frame <= self.end_frame
    }
}

#[derive(Clone, Debug, Default)]
pub struct AnnotationStore {
    objects: BTreeMap<u32, TrackedObject>,
    manual_boxes: BTreeMap<u32, ManualBoxEntry>,
    remap: IdRemap,
    /// 类别词表 (UI与过滤器可见)
    vocabulary: Vec<String>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vocabulary(vocabulary: Vec<String>) -> Self {
        Self {
            vocabulary,
            ..Default::default()
        }
    }

    // ========== 查询 ==========

    pub fn tracked_count(&self) -> usize {
        self.objects.len()
    }

    pub fn get(&self, id: u32) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn is_deleted(&self, id: u32) -> bool {
        self.objects.get(&id).is_some_and(TrackedObject::is_deleted)
    }

    /// 已删除ID列表 (用于恢复提示)
    pub fn deleted_ids(&self) -> Vec<u32> {
        self.objects
            .values()
            .filter(|o| o.is_deleted())
            .map(|o| o.id)
            .collect()
    }

    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    pub fn manual_box(&self, id: u32) -> Option<&ManualBoxEntry> {
        self.manual_boxes.get(&id)
    }

    /// 在 `frame` 可见的手动框 (按ID升序)
    pub fn active_manual_boxes(&self, frame: u64) -> impl Iterator<Item = &ManualBoxEntry> {
        self.manual_boxes
            .values()
            .filter(move |m| m.is_visible_at(frame))
    }

    pub fn remap(&self) -> &IdRemap {
        &self.remap
    }

    pub fn resolve_id(&self, id: u32) -> AnnotationResult<u32> {
        self.remap.resolve(id)
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn knows_class(&self, class_label: &str) -> bool {
        self.vocabulary.iter().any(|c| c == class_label)
    }

    /// 新类别追加到词表, 返回是否为新类别
    pub fn register_class(&mut self, class_label: &str) -> bool {
        if self.knows_class(class_label) {
            return false;
        }
        self.vocabulary.push(class_label.to_string());
        debug!("新类别加入词表: {}", class_label);
        true
    }

    // ========== ID分配 ==========

    fn is_id_taken(&self, id: u32) -> bool {
        self.objects.contains_key(&id) || self.remap.is_retired(id)
    }

    /// 下一个ID: 跟踪对象数 + 1, 跳过已占用的ID
    pub fn next_id(&self) -> u32 {
        let mut id = self.objects.len() as u32 + 1;
        while self.is_id_taken(id) {
            id += 1;
        }
        id
    }

    // ========== 检测器路径 ==========

    /// 登记一个未匹配的检测框为新对象
    pub fn register_detection(&mut self, class_label: &str, bbox: BoundingBox) -> u32 {
        let id = self.next_id();
        self.objects.insert(
            id,
            TrackedObject {
                id,
                class_label: class_label.to_string(),
                bbox,
                status: ObjectStatus::Active,
                origin: ObjectOrigin::Detector,
            },
        );
        self.register_class(class_label);
        debug!("🆕 新目标 #{} ({})", id, class_label);
        id
    }

    /// 匹配成功后刷新最近位置
    pub fn observe(&mut self, id: u32, class_label: &str, bbox: BoundingBox) {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.class_label = class_label.to_string();
                object.bbox = bbox;
            }
            None => {
                self.objects.insert(
                    id,
                    TrackedObject {
                        id,
                        class_label: class_label.to_string(),
                        bbox,
                        status: ObjectStatus::Active,
                        origin: ObjectOrigin::Detector,
                    },
                );
            }
        }
        self.register_class(class_label);
    }

    // ========== 用户操作 ==========

    /// 创建手动框, 可见窗口为 [frame_now, frame_now + duration_frames]
    pub fn create_manual_box(
        &mut self,
        bbox: BoundingBox,
        class_label: &str,
        frame_now: u64,
        duration_frames: u32,
    ) -> AnnotationResult<u32> {
        let class_label = class_label.trim();
        if class_label.is_empty() {
            return Err(AnnotationError::invalid("class label must not be empty"));
        }
        let end_frame = window_end(frame_now, duration_frames)?;
        let id = self.insert_manual(bbox, class_label, frame_now, end_frame);
        if self.register_class(class_label) {
            info!("📚 类别 '{}' 已加入词表", class_label);
        }
        info!("✏️  创建手动框 #{} {} {:?}", id, class_label, bbox.coords());
        Ok(id)
    }

    fn insert_manual(
        &mut self,
        bbox: BoundingBox,
        class_label: &str,
        frame_now: u64,
        end_frame: u64,
    ) -> u32 {
        let id = self.next_id();
        self.objects.insert(
            id,
            TrackedObject {
                id,
                class_label: class_label.to_string(),
                bbox,
                status: ObjectStatus::Active,
                origin: ObjectOrigin::Manual,
            },
        );
        self.manual_boxes.insert(
            id,
            ManualBoxEntry {
                id,
                bbox,
                class_label: class_label.to_string(),
                start_frame: frame_now,
                end_frame,
            },
        );
        id
    }

    /// 修改ID
    ///
    /// 重映射 old → new 总是写入; `apply_to_future` 只影响日志,
    /// 因为所有后续匹配本来就经过重映射。
    pub fn rename_id(&mut self, old_id: u32, new_id: u32, apply_to_future: bool) -> AnnotationResult<()> {
        if !self.objects.contains_key(&old_id) {
            return Err(AnnotationError::NotFound(old_id));
        }
        if new_id == 0 {
            return Err(AnnotationError::invalid("ids start at 1"));
        }
        if new_id == old_id {
            return Err(AnnotationError::invalid(format!("object already has id {}", new_id)));
        }
        if self.is_id_taken(new_id) {
            return Err(AnnotationError::invalid(format!("id {} is already in use", new_id)));
        }
        // 先写重映射 (可能因环失败), 成功后再移动行
        self.remap.insert(old_id, new_id)?;

        if let Some(mut object) = self.objects.remove(&old_id) {
            object.id = new_id;
            self.objects.insert(new_id, object);
        }
        if let Some(mut entry) = self.manual_boxes.remove(&old_id) {
            entry.id = new_id;
            self.manual_boxes.insert(new_id, entry);
        }

        info!("🔁 ID {} → {}", old_id, new_id);
        if apply_to_future {
            info!("后续帧中的目标 {} 也将显示为 {}", old_id, new_id);
        }
        Ok(())
    }

    /// 软删除
    pub fn delete(&mut self, id: u32) -> AnnotationResult<()> {
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(AnnotationError::NotFound(id))?;
        if object.is_deleted() {
            return Err(AnnotationError::AlreadyDeleted(id));
        }
        object.status = ObjectStatus::Deleted;
        info!("🗑️  已删除 #{}", id);
        Ok(())
    }

    /// 恢复已删除对象
    pub fn restore(&mut self, id: u32) -> AnnotationResult<()> {
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(AnnotationError::NotFound(id))?;
        if !object.is_deleted() {
            return Err(AnnotationError::NotDeleted(id));
        }
        object.status = ObjectStatus::Active;
        info!("♻️  已恢复 #{}", id);
        Ok(())
    }

    /// 移动框: 旧ID软删除, 在新位置创建新的手动框, 返回新ID
    pub fn move_manual(
        &mut self,
        id: u32,
        direction: MoveDirection,
        pixels: i32,
        duration_frames: u32,
        frame_now: u64,
        frame_size: FrameSize,
    ) -> AnnotationResult<u32> {
        let object = self.objects.get(&id).ok_or(AnnotationError::NotFound(id))?;
        let class_label = object.class_label.clone();
        let (dx, dy) = direction.offset(pixels);
        let moved = object.bbox.translate(dx, dy).clamp_to(frame_size);
        let end_frame = window_end(frame_now, duration_frames)?;

        if let Some(object) = self.objects.get_mut(&id) {
            object.status = ObjectStatus::Deleted;
        }
        let new_id = self.insert_manual(moved, &class_label, frame_now, end_frame);
        info!(
            "↔️  #{} {} {}px → 新框 #{} {:?}",
            id,
            direction,
            pixels,
            new_id,
            moved.coords()
        );
        Ok(new_id)
    }
}

/// 手动框窗口终点 frame_now + duration_frames, 溢出为无效输入
fn window_end(frame_now: u64, duration_frames: u32) -> AnnotationResult<u64> {
    frame_now.checked_add(u64::from(duration_frames)).ok_or_else(|| {
        AnnotationError::invalid(format!(
            "box window {} + {} frames is out of range",
            frame_now, duration_frames
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn bb(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2)
    }

    fn store_with(n: usize) -> AnnotationStore {
        let mut store = AnnotationStore::new();
        for i in 0..n {
            let x = i as f32 * 100.0;
            store.register_detection("car", bb(x, 0.0, x + 50.0, 50.0));
        }
        store
    }

    #[test]
    fn test_create_manual_box_allocates_next_id() {
        let mut store = store_with(2);
        let id = store
            .create_manual_box(bb(1.0, 2.0, 3.0, 4.0), "kite", 5, 3)
            .unwrap();
        assert_eq!(id, 3);

        let entry = store.manual_box(id).unwrap();
        assert_eq!((entry.start_frame, entry.end_frame), (5, 8));
        assert_eq!(store.get(id).unwrap().origin, ObjectOrigin::Manual);
        assert!(store.knows_class("kite"));
    }

    #[test]
    fn test_create_manual_box_rejects_empty_class() {
        let mut store = store_with(1);
        assert_matches!(
            store.create_manual_box(bb(0.0, 0.0, 1.0, 1.0), "  ", 0, 1),
            Err(AnnotationError::InvalidInput(_))
        );
        assert_eq!(store.tracked_count(), 1);
    }

    #[test]
    fn test_manual_box_window() {
        let mut store = AnnotationStore::new();
        let id = store
            .create_manual_box(bb(0.0, 0.0, 5.0, 5.0), "person", 5, 3)
            .unwrap();
        for frame in 5..=8 {
            assert!(store.active_manual_boxes(frame).any(|m| m.id == id));
        }
        assert_eq!(store.active_manual_boxes(4).count(), 0);
        assert_eq!(store.active_manual_boxes(9).count(), 0);
    }

    #[test]
    fn test_manual_window_overflow_rejected() {
        let mut store = store_with(1);
        assert_matches!(
            store.create_manual_box(bb(0.0, 0.0, 5.0, 5.0), "person", u64::MAX, 5),
            Err(AnnotationError::InvalidInput(_))
        );
        assert_matches!(
            store.move_manual(1, MoveDirection::Down, 2, 5, u64::MAX - 1, FrameSize::new(640, 480)),
            Err(AnnotationError::InvalidInput(_))
        );
        assert_eq!(store.tracked_count(), 1);
        assert!(!store.is_deleted(1));

        // 恰好到达上限仍合法
        let id = store
            .create_manual_box(bb(0.0, 0.0, 5.0, 5.0), "person", u64::MAX, 0)
            .unwrap();
        assert!(store.manual_box(id).unwrap().is_visible_at(u64::MAX));
    }

    #[test]
    fn test_delete_then_restore() {
        let mut store = store_with(3);
        let before = store.get(2).unwrap().clone();

        store.delete(2).unwrap();
        assert!(store.is_deleted(2));
        assert_eq!(store.deleted_ids(), vec![2]);
        assert_matches!(store.delete(2), Err(AnnotationError::AlreadyDeleted(2)));

        store.restore(2).unwrap();
        assert_eq!(store.get(2).unwrap(), &before);
        assert!(store.deleted_ids().is_empty());
    }

    #[test]
    fn test_restore_errors() {
        let mut store = store_with(1);
        assert_matches!(store.restore(1), Err(AnnotationError::NotDeleted(1)));
        assert_matches!(store.restore(42), Err(AnnotationError::NotFound(42)));
        assert_matches!(store.delete(42), Err(AnnotationError::NotFound(42)));
    }

    #[test]
    fn test_rename_moves_row_and_records_remap() {
        let mut store = store_with(3);
        store.rename_id(3, 7, false).unwrap();

        assert!(!store.contains(3));
        assert_eq!(store.get(7).unwrap().id, 7);
        assert_eq!(store.resolve_id(3).unwrap(), 7);
    }

    #[test]
    fn test_rename_future_flag_does_not_change_remap() {
        let mut with_flag = store_with(3);
        let mut without_flag = store_with(3);
        with_flag.rename_id(3, 7, true).unwrap();
        without_flag.rename_id(3, 7, false).unwrap();
        assert_eq!(with_flag.resolve_id(3).unwrap(), 7);
        assert_eq!(without_flag.resolve_id(3).unwrap(), 7);
    }

    #[test]
    fn test_rename_errors_leave_store_unchanged() {
        let mut store = store_with(3);
        assert_matches!(store.rename_id(9, 10, true), Err(AnnotationError::NotFound(9)));
        assert_matches!(store.rename_id(1, 2, true), Err(AnnotationError::InvalidInput(_)));
        assert_matches!(store.rename_id(1, 0, true), Err(AnnotationError::InvalidInput(_)));

        store.rename_id(3, 7, true).unwrap();
        // 3 已被改名, 不能再作为目标
        assert_matches!(store.rename_id(7, 3, true), Err(AnnotationError::InvalidInput(_)));
        assert_eq!(store.tracked_count(), 3);
        assert_eq!(store.remap().len(), 1);
    }

    #[test]
    fn test_rename_moves_manual_entry() {
        let mut store = AnnotationStore::new();
        let id = store
            .create_manual_box(bb(0.0, 0.0, 5.0, 5.0), "person", 0, 10)
            .unwrap();
        store.rename_id(id, 20, true).unwrap();
        assert!(store.manual_box(id).is_none());
        assert_eq!(store.manual_box(20).unwrap().id, 20);
    }

    #[test]
    fn test_next_id_skips_taken_ids() {
        let mut store = store_with(3);
        store.rename_id(1, 4, true).unwrap();
        // 数量仍为3, 4 已占用, 1 已被改名
        assert_eq!(store.next_id(), 5);
    }

    #[test]
    fn test_move_forks_new_identity() {
        let mut store = store_with(3);
        let id = store
            .create_manual_box(bb(100.0, 20.0, 150.0, 60.0), "dog", 0, 5)
            .unwrap();
        assert_eq!(id, 4);

        let new_id = store
            .move_manual(4, MoveDirection::Right, 10, 6, 2, FrameSize::new(640, 480))
            .unwrap();
        assert_eq!(new_id, 5);
        assert!(store.is_deleted(4));

        let moved = store.manual_box(new_id).unwrap();
        assert_eq!(moved.bbox, bb(110.0, 20.0, 160.0, 60.0));
        assert_eq!((moved.start_frame, moved.end_frame), (2, 8));
        assert_eq!(moved.class_label, "dog");
    }

    #[test]
    fn test_move_clamps_to_frame() {
        let mut store = AnnotationStore::new();
        store.register_detection("car", bb(600.0, 10.0, 635.0, 40.0));
        let new_id = store
            .move_manual(1, MoveDirection::Right, 10, 1, 0, FrameSize::new(640, 480))
            .unwrap();
        assert_eq!(store.get(new_id).unwrap().bbox, bb(610.0, 10.0, 640.0, 40.0));

        let up_id = store
            .move_manual(new_id, MoveDirection::Up, 25, 1, 0, FrameSize::new(640, 480))
            .unwrap();
        assert_eq!(store.get(up_id).unwrap().bbox, bb(610.0, 0.0, 640.0, 15.0));
    }

    #[test]
    fn test_move_unknown_id() {
        let mut store = store_with(1);
        assert_matches!(
            store.move_manual(8, MoveDirection::Left, 1, 1, 0, FrameSize::new(10, 10)),
            Err(AnnotationError::NotFound(8))
        );
        assert_eq!(store.tracked_count(), 1);
    }
}
