// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ID重映射表 (old → new, 累积)
//! Rename redirects resolved at every read boundary

use std::collections::BTreeMap;

use crate::error::{AnnotationError, AnnotationResult};

#[derive(Clone, Debug, Default)]
pub struct IdRemap {
    redirects: BTreeMap<u32, u32>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 沿重映射链解析到最终ID
    pub fn resolve(&self, id: u32) -> AnnotationResult<u32> {
        let mut current = id;
        // 链长不会超过表大小, 超过即为环
        for _ in 0..=self.redirects.len() {
            match self.redirects.get(&current) {
                Some(&next) => current = next,
                None => return Ok(current),
            }
        }
        Err(AnnotationError::CycleDetected(id))
    }

    /// 记录 old → new; 已有出边或会形成环时拒绝且不修改
    pub fn insert(&mut self, old_id: u32, new_id: u32) -> AnnotationResult<()> {
        if old_id == new_id {
            return Err(AnnotationError::CycleDetected(old_id));
        }
        if self.redirects.contains_key(&old_id) {
            return Err(AnnotationError::invalid(format!("id {} was already renamed", old_id)));
        }
        // old_id 此时是链尾, 只需检查 new_id 的链是否终止于它
        if self.resolve(new_id)? == old_id {
            return Err(AnnotationError::CycleDetected(old_id));
        }
        self.redirects.insert(old_id, new_id);
        Ok(())
    }

    /// 该ID是否已被改名 (存在出边)
    pub fn is_retired(&self, id: u32) -> bool {
        self.redirects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.redirects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.redirects.is_empty()
    }
}
