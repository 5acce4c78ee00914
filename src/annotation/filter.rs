// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 类别过滤器
//!
//! 只影响显示与记录, 不影响检测: 被过滤的类别仍然分配ID,
//! 重新启用后身份连续。

use std::collections::BTreeSet;

/// 空集合 = 不过滤 (全部显示), 非空 = 白名单
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassFilter {
    allowed: BTreeSet<String>,
}

impl ClassFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_filter<I, S>(&mut self, classes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = classes
            .into_iter()
            .map(Into::into)
            .map(|c: String| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
    }

    pub fn clear(&mut self) {
        self.allowed.clear();
    }

    pub fn is_filtering(&self) -> bool {
        !self.allowed.is_empty()
    }

    pub fn is_visible(&self, class_label: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(class_label)
    }

    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }
}
