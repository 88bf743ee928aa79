//! 控制器

use std::sync::Arc;

use crate::action::ActionSpec;

/// 一组动作的提供者
///
/// 通常由 `#[controller]` 宏生成实现；也可以手写，直接返回 [`ActionSpec`] 列表。
/// 控制器实例在所有请求线程间共享，因此需要 `Send + Sync`。
pub trait Controller: Send + Sync + 'static {
    /// 用于错误报告和日志
    fn controller_name(&self) -> &str;

    /// 声明全部动作，调用器持有 `self` 的共享引用
    fn actions(self: Arc<Self>) -> Vec<ActionSpec>;
}
