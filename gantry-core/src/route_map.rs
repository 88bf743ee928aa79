//! 路由树
//!
//! 每个 HTTP 方法一棵树，每层对应路径的一段。查找时每一层都先尝试常量段，
//! 再按插入顺序尝试参数段，不回溯。因此较早出现的常量段总是优先。

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::action::ControllerAction;
use crate::error::ConfigurationError;
use crate::exchange::HttpExchange;
use crate::template::{Segment, SegmentPattern};

/// 查找失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteLookupError {
    #[error("No matching action")]
    NotFound,

    #[error("More than one matching action: {}", .0.join(", "))]
    Ambiguous(Vec<String>),
}

/// 树中的一个节点
#[derive(Debug, Clone, Default)]
pub struct RouteNode {
    literal_children: HashMap<String, RouteNode>,
    pattern_children: Vec<(SegmentPattern, RouteNode)>,
    literal_leaves: HashMap<String, Vec<Arc<ControllerAction>>>,
    pattern_leaves: Vec<(SegmentPattern, Arc<ControllerAction>)>,
}

impl RouteNode {
    fn insert(
        &mut self,
        action: Arc<ControllerAction>,
        index: usize,
    ) -> Result<(), ConfigurationError> {
        let segments = action.template().segments();
        let Some(segment) = segments.get(index).cloned() else {
            // 没有任何段的模板（根路径）
            return self.add_literal_leaf(String::new(), action);
        };
        let last = index + 1 == segments.len();

        match segment {
            Segment::Literal(text) if last => self.add_literal_leaf(text, action),
            Segment::Literal(text) => self
                .literal_children
                .entry(text)
                .or_default()
                .insert(action, index + 1),
            Segment::Param { pattern, .. } | Segment::ParamWithSuffix { pattern, .. } if last => {
                self.add_pattern_leaf(pattern, action)
            }
            Segment::Param { pattern, .. } | Segment::ParamWithSuffix { pattern, .. } => {
                let position = match self.pattern_children.iter().position(|(p, _)| *p == pattern) {
                    Some(position) => position,
                    None => {
                        self.pattern_children.push((pattern, RouteNode::default()));
                        self.pattern_children.len() - 1
                    }
                };
                self.pattern_children[position].1.insert(action, index + 1)
            }
        }
    }

    fn add_literal_leaf(
        &mut self,
        text: String,
        action: Arc<ControllerAction>,
    ) -> Result<(), ConfigurationError> {
        let candidates = self.literal_leaves.entry(text).or_default();
        if let Some(existing) = candidates
            .iter()
            .find(|existing| existing.conflicts_with(&action))
        {
            return Err(conflict(&action, existing));
        }
        candidates.push(action);
        Ok(())
    }

    fn add_pattern_leaf(
        &mut self,
        pattern: SegmentPattern,
        action: Arc<ControllerAction>,
    ) -> Result<(), ConfigurationError> {
        if let Some((_, existing)) = self.pattern_leaves.iter().find(|(p, _)| *p == pattern) {
            return Err(conflict(&action, existing));
        }
        self.pattern_leaves.push((pattern, action));
        Ok(())
    }

    fn find<'a>(
        &'a self,
        segments: &[String],
        index: usize,
        exchange: &dyn HttpExchange,
    ) -> Result<&'a Arc<ControllerAction>, RouteLookupError> {
        let segment = segments
            .get(index)
            .map(String::as_str)
            .ok_or(RouteLookupError::NotFound)?;

        if index + 1 == segments.len() {
            return self.find_leaf(segment, exchange);
        }

        if let Some(child) = self.literal_children.get(segment) {
            return child.find(segments, index + 1, exchange);
        }
        match self.pattern_children.iter().find(|(p, _)| p.is_match(segment)) {
            Some((_, child)) => child.find(segments, index + 1, exchange),
            None => Err(RouteLookupError::NotFound),
        }
    }

    fn find_leaf<'a>(
        &'a self,
        segment: &str,
        exchange: &dyn HttpExchange,
    ) -> Result<&'a Arc<ControllerAction>, RouteLookupError> {
        if let Some(candidates) = self.literal_leaves.get(segment) {
            return resolve(candidates, exchange);
        }
        self.pattern_leaves
            .iter()
            .find(|(p, _)| p.is_match(segment))
            .map(|(_, action)| action)
            .ok_or(RouteLookupError::NotFound)
    }
}

/// 同一常量叶子上的多个候选：必需查询参数决定归属
fn resolve<'a>(
    candidates: &'a [Arc<ControllerAction>],
    exchange: &dyn HttpExchange,
) -> Result<&'a Arc<ControllerAction>, RouteLookupError> {
    let matching: Vec<_> = candidates
        .iter()
        .filter(|action| action.matches_required_query_param(exchange))
        .collect();
    if matching.len() <= 1 {
        return matching.into_iter().next().ok_or(RouteLookupError::NotFound);
    }

    let narrowed: Vec<_> = matching
        .into_iter()
        .filter(|action| action.required_query_param().is_some())
        .collect();
    match narrowed.as_slice() {
        [] => Err(RouteLookupError::NotFound),
        [action] => Ok(*action),
        ambiguous => Err(RouteLookupError::Ambiguous(
            ambiguous.iter().map(|action| action.name().to_string()).collect(),
        )),
    }
}

fn conflict(action: &ControllerAction, existing: &ControllerAction) -> ConfigurationError {
    ConfigurationError::ConflictingRoute {
        method: action.method().to_string(),
        template: action.template().source().to_string(),
        action: action.name().to_string(),
        existing: existing.name().to_string(),
    }
}

/// 一个 HTTP 方法的路由树
#[derive(Debug, Clone, Default)]
pub struct RouteMap {
    root: RouteNode,
    len: usize,
}

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入动作；不可达的重复路由立即报错
    pub fn add(&mut self, action: Arc<ControllerAction>) -> Result<(), ConfigurationError> {
        self.root.insert(action, 0)?;
        self.len += 1;
        Ok(())
    }

    /// 按已解码的路径段查找，根路径用 `[""]` 表示
    pub fn find(
        &self,
        segments: &[String],
        exchange: &dyn HttpExchange,
    ) -> Result<&Arc<ControllerAction>, RouteLookupError> {
        self.root.find(segments, 0, exchange)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
