//! 计划校验：检查屏幕/导航是否构成以首屏为根的树
//!
//! 只报告、不修复；Architect 记录 warn 日志并把问题随 plan_ready 事件发给客户端。

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::core::state::{Flow, PlannedScreen};

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PlanIssue {
    #[error("screen at position {index} has an empty id")]
    EmptyScreenId { index: usize },

    #[error("screen id '{screen_id}' is used more than once")]
    DuplicateScreenId { screen_id: String },

    #[error("flow '{flow_id}' references unknown screen '{screen_id}'")]
    UnknownEndpoint { flow_id: String, screen_id: String },

    #[error("flow '{flow_id}' loops on screen '{screen_id}'")]
    SelfLoop { flow_id: String, screen_id: String },

    #[error("flow '{flow_id}' goes backwards from '{from}' to '{to}'")]
    BackwardEdge {
        flow_id: String,
        from: String,
        to: String,
    },

    #[error("screen '{screen_id}' is the target of {count} flows")]
    ConvergentFlows { screen_id: String, count: usize },

    #[error("flow '{flow_id}' targets the entry screen '{screen_id}'")]
    FlowIntoEntry { flow_id: String, screen_id: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("plan has {} issue(s)", .issues.len())]
pub struct PlanValidationError {
    pub issues: Vec<PlanIssue>,
}

/// 校验计划；没有问题返回 Ok
pub fn validate_plan(screens: &[PlannedScreen], flows: &[Flow]) -> Result<(), PlanValidationError> {
    let mut issues = Vec::new();

    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut reported_dup: HashSet<&str> = HashSet::new();
    for (index, screen) in screens.iter().enumerate() {
        let id = screen.id.trim();
        if id.is_empty() {
            issues.push(PlanIssue::EmptyScreenId { index });
            continue;
        }
        if position.contains_key(id) {
            if reported_dup.insert(id) {
                issues.push(PlanIssue::DuplicateScreenId {
                    screen_id: id.to_string(),
                });
            }
        } else {
            position.insert(id, index);
        }
    }

    let entry = screens.first().map(|s| s.id.trim()).filter(|id| !id.is_empty());
    let mut incoming: HashMap<&str, usize> = HashMap::new();

    for flow in flows {
        let (from, to) = (flow.from.trim(), flow.to.trim());
        let mut known = true;
        for endpoint in [from, to] {
            if !position.contains_key(endpoint) {
                known = false;
                issues.push(PlanIssue::UnknownEndpoint {
                    flow_id: flow.id.clone(),
                    screen_id: endpoint.to_string(),
                });
            }
        }
        if !known {
            continue;
        }
        if from == to {
            issues.push(PlanIssue::SelfLoop {
                flow_id: flow.id.clone(),
                screen_id: from.to_string(),
            });
            continue;
        }
        if Some(to) == entry {
            issues.push(PlanIssue::FlowIntoEntry {
                flow_id: flow.id.clone(),
                screen_id: to.to_string(),
            });
        } else if position[to] < position[from] {
            issues.push(PlanIssue::BackwardEdge {
                flow_id: flow.id.clone(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        *incoming.entry(to).or_insert(0) += 1;
    }

    // 按计划顺序报告汇聚，保证输出稳定
    for screen in screens {
        let id = screen.id.trim();
        if let Some(&count) = incoming.get(id) {
            if count > 1 {
                issues.push(PlanIssue::ConvergentFlows {
                    screen_id: id.to_string(),
                    count,
                });
                incoming.remove(id);
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(PlanValidationError { issues })
    }
}
