// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/report.rs - 诊断报告
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 HealthGuard 开发组

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

use crate::model::Diagnosis;

pub const DESCRIPTION: &str = "Automated image screening. \
  Results must be interpreted by a healthcare professional.";

const GENERIC_RECOMMENDATION: &str = "Consult a healthcare professional";

/// 类别 -> 建议 的对照表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
  entries: Vec<(String, String)>,
  fallback: String,
}

impl Advice {
  pub fn new(fallback: impl Into<String>) -> Self {
    Self {
      entries: Vec::new(),
      fallback: fallback.into(),
    }
  }

  /// 同一类别重复设置时覆盖旧值
  pub fn with(mut self, label: impl Into<String>, recommendation: impl Into<String>) -> Self {
    let label = label.into();
    let recommendation = recommendation.into();
    match self.entries.iter_mut().find(|(l, _)| *l == label) {
      Some(entry) => entry.1 = recommendation,
      None => self.entries.push((label, recommendation)),
    }
    self
  }

  pub fn recommend(&self, label: &str) -> &str {
    self
      .entries
      .iter()
      .find(|(l, _)| l == label)
      .map(|(_, r)| r.as_str())
      .unwrap_or(self.fallback.as_str())
  }
}

impl Default for Advice {
  fn default() -> Self {
    Advice::new(GENERIC_RECOMMENDATION)
      .with("anemia", "Blood test recommended")
      .with("normal", "No anemia detected")
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
  pub task: String,
  pub diagnosis: Diagnosis,
  pub recommendation: String,
  pub analyzed_at: DateTime<Utc>,
}

impl Report {
  pub fn new(task: &str, diagnosis: Diagnosis, advice: &Advice) -> Self {
    let recommendation = advice.recommend(&diagnosis.label).to_string();
    Self {
      task: task.to_string(),
      diagnosis,
      recommendation,
      analyzed_at: Utc::now(),
    }
  }

  pub fn condition(&self) -> &str {
    &self.diagnosis.label
  }

  pub fn to_json(&self) -> Value {
    let mut diagnosis = self.diagnosis.to_json();
    diagnosis["condition"] = json!(self.condition());
    diagnosis["recommendation"] = json!(self.recommendation);

    json!({
      "task": self.task,
      "diagnosis": diagnosis,
      "description": DESCRIPTION,
      "analyzed_at": self.analyzed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
  }
}
