// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/model/interpret.rs - 推理结果解释
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

use std::{fmt, str::FromStr};

use serde_json::{Value, json};
use tracing::debug;

use crate::model::{InferenceError, RawOutput};

const HIGH_RISK_THRESHOLD: f32 = 0.75;
const MEDIUM_RISK_THRESHOLD: f32 = 0.50;
const DEFAULT_LABELS: [&str; 2] = ["normal", "anemia"];

/// 风险等级，只取决于预测类别的置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskLevel {
  Low,
  Medium,
  High,
}

impl RiskLevel {
  pub fn from_confidence(confidence: f32) -> Self {
    if confidence > HIGH_RISK_THRESHOLD {
      RiskLevel::High
    } else if confidence > MEDIUM_RISK_THRESHOLD {
      RiskLevel::Medium
    } else {
      RiskLevel::Low
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RiskLevel::Low => "low",
      RiskLevel::Medium => "medium",
      RiskLevel::High => "high",
    }
  }
}

impl fmt::Display for RiskLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RiskLevel {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "low" => Ok(RiskLevel::Low),
      "medium" => Ok(RiskLevel::Medium),
      "high" => Ok(RiskLevel::High),
      other => Err(format!("未知的风险等级: {}", other)),
    }
  }
}

/// 有序类别名称表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels(Vec<String>);

impl Labels {
  pub fn new<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Labels(labels.into_iter().map(Into::into).collect())
  }

  /// 越界时退回索引本身的字符串形式
  pub fn lookup(&self, index: usize) -> String {
    self
      .0
      .get(index)
      .cloned()
      .unwrap_or_else(|| index.to_string())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// 逗号分隔，忽略空白项
  pub fn parse(list: &str) -> Self {
    Labels::new(list.split(',').map(str::trim).filter(|l| !l.is_empty()))
  }
}

impl Default for Labels {
  fn default() -> Self {
    Labels::new(DEFAULT_LABELS)
  }
}


/// 数值稳定的 softmax：先减去最大值再取指数
pub fn softmax(values: &[f32]) -> Vec<f32> {
  let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|e| e / sum).collect()
}

fn round2(value: f32) -> f32 {
  (value * 100.0).round() / 100.0
}

/// 解释后的概率分布与预测类别
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
  pub index: usize,
  /// 未舍入的预测概率
  pub probability: f32,
  pub probabilities: Vec<f32>,
}

/// 去掉批维度，必要时做 softmax，取最大概率类别。
pub fn interpret(output: &RawOutput) -> Result<Interpretation, InferenceError> {
  let values = output.values();
  if values.is_empty() {
    return Err(InferenceError::EmptyOutput);
  }

  let squeezed: Vec<usize> = output.shape().iter().copied().filter(|d| *d != 1).collect();
  if squeezed.len() > 1 {
    return Err(InferenceError::UnexpectedRank(output.shape().to_vec()));
  }

  if values.iter().any(|v| !v.is_finite()) {
    return Err(InferenceError::NonFiniteOutput);
  }

  // 标量输出视为长度为 1 的概率数组
  let probabilities = if values.iter().all(|v| (0.0..=1.0).contains(v)) {
    values.to_vec()
  } else {
    debug!("输出超出 [0, 1]，按 logits 处理");
    softmax(values)
  };

  let (index, probability) = probabilities
    .iter()
    .copied()
    .enumerate()
    .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
      if p > best.1 { (i, p) } else { best }
    });

  Ok(Interpretation {
    index,
    probability,
    probabilities,
  })
}

/// 单次分析的诊断结果
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
  pub label: String,
  pub index: usize,
  /// 保留两位小数
  pub confidence: f32,
  pub risk_level: RiskLevel,
  pub raw_output: Vec<f32>,
  pub latency_ms: u64,
}

impl Interpretation {
  pub fn into_diagnosis(self, labels: &Labels, latency_ms: u64) -> Diagnosis {
    let confidence = round2(self.probability);
    Diagnosis {
      label: labels.lookup(self.index),
      index: self.index,
      confidence,
      risk_level: RiskLevel::from_confidence(confidence),
      raw_output: self.probabilities,
      latency_ms,
    }
  }
}

impl Diagnosis {
  pub fn to_json(&self) -> Value {
    json!({
      "label": self.label,
      "index": self.index,
      "confidence": (self.confidence as f64 * 100.0).round() / 100.0,
      "risk_level": self.risk_level.as_str(),
      "raw_output": self.raw_output,
      "latency_ms": self.latency_ms,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn output(shape: Vec<usize>, data: Vec<f32>) -> RawOutput {
    RawOutput::new(shape, data).unwrap()
  }

  #[test]
  fn probabilities_are_used_as_is() {
    let result = interpret(&RawOutput::from(vec![0.1, 0.9])).unwrap();
    assert_eq!(result.index, 1);
    assert_eq!(result.probability, 0.9);
    assert_eq!(result.probabilities, vec![0.1, 0.9]);
  }

  #[test]
  fn logits_go_through_softmax() {
    let result = interpret(&RawOutput::from(vec![2.0, -1.0, 0.5])).unwrap();
    assert_eq!(result.index, 0);
    let sum: f32 = result.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert!(result.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
  }

  #[test]
  fn softmax_is_stable_for_large_logits() {
    let probs = softmax(&[1000.0, 1001.0]);
    assert!(probs.iter().all(|p| p.is_finite()));
    assert!((probs[1] - 0.7310586).abs() < 1e-5);
  }

  #[test]
  fn quantized_like_output_is_softmaxed() {
    let result = interpret(&RawOutput::from(vec![10.0, 200.0])).unwrap();
    assert_eq!(result.index, 1);
    assert!(result.probability > 0.99);
  }

  #[test]
  fn scalar_output_is_single_probability() {
    let result = interpret(&RawOutput::scalar(0.6)).unwrap();
    assert_eq!(result.index, 0);
    assert_eq!(result.probabilities, vec![0.6]);

    let nested = interpret(&output(vec![1, 1], vec![0.3])).unwrap();
    assert_eq!(nested.probabilities, vec![0.3]);
  }

  #[test]
  fn scalar_logit_becomes_certain() {
    let result = interpret(&RawOutput::scalar(3.5)).unwrap();
    assert_eq!(result.probabilities, vec![1.0]);
  }

  #[test]
  fn empty_output_is_an_error() {
    let err = interpret(&output(vec![1, 0], vec![])).unwrap_err();
    assert!(matches!(err, InferenceError::EmptyOutput));
  }

  #[test]
  fn multi_axis_output_is_an_error() {
    let err = interpret(&output(vec![1, 2, 2], vec![0.1, 0.2, 0.3, 0.4])).unwrap_err();
    assert!(matches!(err, InferenceError::UnexpectedRank(_)));
  }

  #[test]
  fn non_finite_output_is_an_error() {
    let err = interpret(&RawOutput::from(vec![0.2, f32::NAN])).unwrap_err();
    assert!(matches!(err, InferenceError::NonFiniteOutput));
  }

  #[test]
  fn risk_thresholds() {
    assert_eq!(RiskLevel::from_confidence(0.9), RiskLevel::High);
    assert_eq!(RiskLevel::from_confidence(0.76), RiskLevel::High);
    assert_eq!(RiskLevel::from_confidence(0.75), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_confidence(0.51), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_confidence(0.5), RiskLevel::Low);
    assert_eq!(RiskLevel::from_confidence(0.0), RiskLevel::Low);
  }

  #[test]
  fn risk_level_parses_case_insensitively() {
    assert_eq!("High".parse::<RiskLevel>(), Ok(RiskLevel::High));
    assert_eq!(" medium ".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
    assert!("severe".parse::<RiskLevel>().is_err());
    assert!(RiskLevel::Low < RiskLevel::Medium && RiskLevel::Medium < RiskLevel::High);
  }

  #[test]
  fn risk_follows_rounded_confidence() {
    let interpretation = Interpretation {
      index: 0,
      probability: 0.7504,
      probabilities: vec![0.7504, 0.2496],
    };
    let diagnosis = interpretation.into_diagnosis(&Labels::default(), 3);
    assert_eq!(diagnosis.confidence, 0.75);
    assert_eq!(diagnosis.risk_level, RiskLevel::Medium);
    assert_eq!(diagnosis.raw_output, vec![0.7504, 0.2496]);
  }

  #[test]
  fn label_lookup_falls_back_to_index() {
    let labels = Labels::default();
    assert_eq!(labels.lookup(1), "anemia");
    assert_eq!(labels.lookup(7), "7");

    let parsed = Labels::parse("a, b,,c");
    assert_eq!(parsed, Labels::new(["a", "b", "c"]));
    assert!(Labels::parse(" , ").is_empty());
  }

  #[test]
  fn diagnosis_json_has_all_fields() {
    let diagnosis = interpret(&RawOutput::from(vec![0.1, 0.9]))
      .unwrap()
      .into_diagnosis(&Labels::default(), 12);
    let json = diagnosis.to_json();
    assert_eq!(json["label"], "anemia");
    assert_eq!(json["risk_level"], "high");
    assert_eq!(json["latency_ms"], 12);
    assert_eq!(json["confidence"], 0.9);
    assert_eq!(json["raw_output"].as_array().unwrap().len(), 2);
  }
}
