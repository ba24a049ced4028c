// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageBytes,
  model::RiskLevel,
  output::{Render, record_json},
  report::Report,
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数 {key} 无效: {value}")]
  InvalidQuery { key: String, value: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("记录计数器锁已损坏")]
  LockPoisoned,
}

/// `folder:///records`：每条诊断写一个 JSON 文件，按 `YYYY/MM/DD/HH-MM-SS-XXXX.json` 归档。
///
/// - `min_risk=medium`：低于该风险等级的结果不落盘
/// - `image`：同时保存原始图像，文件名与记录相同
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record_counter: Mutex<u16>,
  min_risk: Option<RiskLevel>,
  save_image: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut min_risk = None;
    let mut save_image = false;
    for (k, v) in uri.query_pairs() {
      match &*k {
        "min_risk" => {
          let level = v
            .parse::<RiskLevel>()
            .map_err(|_| DirectoryRecordOutputError::InvalidQuery {
              key: k.to_string(),
              value: v.to_string(),
            })?;
          min_risk = Some(level);
        }
        "image" => save_image = true,
        _ => {}
      }
    }

    Ok(DirectoryRecordOutput {
      directory: url_path(uri),
      record_counter: Mutex::new(0),
      min_risk,
      save_image,
    })
  }
}

impl DirectoryRecordOutput {
  fn record_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .record_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::LockPoisoned)?;
    *counter = counter.wrapping_add(1);
    Ok(*counter)
  }

  fn record_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.record_id()?
    )))
  }

  fn should_record(&self, report: &Report) -> bool {
    self
      .min_risk
      .is_none_or(|min| report.diagnosis.risk_level >= min)
  }

  /// 写入一条记录，返回记录文件路径；被 `min_risk` 过滤时返回 `None`
  pub fn record(
    &self,
    source: &ImageBytes,
    report: &Report,
  ) -> Result<Option<PathBuf>, DirectoryRecordOutputError> {
    if !self.should_record(report) {
      debug!(
        "跳过记录 {} (风险等级 {})",
        source.name, report.diagnosis.risk_level
      );
      return Ok(None);
    }

    let path = self.record_path(report.analyzed_at)?;
    let record = record_json(source, report);
    std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;

    if self.save_image {
      let extension = Path::new(&source.name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("img");
      std::fs::write(path.with_extension(extension), &source.data)?;
    }

    debug!("记录已保存: {}", path.display());
    Ok(Some(path))
  }
}

impl Render<ImageBytes, Report> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, source: &ImageBytes, result: &Report) -> Result<(), Self::Error> {
    self.record(source, result).inspect_err(|e| {
      warn!("保存记录失败 ({}): {}", source.name, e);
    })?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{model::Diagnosis, report::Advice};

  fn report(confidence: f32) -> Report {
    let diagnosis = Diagnosis {
      label: "anemia".to_string(),
      index: 1,
      confidence,
      risk_level: RiskLevel::from_confidence(confidence),
      raw_output: vec![1.0 - confidence, confidence],
      latency_ms: 2,
    };
    Report::new("anemia", diagnosis, &Advice::default())
  }

  fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("healthguard-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
  }

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  #[test]
  fn records_are_dated_and_numbered() {
    let dir = temp_dir("records");
    let output = output(&dir, "");
    let report = report(0.9);
    let source = ImageBytes::new("eye.jpg", vec![1, 2, 3]);

    let first = output.record(&source, &report).unwrap().unwrap();
    let second = output.record(&source, &report).unwrap().unwrap();
    assert_ne!(first, second);

    let now = report.analyzed_at;
    let expected_dir = dir
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    assert_eq!(first.parent().unwrap(), expected_dir);
    assert!(first.to_string_lossy().ends_with("-0001.json"));
    assert!(second.to_string_lossy().ends_with("-0002.json"));

    let saved: serde_json::Value =
      serde_json::from_slice(&std::fs::read(&first).unwrap()).unwrap();
    assert_eq!(saved["source"], "eye.jpg");
    assert_eq!(saved["diagnosis"]["risk_level"], "high");
    assert!(!first.with_extension("jpg").exists());

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn min_risk_filters_and_image_is_copied() {
    let dir = temp_dir("records-filtered");
    let output = output(&dir, "?min_risk=medium&image");
    let source = ImageBytes::new("eye.png", vec![9, 9]);

    assert!(output.record(&source, &report(0.4)).unwrap().is_none());
    let path = output.record(&source, &report(0.6)).unwrap().unwrap();
    assert_eq!(std::fs::read(path.with_extension("png")).unwrap(), vec![9, 9]);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn bad_min_risk_is_rejected() {
    let url = url::Url::parse("folder:///tmp/x?min_risk=severe").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::InvalidQuery { .. })
    ));
  }
}
