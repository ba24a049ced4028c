// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/output/stdout_output.rs - 标准输出
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

use std::io::Write;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageBytes,
  output::{Render, record_json},
  report::Report,
};

#[derive(Error, Debug)]
pub enum StdoutOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// `stdout://`，每条诊断一行 JSON；`stdout://?pretty` 多行缩进输出
pub struct StdoutOutput {
  pretty: bool,
}

impl StdoutOutput {
  pub fn write_record<W: Write>(
    &self,
    writer: &mut W,
    source: &ImageBytes,
    report: &Report,
  ) -> Result<(), StdoutOutputError> {
    let record = record_json(source, report);
    if self.pretty {
      serde_json::to_writer_pretty(&mut *writer, &record)?;
    } else {
      serde_json::to_writer(&mut *writer, &record)?;
    }
    writeln!(writer)?;
    Ok(())
  }
}

impl FromUrlWithScheme for StdoutOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for StdoutOutput {
  type Error = StdoutOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StdoutOutputError::SchemeMismatch);
    }

    Ok(StdoutOutput {
      pretty: url.query_pairs().any(|(k, _)| k == "pretty"),
    })
  }
}

impl Render<ImageBytes, Report> for StdoutOutput {
  type Error = StdoutOutputError;

  fn render_result(&self, source: &ImageBytes, result: &Report) -> Result<(), Self::Error> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    self.write_record(&mut lock, source, result)?;
    lock.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{Diagnosis, RiskLevel},
    report::Advice,
  };

  fn report() -> Report {
    let diagnosis = Diagnosis {
      label: "normal".to_string(),
      index: 0,
      confidence: 0.62,
      risk_level: RiskLevel::Medium,
      raw_output: vec![0.62, 0.38],
      latency_ms: 5,
    };
    Report::new("anemia", diagnosis, &Advice::default())
  }

  #[test]
  fn writes_one_json_line() {
    let output = StdoutOutput::from_url(&Url::parse("stdout://").unwrap()).unwrap();
    let mut buf = Vec::new();
    output
      .write_record(&mut buf, &ImageBytes::new("x.png", Vec::new()), &report())
      .unwrap();

    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 1);
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["source"], "x.png");
    assert_eq!(value["diagnosis"]["recommendation"], "No anemia detected");
  }

  #[test]
  fn pretty_output_spans_lines() {
    let output = StdoutOutput::from_url(&Url::parse("stdout://?pretty").unwrap()).unwrap();
    let mut buf = Vec::new();
    output
      .write_record(&mut buf, &ImageBytes::new("x.png", Vec::new()), &report())
      .unwrap();
    assert!(String::from_utf8(buf).unwrap().lines().count() > 1);
  }
}
