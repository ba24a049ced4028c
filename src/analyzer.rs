// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/analyzer.rs - 图像分析服务
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

use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  model::{
    Diagnosis, Executor, InferenceError, Labels, Model, ModelError, ModelHandle, ModelWrapper,
    TensorSpec, interpret, quantize,
  },
  preprocess::{self, InvalidImageError},
  report::{Advice, Report},
};

const DEFAULT_TASK: &str = "anemia";

/// `analyze` 的两类错误：输入问题（4xx）与模型/运行时问题（5xx）
#[derive(Error, Debug)]
pub enum AnalyzeError {
  #[error("无效图像: {0}")]
  InvalidImage(#[from] InvalidImageError),
  #[error("推理失败: {0}")]
  Inference(#[from] InferenceError),
}

impl AnalyzeError {
  pub fn is_client_error(&self) -> bool {
    matches!(self, AnalyzeError::InvalidImage(_))
  }

  /// 可返回给调用方的信息，不含运行时细节
  pub fn public_message(&self) -> &'static str {
    match self {
      AnalyzeError::InvalidImage(_) => "Invalid image file",
      AnalyzeError::Inference(_) => "Inference error",
    }
  }
}

/// 图像 -> 诊断 的完整流水线，进程内共享一个实例即可。
pub struct Analyzer<H> {
  executor: Executor<H>,
  labels: Labels,
  task: String,
  advice: Advice,
}

impl<H: ModelHandle> Analyzer<H> {
  pub fn new(handle: H) -> Result<Self, InferenceError> {
    let executor = Executor::new(handle);
    executor.input_spec().validate()?;

    let analyzer = Self {
      executor,
      labels: Labels::default(),
      task: DEFAULT_TASK.to_string(),
      advice: Advice::default(),
    };
    analyzer.check_labels();
    Ok(analyzer)
  }

  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.labels = labels;
    self.check_labels();
    self
  }

  pub fn with_task(mut self, task: impl Into<String>) -> Self {
    self.task = task.into();
    self
  }

  pub fn with_advice(mut self, advice: Advice) -> Self {
    self.advice = advice;
    self
  }

  pub fn with_warmup(self) -> Self {
    let Analyzer {
      executor,
      labels,
      task,
      advice,
    } = self;
    Analyzer {
      executor: executor.with_warmup(),
      labels,
      task,
      advice,
    }
  }

  pub fn task(&self) -> &str {
    &self.task
  }

  pub fn labels(&self) -> &Labels {
    &self.labels
  }

  pub fn input_spec(&self) -> &TensorSpec {
    self.executor.input_spec()
  }

  // 类别数与标签表不一致时仍可运行（越界索引会退回数字），这里只提示
  fn check_labels(&self) {
    let classes: i64 = self
      .executor
      .output_shape()
      .iter()
      .filter(|d| **d > 1)
      .product();
    if classes > 1 && classes as usize != self.labels.len() {
      warn!(
        "模型输出类别数 {} 与标签数 {} 不一致",
        classes,
        self.labels.len()
      );
    }
  }

  /// 分析一张图像：解码、归一化、量化、推理、解释。
  pub fn analyze(&self, image_bytes: &[u8]) -> Result<Diagnosis, AnalyzeError> {
    let start = Instant::now();
    let image = preprocess::decode_image(image_bytes)?;

    let diagnosis = self.infer_image(image, start).inspect_err(|e| {
      error!("[{}] 推理失败: {:?}", self.task, e);
    })?;

    info!(
      "[{}] 推理完成 | label={} confidence={:.2} risk={} latency={}ms",
      self.task, diagnosis.label, diagnosis.confidence, diagnosis.risk_level, diagnosis.latency_ms
    );
    Ok(diagnosis)
  }

  fn infer_image(&self, image: RgbImage, start: Instant) -> Result<Diagnosis, InferenceError> {
    let spec = self.executor.input_spec();
    let frame = preprocess::normalize(image, spec)?;
    let tensor = quantize(&frame, spec.kind);
    let output = self.executor.run(&tensor)?;
    let interpretation = interpret(&output)?;

    let latency_ms = start.elapsed().as_millis() as u64;
    Ok(interpretation.into_diagnosis(&self.labels, latency_ms))
  }

  pub fn report(&self, diagnosis: Diagnosis) -> Report {
    Report::new(&self.task, diagnosis, &self.advice)
  }
}

impl<H: ModelHandle> Model for Analyzer<H> {
  type Input = [u8];
  type Output = Report;
  type Error = AnalyzeError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.analyze(input).map(|diagnosis| self.report(diagnosis))
  }
}

#[derive(Error, Debug)]
pub enum BuildError {
  #[error("模型错误: {0}")]
  Model(#[from] ModelError),
  #[error("模型不可用: {0}")]
  Inference(#[from] InferenceError),
}

/// 从 URL 构造分析器。
///
/// 模型后端由方案决定（`fixed`、`tflite`），公共参数：
/// `labels=a,b`、`task=name`、`warmup`、`advice.<label>=text`。
pub struct AnalyzerBuilder {
  url: Url,
  labels: Labels,
  task: String,
  warmup: bool,
  advice: Advice,
}

fn parse_flag(value: &str) -> bool {
  !matches!(value, "0" | "false" | "no" | "off")
}

impl FromUrl for AnalyzerBuilder {
  type Error = BuildError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut builder = AnalyzerBuilder {
      url: url.clone(),
      labels: Labels::default(),
      task: DEFAULT_TASK.to_string(),
      warmup: false,
      advice: Advice::default(),
    };

    for (key, value) in url.query_pairs() {
      match &*key {
        "labels" => builder.labels = Labels::parse(&value),
        "task" => builder.task = value.to_string(),
        "warmup" => builder.warmup = parse_flag(&value),
        other => {
          if let Some(label) = other.strip_prefix("advice.") {
            builder.advice = builder.advice.with(label, value.to_string());
          }
        }
      }
    }

    Ok(builder)
  }
}

impl AnalyzerBuilder {
  pub fn warmup(mut self, warmup: bool) -> Self {
    self.warmup = warmup;
    self
  }

  pub fn build(self) -> Result<Analyzer<ModelWrapper>, BuildError> {
    info!("[{}] 加载模型: {}", self.task, self.url);
    let model = ModelWrapper::from_url(&self.url)?;

    let analyzer = Analyzer::new(model)?
      .with_labels(self.labels)
      .with_task(self.task)
      .with_advice(self.advice);

    if self.warmup {
      Ok(analyzer.with_warmup())
    } else {
      Ok(analyzer)
    }
  }
}
